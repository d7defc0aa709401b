// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};
use tracing::debug;

use shared_database::AppState;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::identity::{Role, SessionIdentity};
use shared_utils::extractor::session_id_from_headers;

use crate::models::{
    Actor, AppointmentError, BookAppointmentRequest, NewBooking, SlotAvailability, SlotQuery,
    TransitionRequest,
};
use crate::services::{AppointmentLifecycle, SlotLedger};

impl From<AppointmentError> for AppError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::NotFound(_) => AppError::NotFound(e.to_string()),
            AppointmentError::SlotTaken { .. } | AppointmentError::ConcurrentUpdate => {
                AppError::Conflict(e.to_string())
            }
            AppointmentError::IllegalTransition { .. } => AppError::BadRequest(e.to_string()),
            AppointmentError::Unauthorized => AppError::Forbidden(e.to_string()),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::Store(inner) => AppError::Database(inner.to_string()),
        }
    }
}

fn actor_for(user: &User) -> Actor {
    Actor::new(Role::from_user(user), SessionIdentity::from_user(user))
}

fn ledger(state: &AppState, headers: &HeaderMap) -> SlotLedger {
    SlotLedger::from_state(state).with_origin(session_id_from_headers(headers))
}

// ==============================================================================
// BOOKING
// ==============================================================================

/// Patients book for themselves; staff supply the patient's contact details.
#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    headers: HeaderMap,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let actor = actor_for(&user);

    let (patient, patient_id) = match actor.role {
        Role::Patient => (actor.identity.as_patient_identity(), Some(actor.identity.id.clone())),
        Role::Doctor if request.doctor_id != actor.identity.id => {
            return Err(AppError::Forbidden(
                "Doctors can only book on their own calendar".to_string(),
            ));
        }
        Role::Doctor | Role::Admin => {
            let patient = request.patient.clone().ok_or_else(|| {
                AppError::ValidationError("patient details are required".to_string())
            })?;
            (patient, None)
        }
    };

    let appointment = ledger(&state, &headers)
        .book(NewBooking {
            doctor_id: request.doctor_id,
            doctor_name: request.doctor_name,
            specialty: request.specialty,
            date: request.date,
            time: request.time,
            patient,
            patient_id,
            notes: request.notes,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "appointment": appointment,
            "refresh": true,
        })),
    ))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let appointment = SlotLedger::from_state(&state).get(&appointment_id).await?;

    if !AppointmentLifecycle::can_view(&appointment, &actor_for(&user)) {
        return Err(AppointmentError::Unauthorized.into());
    }

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    headers: HeaderMap,
    Path(appointment_id): Path<String>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = ledger(&state, &headers)
        .transition(&appointment_id, request.status, &actor_for(&user))
        .await?;

    Ok(Json(json!({
        "appointment": appointment,
        "refresh": true,
    })))
}

// ==============================================================================
// LISTINGS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_doctor_appointments(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let is_own_schedule = Role::from_user(&user) == Role::Doctor && user.id == doctor_id;
    if !is_own_schedule && Role::from_user(&user) != Role::Admin {
        return Err(AppError::Forbidden(
            "Not authorized to view this doctor's schedule".to_string(),
        ));
    }

    let appointments = SlotLedger::from_state(&state).list_for_doctor(&doctor_id).await?;
    debug!("Doctor {} has {} appointments", doctor_id, appointments.len());

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len(),
    })))
}

/// The caller's own appointments, by role.
#[axum::debug_handler]
pub async fn get_my_appointments(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_for(&user);
    let ledger = SlotLedger::from_state(&state);

    let appointments = match actor.role {
        Role::Patient => ledger.list_for_patient(&actor.identity).await?,
        Role::Doctor => ledger.list_for_doctor(&actor.identity.id).await?,
        Role::Admin => {
            return Err(AppError::BadRequest(
                "Admins have no personal appointments".to_string(),
            ))
        }
    };

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len(),
    })))
}

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<SlotAvailability>, AppError> {
    let availability = SlotLedger::from_state(&state)
        .available_slots(&query.doctor_id, query.date)
        .await?;

    Ok(Json(availability))
}
