// libs/consultation-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};
use tracing::warn;

use shared_database::AppState;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::identity::{Role, SessionIdentity};
use shared_utils::extractor::session_id_from_headers;

use crate::models::{AcceptResponse, ConsultationError, CreateConsultationRequest, NewConsultation};
use crate::services::MatchRequestBroker;

impl From<ConsultationError> for AppError {
    fn from(e: ConsultationError) -> Self {
        match e {
            ConsultationError::NotFound(_) => AppError::NotFound(e.to_string()),
            ConsultationError::DoctorOffline(_)
            | ConsultationError::DuplicateRequest { .. }
            | ConsultationError::RequestAlreadyResolved { .. }
            | ConsultationError::ConcurrentUpdate => AppError::Conflict(e.to_string()),
            ConsultationError::IllegalTransition { .. } => AppError::BadRequest(e.to_string()),
            ConsultationError::Unauthorized => AppError::Forbidden(e.to_string()),
            ConsultationError::ValidationError(msg) => AppError::ValidationError(msg),
            ConsultationError::Presence(inner) => inner.into(),
            ConsultationError::Store(inner) => AppError::Database(inner.to_string()),
        }
    }
}

fn broker(state: &AppState, headers: &HeaderMap) -> MatchRequestBroker {
    MatchRequestBroker::from_state(state).with_origin(session_id_from_headers(headers))
}

fn require_role(user: &User, role: Role) -> Result<(), AppError> {
    if Role::from_user(user) == role {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!("Only a {} can do this", role)))
    }
}

/// A duplicate answers 409 with the open request, so the client can rejoin it.
#[axum::debug_handler]
pub async fn create_request(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    headers: HeaderMap,
    Json(request): Json<CreateConsultationRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_role(&user, Role::Patient)?;
    let identity = SessionIdentity::from_user(&user);

    let created = broker(&state, &headers)
        .request(NewConsultation {
            patient_id: identity.id.clone(),
            patient: identity.as_patient_identity(),
            doctor_id: request.doctor_id,
            doctor_name: request.doctor_name,
            specialty: request.specialty,
            message: request.message,
        })
        .await;

    match created {
        Ok(request) => Ok((
            StatusCode::CREATED,
            Json(json!({
                "request": request,
                "refresh": true,
            })),
        )),
        Err(ConsultationError::DuplicateRequest {
            existing_id,
            room_id,
        }) => {
            warn!("Duplicate consultation request from patient {}", identity.id);
            Ok((
                StatusCode::CONFLICT,
                Json(json!({
                    "error": "An open consultation request already exists for this doctor",
                    "existing_request_id": existing_id,
                    "room_id": room_id,
                })),
            ))
        }
        Err(e) => Err(e.into()),
    }
}

/// Someone else's request answers exactly like a missing one.
#[axum::debug_handler]
pub async fn get_request(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(request_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let request = MatchRequestBroker::from_state(&state).get(&request_id).await?;

    if !request.is_party(&user.id) && Role::from_user(&user) != Role::Admin {
        return Err(ConsultationError::NotFound(request_id).into());
    }

    Ok(Json(json!(request)))
}

#[axum::debug_handler]
pub async fn accept_request(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
) -> Result<Json<AcceptResponse>, AppError> {
    require_role(&user, Role::Doctor)?;
    let broker = broker(&state, &headers);

    let room_id = broker.accept(&request_id, &user.id).await?;
    let request = broker.get(&request_id).await?;

    Ok(Json(AcceptResponse {
        room_id,
        request,
        refresh: true,
    }))
}

#[axum::debug_handler]
pub async fn reject_request(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, Role::Doctor)?;
    let request = broker(&state, &headers).reject(&request_id, &user.id).await?;

    Ok(Json(json!({
        "request": request,
        "refresh": true,
    })))
}

#[axum::debug_handler]
pub async fn cancel_request(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, Role::Patient)?;
    let request = broker(&state, &headers).cancel(&request_id, &user.id).await?;

    Ok(Json(json!({
        "request": request,
        "refresh": true,
    })))
}

#[axum::debug_handler]
pub async fn complete_request(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let request = broker(&state, &headers).complete(&request_id, &user.id).await?;

    Ok(Json(json!({
        "request": request,
        "refresh": true,
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_requests(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, Role::Doctor)?;
    let requests = MatchRequestBroker::from_state(&state)
        .list_for_doctor(&user.id)
        .await?;

    Ok(Json(json!({
        "requests": requests,
        "total": requests.len(),
    })))
}

#[axum::debug_handler]
pub async fn get_patient_requests(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, Role::Patient)?;
    let requests = MatchRequestBroker::from_state(&state)
        .list_for_patient(&user.id)
        .await?;

    Ok(Json(json!({
        "requests": requests,
        "total": requests.len(),
    })))
}
