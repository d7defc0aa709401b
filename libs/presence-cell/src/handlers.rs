// libs/presence-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};

use shared_database::AppState;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::identity::Role;
use shared_utils::extractor::session_id_from_headers;

use crate::models::{DoctorPresenceResponse, HeartbeatResponse, PresenceError};
use crate::services::PresenceRegistry;

impl From<PresenceError> for AppError {
    fn from(e: PresenceError) -> Self {
        match e {
            PresenceError::MissingDoctorId => AppError::ValidationError(e.to_string()),
            PresenceError::NotADoctor => AppError::Forbidden(e.to_string()),
            PresenceError::Store(inner) => AppError::Database(inner.to_string()),
        }
    }
}

/// Doctor clients call this on a timer while their dashboard is open.
#[axum::debug_handler]
pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    headers: HeaderMap,
) -> Result<Json<HeartbeatResponse>, AppError> {
    if Role::from_user(&user) != Role::Doctor {
        return Err(PresenceError::NotADoctor.into());
    }

    let registry =
        PresenceRegistry::from_state(&state).with_origin(session_id_from_headers(&headers));
    let entry = registry.heartbeat(&user.id).await?;

    Ok(Json(HeartbeatResponse {
        expires_at: entry.expires_at(registry.ttl()),
        doctor_id: entry.doctor_id,
        last_seen_at: entry.last_seen_at,
        next_heartbeat_in_seconds: state.config.heartbeat_interval_seconds,
    }))
}

#[axum::debug_handler]
pub async fn list_online_doctors(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    let online = PresenceRegistry::from_state(&state).list_online().await?;

    Ok(Json(json!({
        "doctor_ids": online,
        "count": online.len(),
        "ttl_seconds": state.config.presence_ttl_seconds,
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_presence(
    State(state): State<Arc<AppState>>,
    Path(doctor_id): Path<String>,
) -> Result<Json<DoctorPresenceResponse>, AppError> {
    let registry = PresenceRegistry::from_state(&state);
    let entry = registry.get(&doctor_id).await?;
    let online = registry.is_online(&doctor_id).await?;

    Ok(Json(DoctorPresenceResponse {
        doctor_id,
        online,
        last_seen_at: entry.map(|e| e.last_seen_at),
    }))
}
