// libs/session-access-cell/src/handlers.rs
use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{self, Stream};
use tracing::debug;

use shared_database::{AppState, ChangeNotice};
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::identity::{Role, SessionIdentity};
use shared_utils::extractor::{session_id_from_headers, AuthToken};

use crate::models::{AccessError, JoinResponse, StreamQuery};
use crate::services::SessionJoinService;

impl From<AccessError> for AppError {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::Unauthorized => AppError::Forbidden(e.to_string()),
            AccessError::Appointment(inner) => inner.into(),
            AccessError::Consultation(inner) => inner.into(),
            AccessError::Store(inner) => AppError::Database(inner.to_string()),
        }
    }
}

#[axum::debug_handler]
pub async fn join_appointment_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Extension(token): Extension<AuthToken>,
    Path(appointment_id): Path<String>,
) -> Result<Json<JoinResponse>, AppError> {
    let response = SessionJoinService::from_state(&state)
        .join_appointment(
            &appointment_id,
            &SessionIdentity::from_user(&user),
            Role::from_user(&user),
            Some(token.0.as_str()),
        )
        .await?;

    Ok(Json(response))
}

#[axum::debug_handler]
pub async fn join_consultation_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Extension(token): Extension<AuthToken>,
    Path(request_id): Path<String>,
) -> Result<Json<JoinResponse>, AppError> {
    let response = SessionJoinService::from_state(&state)
        .join_consultation(
            &request_id,
            &SessionIdentity::from_user(&user),
            Role::from_user(&user),
            Some(token.0.as_str()),
        )
        .await?;

    Ok(Json(response))
}

/// Payload-free change signals for one client session. Clients re-read on every
/// event; `resync` means signals were dropped.
pub async fn change_stream(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = query
        .session_id
        .filter(|id| !id.trim().is_empty())
        .or_else(|| session_id_from_headers(&headers))
        .unwrap_or_else(|| user.id.clone());
    debug!("Change stream opened for session {}", session_id);

    let subscription = state.bus.subscribe(session_id);
    let events = stream::unfold(subscription, |mut subscription| async move {
        let notice = subscription.recv().await?;
        let name = match notice {
            ChangeNotice::Changed => "changed",
            ChangeNotice::Resync => "resync",
        };
        Some((
            Ok::<_, Infallible>(Event::default().event(name).data(name)),
            subscription,
        ))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
