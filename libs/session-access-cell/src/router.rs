// libs/session-access-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_database::AppState;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn session_routes(state: Arc<AppState>) -> Router {
    let protected_routes = Router::new()
        .route(
            "/appointments/{appointment_id}/join",
            post(handlers::join_appointment_session),
        )
        .route(
            "/consultations/{request_id}/join",
            post(handlers::join_consultation_session),
        )
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}

pub fn change_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/stream", get(handlers::change_stream))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
