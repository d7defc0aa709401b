// libs/consultation-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_database::AppState;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn consultation_routes(state: Arc<AppState>) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::create_request))
        .route("/doctor", get(handlers::get_doctor_requests))
        .route("/patient", get(handlers::get_patient_requests))
        .route("/{request_id}", get(handlers::get_request))
        .route("/{request_id}/accept", post(handlers::accept_request))
        .route("/{request_id}/reject", post(handlers::reject_request))
        .route("/{request_id}/cancel", post(handlers::cancel_request))
        .route("/{request_id}/complete", post(handlers::complete_request))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
