use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use appointment_cell::router::appointment_routes;
use consultation_cell::router::consultation_routes;
use presence_cell::router::presence_routes;
use session_access_cell::router::{change_routes, session_routes};
use shared_database::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic scheduling API is running!" }))
        .route("/health", get(health))
        .nest("/presence", presence_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/consultations", consultation_routes(state.clone()))
        .nest("/sessions", session_routes(state.clone()))
        .nest("/changes", change_routes(state))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
