// libs/presence-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_database::AppState;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn presence_routes(state: Arc<AppState>) -> Router {
    let protected_routes = Router::new()
        .route("/heartbeat", post(handlers::heartbeat))
        .route("/online", get(handlers::list_online_doctors))
        .route("/doctors/{doctor_id}", get(handlers::get_doctor_presence))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
