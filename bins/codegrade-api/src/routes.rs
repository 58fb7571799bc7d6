use crate::handlers;
use crate::AppState;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/evaluate", post(handlers::evaluate))
        .route("/status", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
}
