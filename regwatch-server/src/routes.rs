use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::scan;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/scan/readiness", get(scan::readiness))
        .route("/api/scan/status", get(scan::status))
        .route("/api/scan/start", post(scan::start))
        .route("/api/scan/pause", post(scan::pause))
        .route("/api/scan/resume", post(scan::resume))
        .route("/api/scan/stop", post(scan::stop))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
