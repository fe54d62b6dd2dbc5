//! Handlers for the scan control surface.
//!
//! Start/pause/resume/stop are acknowledged synchronously; the work itself
//! runs on the orchestrator's spawned task and is observed via the status
//! endpoint.

use axum::{Json, extract::State, http::StatusCode};
use tracing::info;

use regwatch_model::{
    ReadinessResponse, ScanStatusResponse, StartScanRequest, StartScanResponse, StopScanResponse,
};

use crate::errors::AppResult;
use crate::state::AppState;

/// `GET /api/scan/readiness`: credential probe plus registry size.
pub async fn readiness(State(state): State<AppState>) -> AppResult<Json<ReadinessResponse>> {
    Ok(Json(state.orchestrator.readiness().await?))
}

/// `GET /api/scan/status`: live counters, trailing outcomes and ETA. Never
/// fails; before any run it reports the idle shape.
pub async fn status(State(state): State<AppState>) -> Json<ScanStatusResponse> {
    Json(state.orchestrator.status().await)
}

/// `POST /api/scan/start`: validate and kick off a run. Rejections carry a
/// machine-readable reason in the error body.
pub async fn start(
    State(state): State<AppState>,
    Json(request): Json<StartScanRequest>,
) -> AppResult<(StatusCode, Json<StartScanResponse>)> {
    let response = state.orchestrator.start(&request).await?;
    info!(scan_id = %response.scan_id, total_items = response.total_items, "scan start accepted");
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// `POST /api/scan/pause`: halt dispatch after in-flight lookups land.
pub async fn pause(State(state): State<AppState>) -> AppResult<Json<ScanStatusResponse>> {
    let snapshot = state.orchestrator.pause().await?;
    Ok(Json(snapshot.into()))
}

/// `POST /api/scan/resume`: continue a paused run, including one persisted
/// by a previous process.
pub async fn resume(State(state): State<AppState>) -> AppResult<Json<ScanStatusResponse>> {
    let snapshot = state.orchestrator.resume().await?;
    Ok(Json(snapshot.into()))
}

/// `POST /api/scan/stop`: terminal; returns the final counters.
pub async fn stop(State(state): State<AppState>) -> AppResult<Json<StopScanResponse>> {
    Ok(Json(state.orchestrator.stop().await?))
}
