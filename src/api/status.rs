use super::AppState;
use crate::bridge::BridgeStatus;
use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;

#[derive(Serialize)]
struct StatusResponse {
    success: bool,
    data: BridgeStatus,
}

pub fn create_status_router(state: AppState) -> Router {
    Router::new()
        .route("/api/mqtt/status", get(get_status))
        .with_state(state)
}

/// GET /api/mqtt/status - broker link and viewer count
async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        success: true,
        data: state.bridge.status(),
    })
}
