use super::AppState;
use crate::bridge::ViewerSession;
use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
    routing::get,
    Router,
};
use tracing::info;

/// GET {ws_path} - viewer WebSocket upgrade
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    info!("Viewer WebSocket upgrade request received");
    ws.on_upgrade(move |socket| async move {
        let (session, outbound) = ViewerSession::open(state.bridge);
        session.run(socket, outbound).await;
    })
}

pub fn create_ws_router(state: AppState, ws_path: &str) -> Router {
    Router::new()
        .route(ws_path, get(ws_handler))
        .with_state(state)
}
