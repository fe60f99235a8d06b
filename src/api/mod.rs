// HTTP and WebSocket APIs

pub mod publish;
pub mod status;
pub mod websocket;

pub use publish::create_publish_router;
pub use status::create_status_router;
pub use websocket::{create_ws_router, ws_handler};

use crate::bridge::BridgeServer;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub bridge: Arc<BridgeServer>,
}

/// Full bridge router: viewer WebSocket, publish and status surfaces.
///
/// Dashboards are served from another origin, so CORS is permissive.
pub fn create_router(bridge: Arc<BridgeServer>, ws_path: &str) -> Router {
    let state = AppState { bridge };
    Router::new()
        .merge(create_ws_router(state.clone(), ws_path))
        .merge(create_publish_router(state.clone()))
        .merge(create_status_router(state))
        .layer(CorsLayer::permissive())
}
