// Fan-out bridge between the broker link and dashboard viewers

pub mod protocol;
pub mod registry;
mod server;
mod session;

pub use protocol::{Command, CommandEnvelope, CommandError, ServerFrame};
pub use registry::{BroadcastError, BroadcastReport, Frame, ViewerId, ViewerRegistry};
pub use server::{BridgeServer, BridgeStatus, RelayError};
pub use session::ViewerSession;

use serde::Deserialize;

/// Bridge server configuration
#[derive(Clone, Debug, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
    /// Frames buffered per viewer before it is considered lagging and dropped
    #[serde(default = "default_queue_capacity")]
    pub viewer_queue_capacity: usize,
}

fn default_bind() -> String {
    "127.0.0.1:3001".to_string()
}

fn default_ws_path() -> String {
    "/api/mqtt-ws".to_string()
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            ws_path: default_ws_path(),
            viewer_queue_capacity: default_queue_capacity(),
        }
    }
}
