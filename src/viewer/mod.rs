// Dashboard side: reconnecting bridge session and the client-side reducer

mod connection;
mod dashboard;

pub use connection::{SendError, ViewerConnection};
pub use dashboard::{Dashboard, DashboardSummary, FrameOutcome, SeriesSummary};

use serde::Deserialize;
use std::time::Duration;

/// Viewer configuration
#[derive(Clone, Debug, Deserialize)]
pub struct ViewerConfig {
    /// Bridge WebSocket URL
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// How often the headless viewer logs a summary line
    #[serde(default = "default_summary_interval_secs")]
    pub summary_interval_secs: u64,
}

fn default_url() -> String {
    "ws://127.0.0.1:3001/api/mqtt-ws".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    3_000
}

fn default_summary_interval_secs() -> u64 {
    5
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            summary_interval_secs: default_summary_interval_secs(),
        }
    }
}

impl ViewerConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn summary_interval(&self) -> Duration {
        Duration::from_secs(self.summary_interval_secs.max(1))
    }
}
