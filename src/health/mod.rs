// Health derivation from link state, device status and staleness.
//
// Nothing is stored here: every call recomputes from its inputs.

use crate::aggregate::Aggregator;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;

/// Last retained status published by the followed device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
    /// Anything else seen on the status topic
    Other(String),
}

impl DeviceStatus {
    pub fn parse(payload: &str) -> Self {
        match payload.trim() {
            "online" => DeviceStatus::Online,
            "offline" => DeviceStatus::Offline,
            other => DeviceStatus::Other(other.to_string()),
        }
    }
}

/// Overall system status shown to the viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Warning,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallStatus::Healthy => write!(f, "healthy"),
            OverallStatus::Warning => write!(f, "warning"),
        }
    }
}

/// Health flags derived on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthVector {
    pub broker_connected: bool,
    pub device_online: bool,
    pub data_flowing: bool,
    pub source_data_available: bool,
}

impl HealthVector {
    /// Derive the vector at `now`.
    ///
    /// `data_flowing` holds iff some series was updated strictly less than
    /// the aggregator's data-flow window (5s by default) before `now`.
    pub fn derive(
        broker_connected: bool,
        device_status: Option<&DeviceStatus>,
        aggregator: &Aggregator,
        now: DateTime<Utc>,
    ) -> Self {
        let window = aggregator.config().data_flow_window();
        Self {
            broker_connected,
            device_online: matches!(device_status, Some(DeviceStatus::Online)),
            data_flowing: aggregator
                .all_series()
                .filter_map(|series| series.last_update)
                .any(|at| is_fresh(at, now, window)),
            source_data_available: !aggregator.sources().is_empty(),
        }
    }

    pub fn overall(&self) -> OverallStatus {
        if self.broker_connected && self.device_online && self.data_flowing {
            OverallStatus::Healthy
        } else {
            OverallStatus::Warning
        }
    }
}

fn is_fresh(at: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    now.signed_duration_since(at) < window
}
