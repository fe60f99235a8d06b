use crate::aggregate::{Aggregator, AggregatorConfig, Applied, ClassStats, Dropped, Trend};
use crate::bridge::ServerFrame;
use crate::health::{DeviceStatus, HealthVector, OverallStatus};
use crate::link::ConnectionState;
use crate::stream::{Rejection, SensorKind, StreamValidator};
use crate::topic::{TopicClass, TopicTable};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

/// What one frame did to the dashboard
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    BrokerLink(bool),
    DeviceStatus(DeviceStatus),
    Applied(Applied),
    Rejected(Rejection),
    Dropped(Dropped),
    /// Bridge reported a failed command
    CommandFailed(String),
}

/// Display line for one sensor kind
#[derive(Debug, Clone, Serialize)]
pub struct SeriesSummary {
    pub kind: SensorKind,
    pub current: f64,
    pub average: f64,
    pub trend: Trend,
}

/// Snapshot of everything the dashboard shows
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub overall: OverallStatus,
    pub health: HealthVector,
    pub series: Vec<SeriesSummary>,
    pub class_stats: ClassStats,
    pub class_trend: Trend,
    pub active_sources: Vec<String>,
}

/// Client-side view state fed by bridge frames.
///
/// Each dashboard owns its own aggregator; nothing is shared between instances.
pub struct Dashboard {
    validator: StreamValidator,
    aggregator: Aggregator,
    device_status: Option<DeviceStatus>,
    /// Broker link as last reported by the bridge
    broker_connected: bool,
    /// Our own link to the bridge
    link: ConnectionState,
}

impl Dashboard {
    pub fn new(topics: TopicTable, config: AggregatorConfig) -> Self {
        Self {
            validator: StreamValidator::new(topics),
            aggregator: Aggregator::new(config),
            device_status: None,
            broker_connected: false,
            link: ConnectionState::Disconnected,
        }
    }

    /// Apply one frame received at `now`.
    pub fn apply_frame(&mut self, frame: &ServerFrame, now: DateTime<Utc>) -> FrameOutcome {
        match frame {
            ServerFrame::Connection { broker_connected } => {
                info!(broker_connected = broker_connected, "Bridge reported broker link");
                self.broker_connected = *broker_connected;
                FrameOutcome::BrokerLink(*broker_connected)
            }
            ServerFrame::Data { topic, message, .. } => self.apply_message(topic, message, now),
            ServerFrame::Error { error } => {
                warn!(error = %error, "Bridge rejected command");
                FrameOutcome::CommandFailed(error.clone())
            }
        }
    }

    fn apply_message(&mut self, topic: &str, message: &str, now: DateTime<Utc>) -> FrameOutcome {
        if let Some(TopicClass::Status) = self.validator.topics().classify(topic) {
            let status = DeviceStatus::parse(message);
            info!(status = ?status, "Device status");
            self.device_status = Some(status.clone());
            return FrameOutcome::DeviceStatus(status);
        }

        let validated = match self.validator.parse(topic, message, now) {
            Ok(validated) => validated,
            Err(rejection) => {
                warn!(topic = %topic, reason = %rejection, "Rejected message");
                return FrameOutcome::Rejected(rejection);
            }
        };

        match self.aggregator.accept(topic, &validated) {
            Ok(applied) => {
                debug!(topic = %topic, "Applied message");
                FrameOutcome::Applied(applied)
            }
            Err(dropped) => FrameOutcome::Dropped(dropped),
        }
    }

    /// Track our own link; losing it also means we no longer know the broker's state.
    pub fn set_link(&mut self, state: ConnectionState) {
        self.link = state;
        if !state.is_connected() {
            self.broker_connected = false;
        }
    }

    pub fn link(&self) -> ConnectionState {
        self.link
    }

    pub fn device_status(&self) -> Option<&DeviceStatus> {
        self.device_status.as_ref()
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn health(&self, now: DateTime<Utc>) -> HealthVector {
        HealthVector::derive(
            self.broker_connected && self.link.is_connected(),
            self.device_status.as_ref(),
            &self.aggregator,
            now,
        )
    }

    pub fn summary(&self, now: DateTime<Utc>) -> DashboardSummary {
        let health = self.health(now);
        DashboardSummary {
            overall: health.overall(),
            health,
            series: self
                .aggregator
                .all_series()
                .filter(|series| !series.is_empty())
                .map(|series| SeriesSummary {
                    kind: series.kind,
                    current: series.current,
                    average: series.average,
                    trend: series.trend(),
                })
                .collect(),
            class_stats: self.aggregator.class_stats(),
            class_trend: self.aggregator.class_trend(),
            active_sources: self
                .aggregator
                .active_sources(now)
                .into_iter()
                .map(|record| record.name.clone())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const TEMP: &str = "m2ccm/noa/g22315333/data/temperature";
    const STATUS: &str = "m2ccm/noa/g22315333/statut";

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_707_668_400_000 + ms).unwrap()
    }

    fn dashboard() -> Dashboard {
        let mut dashboard = Dashboard::new(
            TopicTable::new("m2ccm", "noa/g22315333").unwrap(),
            AggregatorConfig::default(),
        );
        dashboard.set_link(ConnectionState::Connected);
        dashboard
    }

    fn data(topic: &str, message: &str) -> ServerFrame {
        ServerFrame::data(topic, message, t(0))
    }

    #[test]
    fn test_temperature_with_humidity_end_to_end() {
        let mut dash = dashboard();
        let outcome = dash.apply_frame(&data(TEMP, r#"{"value": 23.5, "humidity": 41}"#), t(0));
        assert!(matches!(outcome, FrameOutcome::Applied(_)));

        let agg = dash.aggregator();
        let temp = agg.series(SensorKind::Temperature).unwrap();
        let hum = agg.series(SensorKind::Humidity).unwrap();
        assert_eq!(temp.current, 23.5);
        assert_eq!(hum.current, 41.0);
        assert_eq!(temp.last_update, hum.last_update);
    }

    #[test]
    fn test_out_of_range_leaves_series_unchanged() {
        let mut dash = dashboard();
        let outcome = dash.apply_frame(&data(TEMP, r#"{"value": 999}"#), t(0));
        assert!(matches!(outcome, FrameOutcome::Rejected(Rejection::OutOfRange { .. })));
        assert!(dash.aggregator().series(SensorKind::Temperature).unwrap().is_empty());
    }

    #[test]
    fn test_status_frames_drive_device_online() {
        let mut dash = dashboard();
        dash.apply_frame(&ServerFrame::connection(true), t(0));
        dash.apply_frame(&data(STATUS, "online"), t(0));
        dash.apply_frame(&data(TEMP, r#"{"value": 20}"#), t(0));
        assert_eq!(dash.health(t(1_000)).overall(), OverallStatus::Healthy);

        // Last will delivered by the broker
        dash.apply_frame(&data(STATUS, "offline"), t(1_100));
        let health = dash.health(t(1_200));
        assert!(!health.device_online);
        assert_eq!(health.overall(), OverallStatus::Warning);
    }

    #[test]
    fn test_losing_bridge_link_clears_broker_connected() {
        let mut dash = dashboard();
        dash.apply_frame(&ServerFrame::connection(true), t(0));
        assert!(dash.health(t(0)).broker_connected);

        dash.set_link(ConnectionState::Disconnected);
        assert!(!dash.health(t(0)).broker_connected);

        // Reconnecting alone does not restore it; the bridge's frame does
        dash.set_link(ConnectionState::Connected);
        assert!(!dash.health(t(0)).broker_connected);
        dash.apply_frame(&ServerFrame::connection(true), t(0));
        assert!(dash.health(t(0)).broker_connected);
    }

    #[test]
    fn test_flood_drop_reported() {
        let mut dash = dashboard();
        dash.apply_frame(&data(TEMP, r#"{"value": 20}"#), t(0));
        let outcome = dash.apply_frame(&data(TEMP, r#"{"value": 21}"#), t(40));
        assert!(matches!(outcome, FrameOutcome::Dropped(_)));
    }

    #[test]
    fn test_summary_lists_active_sources_and_class_stats() {
        let mut dash = dashboard();
        dash.apply_frame(&data("m2ccm/zoe/d1/temp", r#"{"temp": "21.5"}"#), t(0));
        dash.apply_frame(&data("m2ccm/amy/d2/temp", r#"{"temp": 22.5}"#), t(20_000));

        let summary = dash.summary(t(40_000));
        assert_eq!(summary.active_sources, vec!["amy"]);
        assert_eq!(summary.class_stats.source_count, 2);
        assert!((summary.class_stats.average - 22.0).abs() < 1e-9);
        assert!(summary.series.is_empty());
        assert!(dash.health(t(40_000)).source_data_available);
    }

    #[test]
    fn test_command_error_frame() {
        let mut dash = dashboard();
        let outcome = dash.apply_frame(&ServerFrame::error("broker not connected"), t(0));
        assert_eq!(outcome, FrameOutcome::CommandFailed("broker not connected".to_string()));
    }
}
