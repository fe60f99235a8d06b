use serde::Deserialize;

/// Aggregator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfig {
    /// Minimum spacing between accepted messages on the same topic
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Rolling history length per sensor series
    #[serde(default = "default_series_capacity")]
    pub series_capacity: usize,
    /// Rolling history length per discovered source
    #[serde(default = "default_source_capacity")]
    pub source_capacity: usize,
    /// Length of the shared cross-source sample list
    #[serde(default = "default_class_capacity")]
    pub class_capacity: usize,
    /// A series updated within this window counts as "data flowing"
    #[serde(default = "default_data_flow_window_ms")]
    pub data_flow_window_ms: u64,
    /// A source updated within this window counts as "active"
    #[serde(default = "default_source_active_window_ms")]
    pub source_active_window_ms: u64,
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_series_capacity() -> usize {
    50
}

fn default_source_capacity() -> usize {
    30
}

fn default_class_capacity() -> usize {
    100
}

fn default_data_flow_window_ms() -> u64 {
    5_000
}

fn default_source_active_window_ms() -> u64 {
    30_000
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            series_capacity: default_series_capacity(),
            source_capacity: default_source_capacity(),
            class_capacity: default_class_capacity(),
            data_flow_window_ms: default_data_flow_window_ms(),
            source_active_window_ms: default_source_active_window_ms(),
        }
    }
}

impl AggregatorConfig {
    pub fn debounce(&self) -> chrono::Duration {
        millis(self.debounce_ms)
    }

    pub fn data_flow_window(&self) -> chrono::Duration {
        millis(self.data_flow_window_ms)
    }

    pub fn source_active_window(&self) -> chrono::Duration {
        millis(self.source_active_window_ms)
    }
}

fn millis(ms: u64) -> chrono::Duration {
    chrono::Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX / 1_000))
}
