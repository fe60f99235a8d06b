use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

// Re-export section types
pub use crate::aggregate::AggregatorConfig;
pub use crate::bridge::BridgeConfig;
pub use crate::broker::BrokerConfig;
pub use crate::topic::TopicConfig;
pub use crate::viewer::ViewerConfig;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "BEACON_CONFIG";

/// Default config file path
pub const DEFAULT_CONFIG_PATH: &str = "beacon.toml";

/// Complete Beacon configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BeaconConfig {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub topics: TopicConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub viewer: ViewerConfig,
}

/// Load configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<BeaconConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: BeaconConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

impl BeaconConfig {
    /// Load from `$BEACON_CONFIG` (or `beacon.toml`), falling back to defaults
    /// when the file does not exist, then apply broker env overrides.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = if Path::new(&path).exists() {
            info!(path = %path, "Loading configuration");
            load_config(&path)?
        } else {
            info!(path = %path, "No config file, using defaults");
            BeaconConfig::default()
        };
        config.broker = config.broker.with_env_overrides();
        Ok(config)
    }
}
