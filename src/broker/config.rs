use serde::Deserialize;
use std::time::Duration;

/// MQTT broker configuration
#[derive(Clone, Debug, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connect over TLS with the platform's root certificates
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Generated per process when absent
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// How long `connect` waits for the first connection outcome
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Upper bound for the reconnect delay. Unset or equal to
    /// `reconnect_delay_ms` keeps the delay fixed.
    #[serde(default)]
    pub max_reconnect_delay_ms: Option<u64>,
    /// Bound on the offline-publish + disconnect sequence at shutdown
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    /// Capacity of the client → event loop request channel
    #[serde(default = "default_request_capacity")]
    pub request_capacity: usize,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_reconnect_delay_ms() -> u64 {
    3_000
}

fn default_shutdown_timeout_ms() -> u64 {
    2_000
}

fn default_request_capacity() -> usize {
    64
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tls: false,
            username: None,
            password: None,
            client_id: None,
            keep_alive_secs: default_keep_alive_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_delay_ms: None,
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            request_capacity: default_request_capacity(),
        }
    }
}

impl BrokerConfig {
    /// Apply `BEACON_BROKER_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("BEACON_BROKER_HOST") {
            self.host = v;
        }
        if let Ok(v) = std::env::var("BEACON_BROKER_PORT") {
            if let Ok(port) = v.parse::<u16>() {
                self.port = port;
            }
        }
        if let Ok(v) = std::env::var("BEACON_BROKER_TLS") {
            if let Ok(b) = v.parse::<bool>() {
                self.tls = b;
            }
        }
        if let Ok(v) = std::env::var("BEACON_BROKER_USERNAME") {
            self.username = Some(v);
        }
        if let Ok(v) = std::env::var("BEACON_BROKER_PASSWORD") {
            self.password = Some(v);
        }
        self
    }

    pub fn keep_alive(&self) -> Duration {
        // The MQTT client rejects keep-alives under 5s
        Duration::from_secs(self.keep_alive_secs.max(5))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms.unwrap_or(self.reconnect_delay_ms))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
