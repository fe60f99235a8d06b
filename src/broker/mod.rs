// MQTT broker integration

mod client;
mod config;

pub use client::{BrokerClient, LinkStatus};
pub use config::BrokerConfig;
pub use rumqttc::QoS;

use crate::link::ConnectionState;
use std::fmt;

/// Receives everything the broker delivers, in arrival order.
///
/// Called from the broker read loop: implementations must not block.
pub trait MessageHandler: Send + Sync + 'static {
    fn on_message(&self, topic: &str, payload: &[u8]);

    /// Called after every broker link state change.
    fn on_link_change(&self, _state: ConnectionState) {}
}

/// Publish side of the broker link, as seen by the bridge
pub trait CommandSink: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Hand a message to the broker link without waiting for delivery.
    fn publish(&self, topic: &str, payload: &str, options: PublishOptions) -> Result<(), PublishError>;
}

/// Per-publish delivery options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    pub qos: QoS,
    pub retain: bool,
}

impl PublishOptions {
    /// qos 0, not retained: what viewer commands use
    pub fn fire_and_forget() -> Self {
        Self {
            qos: QoS::AtMostOnce,
            retain: false,
        }
    }

    pub fn retained() -> Self {
        Self {
            qos: QoS::AtMostOnce,
            retain: true,
        }
    }
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self::fire_and_forget()
    }
}

/// Broker connection failures. None of these are fatal: the link keeps retrying.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionError {
    /// Broker refused the session (bad credentials, not authorized, ...)
    Refused(String),
    /// Network or protocol failure
    Transport(String),
    /// No outcome within the connect timeout
    Timeout,
    /// `connect` was already called on this client
    AlreadyStarted,
    /// Link was shut down
    Closed,
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::Refused(reason) => write!(f, "broker refused connection: {}", reason),
            ConnectionError::Transport(reason) => write!(f, "broker transport error: {}", reason),
            ConnectionError::Timeout => write!(f, "timed out waiting for broker connection"),
            ConnectionError::AlreadyStarted => write!(f, "broker link already started"),
            ConnectionError::Closed => write!(f, "broker link closed"),
        }
    }
}

impl std::error::Error for ConnectionError {}

impl From<&rumqttc::ConnectionError> for ConnectionError {
    fn from(e: &rumqttc::ConnectionError) -> Self {
        match e {
            rumqttc::ConnectionError::ConnectionRefused(code) => {
                ConnectionError::Refused(format!("{:?}", code))
            }
            other => ConnectionError::Transport(other.to_string()),
        }
    }
}

/// Publish failures reported to the caller
#[derive(Debug, Clone, PartialEq)]
pub enum PublishError {
    /// Broker link is not connected; nothing was attempted
    NotConnected,
    /// Link is up but the request could not be queued
    Rejected(String),
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishError::NotConnected => write!(f, "broker not connected"),
            PublishError::Rejected(reason) => write!(f, "publish rejected: {}", reason),
        }
    }
}

impl std::error::Error for PublishError {}
