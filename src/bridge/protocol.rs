use crate::topic::{CommandTopic, TopicClass, TopicTable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest text the device display accepts
pub const MESSAGE_MAX_CHARS: usize = 16;

/// Highest servo angle in degrees
pub const SERVO_MAX_ANGLE: u16 = 180;

/// Bridge → viewer frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// Sent on viewer connect and on every broker link change
    #[serde(rename = "connection")]
    Connection {
        #[serde(rename = "brokerConnected")]
        broker_connected: bool,
    },
    /// One broker message, payload passed through untouched
    #[serde(rename = "data", alias = "mqtt-message")]
    Data {
        topic: String,
        message: String,
        /// Epoch milliseconds at which the bridge received it
        timestamp: i64,
    },
    /// A command from this viewer was not relayed
    #[serde(rename = "error")]
    Error { error: String },
}

impl ServerFrame {
    pub fn connection(broker_connected: bool) -> Self {
        ServerFrame::Connection { broker_connected }
    }

    pub fn data(topic: &str, message: &str, received_at: DateTime<Utc>) -> Self {
        ServerFrame::Data {
            topic: topic.to_string(),
            message: message.to_string(),
            timestamp: received_at.timestamp_millis(),
        }
    }

    pub fn error(reason: impl fmt::Display) -> Self {
        ServerFrame::Error {
            error: reason.to_string(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Viewer → bridge command: opaque topic and message strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub message: String,
}

impl CommandEnvelope {
    pub fn new(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Both fields present and non-empty
    pub fn is_complete(&self) -> bool {
        !self.topic.is_empty() && !self.message.is_empty()
    }
}

/// Actuator commands a viewer can issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    LedOn,
    LedOff,
    SetServoAngle(u16),
    SetMessage(String),
    SetDataTransmission(bool),
}

/// Why an envelope does not decode to a [`Command`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    NotACommandTopic(String),
    InvalidPayload { topic: String, message: String },
    AngleOutOfRange(u16),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::NotACommandTopic(topic) => write!(f, "not a command topic: {}", topic),
            CommandError::InvalidPayload { topic, message } => {
                write!(f, "invalid payload '{}' for {}", message, topic)
            }
            CommandError::AngleOutOfRange(angle) => {
                write!(f, "servo angle {} out of range (0..={})", angle, SERVO_MAX_ANGLE)
            }
        }
    }
}

impl std::error::Error for CommandError {}

impl Command {
    /// Servo command, rejecting angles past the mechanical limit
    pub fn servo(angle: u16) -> Result<Self, CommandError> {
        if angle > SERVO_MAX_ANGLE {
            return Err(CommandError::AngleOutOfRange(angle));
        }
        Ok(Command::SetServoAngle(angle))
    }

    /// Display text, truncated to what the device can show
    pub fn message(text: &str) -> Self {
        Command::SetMessage(text.chars().take(MESSAGE_MAX_CHARS).collect())
    }

    pub fn target(&self) -> CommandTopic {
        match self {
            Command::LedOn | Command::LedOff => CommandTopic::Led,
            Command::SetServoAngle(_) => CommandTopic::Servo,
            Command::SetMessage(_) => CommandTopic::Message,
            Command::SetDataTransmission(_) => CommandTopic::DataTransmission,
        }
    }

    fn payload(&self) -> String {
        match self {
            Command::LedOn => "on".to_string(),
            Command::LedOff => "off".to_string(),
            Command::SetServoAngle(angle) => angle.to_string(),
            Command::SetMessage(text) => text.chars().take(MESSAGE_MAX_CHARS).collect(),
            Command::SetDataTransmission(true) => "enable".to_string(),
            Command::SetDataTransmission(false) => "disable".to_string(),
        }
    }

    /// Encode for the wire
    pub fn to_envelope(&self, topics: &TopicTable) -> CommandEnvelope {
        CommandEnvelope::new(topics.command(self.target()), self.payload())
    }

    /// Decode an envelope back into the command it carries
    pub fn from_envelope(envelope: &CommandEnvelope, topics: &TopicTable) -> Result<Self, CommandError> {
        let target = match topics.classify(&envelope.topic) {
            Some(TopicClass::Command(target)) => target,
            _ => return Err(CommandError::NotACommandTopic(envelope.topic.clone())),
        };

        let invalid = || CommandError::InvalidPayload {
            topic: envelope.topic.clone(),
            message: envelope.message.clone(),
        };

        match target {
            CommandTopic::Led => match envelope.message.trim() {
                "on" => Ok(Command::LedOn),
                "off" => Ok(Command::LedOff),
                _ => Err(invalid()),
            },
            CommandTopic::DataTransmission => match envelope.message.trim() {
                "enable" => Ok(Command::SetDataTransmission(true)),
                "disable" => Ok(Command::SetDataTransmission(false)),
                _ => Err(invalid()),
            },
            CommandTopic::Servo => {
                let angle = envelope.message.trim().parse::<u16>().map_err(|_| invalid())?;
                Command::servo(angle)
            }
            CommandTopic::Message => Ok(Command::message(&envelope.message)),
        }
    }
}
