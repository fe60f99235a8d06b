use super::{Origin, Reading, SensorKind, ValidatedMessage};
use crate::topic::{TopicClass, TopicTable};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fmt;
use tracing::warn;

/// Numeric field carried by fixed device topics
const DEVICE_VALUE_FIELD: &str = "value";
/// Sibling humidity field in temperature payloads
const HUMIDITY_FIELD: &str = "humidity";
/// Numeric field carried by source topics
const SOURCE_VALUE_FIELD: &str = "temp";

/// Why a raw message was not turned into readings
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// Payload is not a JSON object
    MalformedPayload(String),
    /// Topic is not a data topic we know how to read
    UnknownTopic(String),
    /// Value missing, non-numeric, non-finite or outside the kind's range
    OutOfRange {
        kind: SensorKind,
        value: Option<f64>,
    },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MalformedPayload(reason) => write!(f, "malformed payload: {}", reason),
            Rejection::UnknownTopic(topic) => write!(f, "unknown topic '{}'", topic),
            Rejection::OutOfRange { kind, value } => {
                let (min, max) = kind.range();
                match value {
                    Some(v) => write!(
                        f,
                        "{} value {} out of range (expected {}..={})",
                        kind, v, min, max
                    ),
                    None => write!(f, "{} value missing or not numeric", kind),
                }
            }
        }
    }
}

impl std::error::Error for Rejection {}

/// Parses raw broker payloads into validated readings.
///
/// Rules, applied in order:
/// 1. payload must be a JSON object
/// 2. topic must classify as a fixed sensor topic or a source topic
/// 3. the numeric field (numbers or numeric strings) must be finite and in range
///
/// A temperature payload may carry a sibling `humidity` field; when finite and
/// in range it becomes a second reading with the same timestamp.
#[derive(Debug, Clone)]
pub struct StreamValidator {
    topics: TopicTable,
}

impl StreamValidator {
    pub fn new(topics: TopicTable) -> Self {
        Self { topics }
    }

    pub fn topics(&self) -> &TopicTable {
        &self.topics
    }

    pub fn parse(
        &self,
        topic: &str,
        payload: &str,
        observed_at: DateTime<Utc>,
    ) -> Result<ValidatedMessage, Rejection> {
        let body = match serde_json::from_str::<Value>(payload) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(Rejection::MalformedPayload(
                    "payload must be a JSON object".to_string(),
                ))
            }
            Err(e) => return Err(Rejection::MalformedPayload(e.to_string())),
        };

        let (origin, kind, field) = match self.topics.classify(topic) {
            Some(TopicClass::Sensor(kind)) => (Origin::Device, kind, DEVICE_VALUE_FIELD),
            Some(TopicClass::Source { name }) => {
                (Origin::Source(name), SensorKind::Temperature, SOURCE_VALUE_FIELD)
            }
            _ => return Err(Rejection::UnknownTopic(topic.to_string())),
        };

        let value = checked_value(&body, field, kind)?;
        let mut readings = vec![Reading {
            kind,
            value,
            observed_at,
        }];

        if origin == Origin::Device && kind == SensorKind::Temperature {
            if let Some(humidity) = companion_humidity(&body, topic) {
                readings.push(Reading {
                    kind: SensorKind::Humidity,
                    value: humidity,
                    observed_at,
                });
            }
        }

        Ok(ValidatedMessage { origin, readings })
    }
}

/// Accept JSON numbers and numeric strings.
fn coerce(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn checked_value(body: &Map<String, Value>, field: &str, kind: SensorKind) -> Result<f64, Rejection> {
    let value = body.get(field).and_then(coerce);
    match value {
        Some(v) if kind.accepts(v) => Ok(v),
        other => Err(Rejection::OutOfRange { kind, value: other }),
    }
}

fn companion_humidity(body: &Map<String, Value>, topic: &str) -> Option<f64> {
    let raw = body.get(HUMIDITY_FIELD)?;
    let value = coerce(raw).filter(|v| v.is_finite())?;
    if !SensorKind::Humidity.accepts(value) {
        warn!(
            topic = %topic,
            humidity = value,
            "Humidity companion out of range, dropping it"
        );
        return None;
    }
    Some(value)
}
