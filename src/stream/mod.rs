use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

mod validation;
#[cfg(test)]
mod tests;

pub use validation::{Rejection, StreamValidator};

/// Sensor kinds tracked as rolling series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Temperature,
    Humidity,
    Luminosity,
    Sound,
}

impl SensorKind {
    pub const ALL: [SensorKind; 4] = [
        SensorKind::Temperature,
        SensorKind::Humidity,
        SensorKind::Luminosity,
        SensorKind::Sound,
    ];

    /// Kinds with their own data topic. Humidity is carried inside temperature payloads.
    pub const PUBLISHED: [SensorKind; 3] = [
        SensorKind::Temperature,
        SensorKind::Luminosity,
        SensorKind::Sound,
    ];

    /// Accepted `[min, max]` range, inclusive
    pub fn range(self) -> (f64, f64) {
        match self {
            SensorKind::Temperature => (-40.0, 85.0),
            SensorKind::Humidity => (0.0, 100.0),
            SensorKind::Luminosity => (0.0, 100.0),
            SensorKind::Sound => (0.0, 100.0),
        }
    }

    pub fn accepts(self, value: f64) -> bool {
        let (min, max) = self.range();
        value.is_finite() && value >= min && value <= max
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Humidity => "humidity",
            SensorKind::Luminosity => "luminosity",
            SensorKind::Sound => "sound",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single validated measurement. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    pub kind: SensorKind,
    pub value: f64,
    #[serde(rename = "observedAt")]
    pub observed_at: DateTime<Utc>,
}

/// Where a validated message came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// One of the followed device's fixed data topics
    Device,
    /// A dynamically discovered source, keyed by name
    Source(String),
}

/// Output of a successful parse: one message, one or more readings sharing a timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedMessage {
    pub origin: Origin,
    pub readings: Vec<Reading>,
}

impl ValidatedMessage {
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        self.readings.first().map(|r| r.observed_at)
    }
}
