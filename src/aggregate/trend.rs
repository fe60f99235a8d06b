use serde::Serialize;
use std::fmt;

/// Number of values in each compared window
const WINDOW: usize = 5;
/// Deltas smaller than this read as stable
const STABLE_THRESHOLD: f64 = 0.1;

/// Direction of recent change, for display only
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "direction", rename_all = "lowercase")]
pub enum Trend {
    Stable,
    Rising { delta: f64 },
    Falling { delta: f64 },
}

impl Trend {
    /// Compare the mean of the last 5 values with the mean of the 5 before them.
    ///
    /// With fewer than 6 values there is nothing to compare against, so the
    /// result is `Stable`.
    pub fn of(values: &[f64]) -> Self {
        let len = values.len();
        if len <= WINDOW {
            return Trend::Stable;
        }

        let recent = &values[len - WINDOW..];
        let previous = &values[len.saturating_sub(2 * WINDOW)..len - WINDOW];

        let delta = average(recent) - average(previous);
        if delta.abs() < STABLE_THRESHOLD {
            Trend::Stable
        } else if delta > 0.0 {
            Trend::Rising { delta }
        } else {
            Trend::Falling { delta }
        }
    }

    pub fn delta(&self) -> f64 {
        match self {
            Trend::Stable => 0.0,
            Trend::Rising { delta } | Trend::Falling { delta } => *delta,
        }
    }
}

fn average(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Stable => write!(f, "stable"),
            Trend::Rising { delta } => write!(f, "rising (+{:.1})", delta),
            Trend::Falling { delta } => write!(f, "falling ({:.1})", delta),
        }
    }
}
