use super::series::{mean, push_bounded, Sample};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};

/// Latest readings from one discovered source.
///
/// Never removed once created; stale records are filtered out of "active"
/// views instead.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRecord {
    pub name: String,
    pub latest: f64,
    pub history: VecDeque<Sample>,
    #[serde(rename = "lastUpdate")]
    pub last_update: DateTime<Utc>,
}

impl SourceRecord {
    pub(crate) fn new(name: &str, value: f64, at: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            latest: value,
            history: VecDeque::new(),
            last_update: at,
        }
    }

    pub(crate) fn apply(&mut self, value: f64, at: DateTime<Utc>, capacity: usize) {
        push_bounded(&mut self.history, Sample { value, at }, capacity);
        self.latest = value;
        self.last_update = at;
    }

    /// Active iff updated strictly less than `window` before `now`.
    pub fn is_active(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now.signed_duration_since(self.last_update) < window
    }
}

/// Entry of the shared cross-source list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassSample {
    pub source: String,
    pub value: f64,
    pub at: DateTime<Utc>,
}

/// Aggregate over the shared cross-source list
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ClassStats {
    pub average: f64,
    #[serde(rename = "sourceCount")]
    pub source_count: usize,
}

impl ClassStats {
    pub(crate) fn compute(samples: &VecDeque<ClassSample>) -> Self {
        let distinct: HashSet<&str> = samples.iter().map(|s| s.source.as_str()).collect();
        Self {
            average: mean(samples.iter().map(|s| s.value)),
            source_count: distinct.len(),
        }
    }
}
