use super::trend::Trend;
use crate::stream::SensorKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

/// One point of a rolling history
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub value: f64,
    pub at: DateTime<Utc>,
}

/// Push to the back, evicting from the front beyond `capacity`.
pub(crate) fn push_bounded<T>(window: &mut VecDeque<T>, item: T, capacity: usize) {
    window.push_back(item);
    while window.len() > capacity {
        window.pop_front();
    }
}

pub(crate) fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Rolling state for one sensor kind.
///
/// `min`/`max` cover every value ever applied, so they always bound the
/// (shorter) history.
#[derive(Debug, Clone, Serialize)]
pub struct SeriesState {
    pub kind: SensorKind,
    pub current: f64,
    pub min: f64,
    pub max: f64,
    pub average: f64,
    pub history: VecDeque<Sample>,
    #[serde(rename = "lastUpdate")]
    pub last_update: Option<DateTime<Utc>>,
}

impl SeriesState {
    pub fn new(kind: SensorKind) -> Self {
        Self {
            kind,
            current: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            average: 0.0,
            history: VecDeque::new(),
            last_update: None,
        }
    }

    pub(crate) fn apply(&mut self, value: f64, at: DateTime<Utc>, capacity: usize) {
        push_bounded(&mut self.history, Sample { value, at }, capacity);
        self.current = value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.last_update = Some(at);
        self.average = mean(self.history.iter().map(|s| s.value));
    }

    pub fn is_empty(&self) -> bool {
        self.last_update.is_none()
    }

    /// `(min, max)` once at least one value was applied
    pub fn bounds(&self) -> Option<(f64, f64)> {
        (!self.is_empty()).then_some((self.min, self.max))
    }

    pub fn values(&self) -> Vec<f64> {
        self.history.iter().map(|s| s.value).collect()
    }

    pub fn trend(&self) -> Trend {
        Trend::of(&self.values())
    }
}
