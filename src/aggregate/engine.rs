use super::config::AggregatorConfig;
use super::flood::{Dropped, FloodGate};
use super::series::{push_bounded, SeriesState};
use super::source::{ClassSample, ClassStats, SourceRecord};
use super::trend::Trend;
use crate::stream::{Origin, SensorKind, ValidatedMessage};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::debug;

/// What an accepted message changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Applied {
    /// Series updated by the message, in reading order
    pub kinds: Vec<SensorKind>,
    /// Source record updated by the message, if it came from a source topic
    pub source: Option<String>,
}

/// Folds validated messages into bounded view state.
///
/// Owned by exactly one message-processing path; wrap it yourself if it has
/// to be shared.
pub struct Aggregator {
    config: AggregatorConfig,
    flood: FloodGate,
    series: BTreeMap<SensorKind, SeriesState>,
    sources: HashMap<String, SourceRecord>,
    class_samples: VecDeque<ClassSample>,
    class_stats: ClassStats,
}

impl Aggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        let series = SensorKind::ALL
            .iter()
            .map(|kind| (*kind, SeriesState::new(*kind)))
            .collect();

        Self {
            flood: FloodGate::new(config.debounce()),
            config,
            series,
            sources: HashMap::new(),
            class_samples: VecDeque::new(),
            class_stats: ClassStats::default(),
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Apply a validated message received on `topic`.
    ///
    /// The message's observation time stands in for "now". A message landing
    /// inside the debounce window of the previous accepted message on the
    /// same topic is dropped whole.
    pub fn accept(&mut self, topic: &str, message: &ValidatedMessage) -> Result<Applied, Dropped> {
        let Some(now) = message.observed_at() else {
            return Ok(Applied::default());
        };

        if let Err(dropped) = self.flood.admit(topic, now) {
            debug!(topic = %topic, reason = %dropped, "Dropping message");
            return Err(dropped);
        }

        match &message.origin {
            Origin::Device => {
                let mut applied = Applied::default();
                for reading in &message.readings {
                    let series = self
                        .series
                        .entry(reading.kind)
                        .or_insert_with(|| SeriesState::new(reading.kind));
                    series.apply(reading.value, reading.observed_at, self.config.series_capacity);
                    applied.kinds.push(reading.kind);
                }
                Ok(applied)
            }
            Origin::Source(name) => {
                for reading in &message.readings {
                    self.apply_source(name, reading.value, reading.observed_at);
                }
                Ok(Applied {
                    kinds: Vec::new(),
                    source: Some(name.clone()),
                })
            }
        }
    }

    fn apply_source(&mut self, name: &str, value: f64, at: DateTime<Utc>) {
        let capacity = self.config.source_capacity;
        self.sources
            .entry(name.to_string())
            .or_insert_with(|| SourceRecord::new(name, value, at))
            .apply(value, at, capacity);

        push_bounded(
            &mut self.class_samples,
            ClassSample {
                source: name.to_string(),
                value,
                at,
            },
            self.config.class_capacity,
        );
        self.class_stats = ClassStats::compute(&self.class_samples);

        debug!(
            source = %name,
            value = value,
            class_average = self.class_stats.average,
            sources = self.class_stats.source_count,
            "Class statistics updated"
        );
    }

    pub fn series(&self, kind: SensorKind) -> Option<&SeriesState> {
        self.series.get(&kind)
    }

    pub fn all_series(&self) -> impl Iterator<Item = &SeriesState> {
        self.series.values()
    }

    /// Most recent update across every series
    pub fn last_series_update(&self) -> Option<DateTime<Utc>> {
        self.series.values().filter_map(|s| s.last_update).max()
    }

    pub fn source(&self, name: &str) -> Option<&SourceRecord> {
        self.sources.get(name)
    }

    pub fn sources(&self) -> &HashMap<String, SourceRecord> {
        &self.sources
    }

    /// Sources updated within the active window, sorted by name.
    pub fn active_sources(&self, now: DateTime<Utc>) -> Vec<&SourceRecord> {
        let window = self.config.source_active_window();
        let mut active: Vec<&SourceRecord> = self
            .sources
            .values()
            .filter(|record| record.is_active(now, window))
            .collect();
        active.sort_by(|a, b| a.name.cmp(&b.name));
        active
    }

    pub fn class_samples(&self) -> &VecDeque<ClassSample> {
        &self.class_samples
    }

    pub fn class_stats(&self) -> ClassStats {
        self.class_stats
    }

    pub fn class_trend(&self) -> Trend {
        let values: Vec<f64> = self.class_samples.iter().map(|s| s.value).collect();
        Trend::of(&values)
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(AggregatorConfig::default())
    }
}
