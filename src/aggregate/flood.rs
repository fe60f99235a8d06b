// Per-topic flood protection.
//
// Lossy on purpose: a message arriving inside the debounce window of the last
// accepted message on the same topic is dropped, never queued or merged.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt;

/// Why an otherwise valid message was not applied
#[derive(Debug, Clone, PartialEq)]
pub enum Dropped {
    FloodProtected { topic: String, elapsed_ms: i64 },
}

impl fmt::Display for Dropped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dropped::FloodProtected { topic, elapsed_ms } => write!(
                f,
                "flood protected: '{}' accepted {}ms ago",
                topic, elapsed_ms
            ),
        }
    }
}

impl std::error::Error for Dropped {}

/// Last-accepted timestamps keyed by topic.
///
/// Entries are created lazily on the first accepted message and live as long
/// as the owning aggregator.
#[derive(Debug, Clone)]
pub struct FloodGate {
    window: Duration,
    last_accepted: HashMap<String, DateTime<Utc>>,
}

impl FloodGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: HashMap::new(),
        }
    }

    /// Admit a message on `topic` observed at `now`, marking it as accepted.
    pub fn admit(&mut self, topic: &str, now: DateTime<Utc>) -> Result<(), Dropped> {
        if let Some(last) = self.last_accepted.get(topic) {
            let elapsed = now.signed_duration_since(*last);
            if elapsed < self.window {
                return Err(Dropped::FloodProtected {
                    topic: topic.to_string(),
                    elapsed_ms: elapsed.num_milliseconds(),
                });
            }
        }
        self.last_accepted.insert(topic.to_string(), now);
        Ok(())
    }

    pub fn last_accepted(&self, topic: &str) -> Option<DateTime<Utc>> {
        self.last_accepted.get(topic).copied()
    }
}
