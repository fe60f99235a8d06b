// Topic tokenizing, wildcard matching and the fixed topic table.

mod pattern;
mod table;

pub use pattern::{Segment, TopicPattern, TopicPatternError};
pub use table::{CommandTopic, TopicClass, TopicConfig, TopicTable};

/// Split a topic into its `/`-separated levels.
///
/// Empty levels are kept: `"a//b"` has three levels, the middle one empty.
pub fn levels(topic: &str) -> impl Iterator<Item = &str> {
    topic.split('/')
}
