// Client-side reducer: rolling series, discovered sources, class statistics

pub mod config;
mod engine;
mod flood;
mod series;
mod source;
mod trend;

pub use config::AggregatorConfig;
pub use engine::{Aggregator, Applied};
pub use flood::{Dropped, FloodGate};
pub use series::{Sample, SeriesState};
pub use source::{ClassSample, ClassStats, SourceRecord};
pub use trend::Trend;
