mod config;
mod scope;
mod timestamp;

pub use config::TemporalConfig;
pub use scope::TemporalScope;
pub use timestamp::{END_OF_TIME, Timestamp};
