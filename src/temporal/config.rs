use super::{END_OF_TIME, Timestamp};
use serde::{Deserialize, Serialize};

/// Per-entity-type temporal column configuration, supplied at registration
/// time. No reflection: every engine reads column names from here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalConfig {
    pub start_column: String,
    pub end_column: String,
    pub created_column: String,
    pub max_timestamp: Timestamp,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            start_column: "valid_from".to_string(),
            end_column: "valid_to".to_string(),
            created_column: "created_at".to_string(),
            max_timestamp: END_OF_TIME,
        }
    }
}

impl TemporalConfig {
    pub fn new(
        start_column: impl Into<String>,
        end_column: impl Into<String>,
        created_column: impl Into<String>,
    ) -> Self {
        Self {
            start_column: start_column.into(),
            end_column: end_column.into(),
            created_column: created_column.into(),
            max_timestamp: END_OF_TIME,
        }
    }
}
