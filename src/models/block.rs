use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The trailing run of transcript records with no gap over the block threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityBlock {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub entries: usize,
    pub cost: f64,
}

impl ActivityBlock {
    pub fn duration_hours(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / 3_600_000.0
    }
}
