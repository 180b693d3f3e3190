use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// One point of the index series. Always derived from prices and snapshots, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexLevelPoint {
    pub date: NaiveDate,
    pub index_level: f64,
    pub daily_return: f64,
    pub cumulative_return: f64,
}
