use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// One recorded (date, symbol) tuple from the constituent source. Never mutated after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PriceObservation {
    pub date: NaiveDate,
    pub symbol: String,
    pub price: f64,
    pub weight: f64,
}

impl PriceObservation {
    pub fn new(date: NaiveDate, symbol: impl Into<String>, price: f64, weight: f64) -> Self {
        Self {
            date,
            symbol: symbol.into(),
            price,
            weight,
        }
    }
}

/// Splits observations sorted by `(date, symbol)` into one slice per trading date.
pub fn group_by_date(observations: &[PriceObservation]) -> impl Iterator<Item = (NaiveDate, &[PriceObservation])> {
    observations
        .chunk_by(|a, b| a.date == b.date)
        .map(|day| (day[0].date, day))
}
