use chrono::NaiveDate;
use serde::Serialize;

use crate::errors::AppError;

/// Parses a strict `YYYY-MM-DD` calendar date.
pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate, AppError> {
    let value = value.trim();
    let bytes = value.as_bytes();
    let well_formed = bytes.len() == 10 && bytes[4] == b'-' && bytes[7] == b'-';

    if !well_formed {
        return Err(AppError::Validation(format!(
            "{} must be a YYYY-MM-DD date, got '{}'",
            field, value
        )));
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        AppError::Validation(format!("{} is not a valid calendar date: '{}'", field, value))
    })
}

// Inclusive date range with start <= end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, AppError> {
        if start > end {
            return Err(AppError::InvalidRange(format!(
                "start_date {} is after end_date {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Parses both bounds. A missing end bound collapses the range to the start date.
    pub fn parse(start: &str, end: Option<&str>) -> Result<Self, AppError> {
        let start = parse_date("start_date", start)?;
        let end = match end {
            Some(end) => parse_date("end_date", end)?,
            None => start,
        };
        Self::new(start, end)
    }

    pub fn single(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }
}
