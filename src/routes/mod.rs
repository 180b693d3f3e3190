pub mod changes;
pub mod composition;
pub mod export;
pub mod health;
pub mod performance;

use serde::Deserialize;

use crate::errors::AppError;
use crate::models::DateRange;

/// Raw `start_date`/`end_date` query parameters, validated into a [`DateRange`].
#[derive(Debug, Deserialize)]
pub struct RangeParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl RangeParams {
    /// `end_required = false` lets a missing end date collapse to the start date.
    pub fn into_range(self, end_required: bool) -> Result<DateRange, AppError> {
        let start = self
            .start_date
            .ok_or_else(|| AppError::Validation("start_date is required".to_string()))?;

        if end_required && self.end_date.is_none() {
            return Err(AppError::Validation("end_date is required".to_string()));
        }

        DateRange::parse(&start, self.end_date.as_deref())
    }
}
