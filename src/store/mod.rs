use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{CompositionSnapshot, PriceObservation};

mod memory;
mod postgres;

pub use memory::{DatasetView, IndexDataset, InMemoryConstituentStore};
pub use postgres::PgConstituentStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),

    #[error("invalid stored data: {0}")]
    InvalidData(String),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Read-only source of daily constituent prices and composition snapshots.
///
/// Implementations must be safe for unlimited concurrent readers and every call must
/// observe a consistent view of the data: either entirely before or entirely after any
/// write performed by the ingestion path.
#[async_trait]
pub trait ConstituentStore: Send + Sync {
    /// Observations with `start <= date <= end`, ordered by `(date, symbol)`.
    async fn get_prices(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceObservation>, StoreError>;

    /// Latest snapshot with `effective_date <= date`.
    async fn get_snapshot(&self, date: NaiveDate) -> Result<CompositionSnapshot, StoreError>;

    /// Ascending effective dates of snapshots with `start <= effective_date <= end`.
    async fn list_snapshot_dates(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StoreError>;

    /// Handle whose reads all see the data published when it was taken.
    /// Operations that issue several reads take one view per request.
    fn read_view(&self) -> Arc<dyn ConstituentStore>;
}

pub(crate) fn no_snapshot(date: NaiveDate) -> StoreError {
    StoreError::NotFound(format!("No composition snapshot effective on or before {}", date))
}
