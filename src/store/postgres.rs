use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use tracing::error;

use crate::db::constituent_queries;
use crate::models::{CompositionSnapshot, PriceObservation};
use crate::store::{no_snapshot, ConstituentStore, StoreError};

/// Store reading the `price_observations` and `composition_snapshots` tables.
#[derive(Clone)]
pub struct PgConstituentStore {
    pool: PgPool,
}

impl PgConstituentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConstituentStore for PgConstituentStore {
    async fn get_prices(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceObservation>, StoreError> {
        constituent_queries::fetch_prices_between(&self.pool, start, end)
            .await
            .map_err(|e| {
                error!("Failed to fetch prices between {} and {}: {}", start, end, e);
                StoreError::Db(e)
            })
    }

    async fn get_snapshot(&self, date: NaiveDate) -> Result<CompositionSnapshot, StoreError> {
        let rows = constituent_queries::fetch_snapshot_rows_at(&self.pool, date)
            .await
            .map_err(|e| {
                error!("Failed to fetch snapshot at {}: {}", date, e);
                StoreError::Db(e)
            })?;

        let effective_date = rows.first().map(|r| r.effective_date).ok_or_else(|| no_snapshot(date))?;
        let snapshot = CompositionSnapshot::new(
            effective_date,
            rows.into_iter().map(|r| (r.symbol, r.weight)).collect(),
        );
        snapshot.validate().map_err(StoreError::InvalidData)?;

        Ok(snapshot)
    }

    async fn list_snapshot_dates(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StoreError> {
        constituent_queries::fetch_snapshot_dates_between(&self.pool, start, end)
            .await
            .map_err(|e| {
                error!("Failed to list snapshot dates between {} and {}: {}", start, end, e);
                StoreError::Db(e)
            })
    }

    // Each read is a single statement; the pool handle is shared.
    fn read_view(&self) -> Arc<dyn ConstituentStore> {
        Arc::new(self.clone())
    }
}
