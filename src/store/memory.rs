use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use tracing::info;

use crate::models::{CompositionSnapshot, PriceObservation, SnapshotTimeline};
use crate::store::{no_snapshot, ConstituentStore, StoreError};

/// A validated, immutable set of prices and snapshots.
#[derive(Debug, Default)]
pub struct IndexDataset {
    prices: BTreeMap<NaiveDate, Vec<PriceObservation>>,
    timeline: SnapshotTimeline,
}

impl IndexDataset {
    /// Validates every row and snapshot and indexes them for point-in-time lookups.
    pub fn new(
        observations: Vec<PriceObservation>,
        snapshots: Vec<CompositionSnapshot>,
    ) -> Result<Self, StoreError> {
        let mut seen_dates = HashSet::new();
        for snapshot in &snapshots {
            snapshot.validate().map_err(StoreError::InvalidData)?;
            if !seen_dates.insert(snapshot.effective_date) {
                return Err(StoreError::InvalidData(format!(
                    "Duplicate snapshot for {}",
                    snapshot.effective_date
                )));
            }
        }

        let mut prices: BTreeMap<NaiveDate, Vec<PriceObservation>> = BTreeMap::new();
        for obs in observations {
            if !obs.price.is_finite() || obs.price <= 0.0 {
                return Err(StoreError::InvalidData(format!(
                    "Non-positive price {} for {} on {}",
                    obs.price, obs.symbol, obs.date
                )));
            }
            prices.entry(obs.date).or_default().push(obs);
        }

        for (date, day) in prices.iter_mut() {
            day.sort_by(|a, b| a.symbol.cmp(&b.symbol));
            if let Some(pair) = day.windows(2).find(|w| w[0].symbol == w[1].symbol) {
                return Err(StoreError::InvalidData(format!(
                    "Duplicate price for {} on {}",
                    pair[0].symbol, date
                )));
            }
        }

        Ok(Self {
            prices,
            timeline: SnapshotTimeline::new(snapshots),
        })
    }

    pub fn prices_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<PriceObservation> {
        self.prices
            .range(start..=end)
            .flat_map(|(_, day)| day.iter().cloned())
            .collect()
    }

    pub fn snapshot_at(&self, date: NaiveDate) -> Option<&CompositionSnapshot> {
        self.timeline.at(date)
    }

    pub fn snapshot_dates_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        self.timeline.effective_dates_between(start, end)
    }

    pub fn trading_days(&self) -> usize {
        self.prices.len()
    }

    pub fn snapshot_count(&self) -> usize {
        self.timeline.len()
    }
}

/// Store backed by an in-process dataset.
///
/// The dataset is published as a whole behind an `Arc`; each read clones the pointer,
/// so a concurrent `replace` is never observed half-applied.
pub struct InMemoryConstituentStore {
    current: RwLock<Arc<IndexDataset>>,
}

impl InMemoryConstituentStore {
    pub fn new(dataset: IndexDataset) -> Self {
        Self {
            current: RwLock::new(Arc::new(dataset)),
        }
    }

    /// Atomically swaps in a new dataset. Only the ingestion path calls this.
    pub fn replace(&self, dataset: IndexDataset) {
        info!(
            "Publishing dataset with {} trading days and {} snapshots",
            dataset.trading_days(),
            dataset.snapshot_count()
        );
        *self.current.write() = Arc::new(dataset);
    }

    pub fn dataset(&self) -> Arc<IndexDataset> {
        self.current.read().clone()
    }
}

/// A pinned dataset: every read goes to the same published `IndexDataset`.
#[derive(Debug, Clone)]
pub struct DatasetView(Arc<IndexDataset>);

impl DatasetView {
    pub fn new(dataset: Arc<IndexDataset>) -> Self {
        Self(dataset)
    }
}

#[async_trait]
impl ConstituentStore for DatasetView {
    async fn get_prices(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceObservation>, StoreError> {
        Ok(self.0.prices_between(start, end))
    }

    async fn get_snapshot(&self, date: NaiveDate) -> Result<CompositionSnapshot, StoreError> {
        self.0
            .snapshot_at(date)
            .cloned()
            .ok_or_else(|| no_snapshot(date))
    }

    async fn list_snapshot_dates(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StoreError> {
        Ok(self.0.snapshot_dates_between(start, end))
    }

    fn read_view(&self) -> Arc<dyn ConstituentStore> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl ConstituentStore for InMemoryConstituentStore {
    async fn get_prices(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceObservation>, StoreError> {
        Ok(self.dataset().prices_between(start, end))
    }

    async fn get_snapshot(&self, date: NaiveDate) -> Result<CompositionSnapshot, StoreError> {
        self.dataset()
            .snapshot_at(date)
            .cloned()
            .ok_or_else(|| no_snapshot(date))
    }

    async fn list_snapshot_dates(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StoreError> {
        Ok(self.dataset().snapshot_dates_between(start, end))
    }

    fn read_view(&self) -> Arc<dyn ConstituentStore> {
        Arc::new(DatasetView::new(self.dataset()))
    }
}
