use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Allowed drift of a snapshot's weight sum away from 1.0.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// The full weighted constituent set effective from `effective_date` until superseded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionSnapshot {
    pub effective_date: NaiveDate,
    pub weights: BTreeMap<String, f64>,
}

impl CompositionSnapshot {
    pub fn new(effective_date: NaiveDate, weights: BTreeMap<String, f64>) -> Self {
        Self {
            effective_date,
            weights,
        }
    }

    pub fn symbols(&self) -> BTreeSet<&str> {
        self.weights.keys().map(String::as_str).collect()
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Checks the snapshot invariants: non-empty, each weight in [0, 1], sum within tolerance of 1.
    pub fn validate(&self) -> Result<(), String> {
        if self.weights.is_empty() {
            return Err(format!("Snapshot {} has no constituents", self.effective_date));
        }

        if let Some((symbol, weight)) = self
            .weights
            .iter()
            .find(|(_, w)| !w.is_finite() || **w < 0.0 || **w > 1.0)
        {
            return Err(format!(
                "Snapshot {} has out-of-range weight {} for {}",
                self.effective_date, weight, symbol
            ));
        }

        let total = self.total_weight();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(format!(
                "Snapshot {} weights sum to {} instead of 1.0",
                self.effective_date, total
            ));
        }

        Ok(())
    }
}

// Flat row shape used by the database and CSV layers.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SnapshotRow {
    pub effective_date: NaiveDate,
    pub symbol: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstituentWeight {
    pub symbol: String,
    pub weight: f64,
}

impl ConstituentWeight {
    /// Presentation order for a snapshot: weight descending, ties by symbol ascending.
    pub fn ranked(snapshot: &CompositionSnapshot) -> Vec<ConstituentWeight> {
        let mut rows: Vec<ConstituentWeight> = snapshot
            .weights
            .iter()
            .map(|(symbol, weight)| ConstituentWeight {
                symbol: symbol.clone(),
                weight: *weight,
            })
            .collect();

        rows.sort_by(|a, b| {
            b.weight
                .total_cmp(&a.weight)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        rows
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionChangeEvent {
    pub date: NaiveDate,
    pub entered: Vec<String>,
    pub exited: Vec<String>,
}

impl CompositionChangeEvent {
    /// Membership diff from `prev` to `curr`. Weight-only changes yield `None`.
    pub fn between(prev: &CompositionSnapshot, curr: &CompositionSnapshot) -> Option<Self> {
        let before = prev.symbols();
        let after = curr.symbols();

        let entered: Vec<String> = after.difference(&before).map(|s| s.to_string()).collect();
        let exited: Vec<String> = before.difference(&after).map(|s| s.to_string()).collect();

        if entered.is_empty() && exited.is_empty() {
            return None;
        }

        Some(Self {
            date: curr.effective_date,
            entered,
            exited,
        })
    }
}

/// Snapshots ordered by `effective_date`, resolved with a binary search.
#[derive(Debug, Clone, Default)]
pub struct SnapshotTimeline {
    snapshots: Vec<CompositionSnapshot>,
}

impl SnapshotTimeline {
    /// Sorts by effective date. A later entry for an already seen date replaces the earlier one.
    pub fn new(mut snapshots: Vec<CompositionSnapshot>) -> Self {
        snapshots.sort_by_key(|s| s.effective_date);
        snapshots.reverse();
        snapshots.dedup_by_key(|s| s.effective_date);
        snapshots.reverse();
        Self { snapshots }
    }

    /// Latest snapshot with `effective_date <= date`.
    pub fn at(&self, date: NaiveDate) -> Option<&CompositionSnapshot> {
        let idx = self.snapshots.partition_point(|s| s.effective_date <= date);
        idx.checked_sub(1).map(|i| &self.snapshots[i])
    }

    pub fn effective_dates_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        let from = self.snapshots.partition_point(|s| s.effective_date < start);
        self.snapshots[from..]
            .iter()
            .take_while(|s| s.effective_date <= end)
            .map(|s| s.effective_date)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
