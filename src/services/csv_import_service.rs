use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use csv::ReaderBuilder;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::IndexConstruction;
use crate::models::{
    group_by_date, CompositionSnapshot, PriceObservation, SnapshotRow, WEIGHT_TOLERANCE,
};
use crate::services::query_cache::QueryCache;
use crate::store::{IndexDataset, InMemoryConstituentStore};

pub const PRICES_FILE: &str = "prices.csv";
pub const SNAPSHOTS_FILE: &str = "snapshots.csv";
pub const MARKET_CAPS_FILE: &str = "market_caps.csv";

/// Where the loaded snapshots came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOrigin {
    File,
    PriceWeights,
    EqualWeight { size: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportResult {
    pub observations: usize,
    pub snapshots: usize,
    pub origin: SnapshotOrigin,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketCapRow {
    pub date: NaiveDate,
    pub symbol: String,
    pub market_cap: f64,
}

/// Loads `prices.csv` (date,symbol,price,weight) from `data_dir` and builds snapshots
/// according to `construction`.
///
/// `Snapshots` reads `snapshots.csv` (effective_date,symbol,weight) when present and
/// otherwise derives snapshots from the per-date weights in the price file.
/// `EqualWeight` ranks `market_caps.csv` (date,symbol,market_cap) each trading day.
pub fn load_dataset(
    data_dir: &Path,
    construction: IndexConstruction,
) -> Result<(IndexDataset, ImportResult)> {
    let prices_path = data_dir.join(PRICES_FILE);
    let mut observations: Vec<PriceObservation> = read_rows(&prices_path)?;
    observations.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.symbol.cmp(&b.symbol)));

    let snapshots_path = data_dir.join(SNAPSHOTS_FILE);
    let (snapshots, origin) = match construction {
        IndexConstruction::EqualWeight { size } => {
            let caps_path = data_dir.join(MARKET_CAPS_FILE);
            if !caps_path.exists() {
                bail!(
                    "{} is required for equal-weight construction in {:?}",
                    MARKET_CAPS_FILE,
                    data_dir
                );
            }
            let caps: Vec<MarketCapRow> = read_rows(&caps_path)?;
            (
                equal_weight_snapshots(&observations, &caps, size),
                SnapshotOrigin::EqualWeight { size },
            )
        }
        IndexConstruction::Snapshots if snapshots_path.exists() => {
            let rows: Vec<SnapshotRow> = read_rows(&snapshots_path)?;
            (snapshots_from_rows(rows), SnapshotOrigin::File)
        }
        IndexConstruction::Snapshots => {
            warn!(
                "{} not found in {:?}, deriving snapshots from price weights",
                SNAPSHOTS_FILE, data_dir
            );
            (derive_snapshots(&observations), SnapshotOrigin::PriceWeights)
        }
    };

    let result = ImportResult {
        observations: observations.len(),
        snapshots: snapshots.len(),
        origin,
    };

    let dataset = IndexDataset::new(observations, snapshots)
        .with_context(|| format!("Invalid index data in {:?}", data_dir))?;

    info!(
        "Loaded {} observations and {} snapshots ({:?}) from {:?}",
        result.observations, result.snapshots, result.origin, data_dir
    );
    Ok((dataset, result))
}

/// Reloads `data_dir`, publishes it to `store` in one swap and drops cached responses
/// computed from the previous data. On error the store and cache are left untouched.
pub fn import_into(
    store: &InMemoryConstituentStore,
    cache: &QueryCache,
    data_dir: &Path,
    construction: IndexConstruction,
) -> Result<ImportResult> {
    let (dataset, result) = load_dataset(data_dir, construction)?;
    store.replace(dataset);
    cache.clear();
    Ok(result)
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file_content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {:?}", path))?;

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(file_content.as_bytes());

    reader
        .deserialize::<T>()
        .enumerate()
        .map(|(line_num, row)| {
            // +2: one for the header, one for 1-based line numbers
            row.with_context(|| format!("Invalid row at {:?} line {}", path, line_num + 2))
        })
        .collect()
}

pub fn snapshots_from_rows(rows: Vec<SnapshotRow>) -> Vec<CompositionSnapshot> {
    let mut grouped: BTreeMap<NaiveDate, BTreeMap<String, f64>> = BTreeMap::new();
    for row in rows {
        grouped
            .entry(row.effective_date)
            .or_default()
            .insert(row.symbol, row.weight);
    }

    grouped
        .into_iter()
        .map(|(date, weights)| CompositionSnapshot::new(date, weights))
        .collect()
}

/// Collapses per-date weights into snapshots, opening a new one on the first date whose
/// membership or weights differ from the current snapshot.
pub fn derive_snapshots(observations: &[PriceObservation]) -> Vec<CompositionSnapshot> {
    let mut snapshots: Vec<CompositionSnapshot> = Vec::new();

    for (date, day) in group_by_date(observations) {
        let weights: BTreeMap<String, f64> = day
            .iter()
            .filter(|o| o.weight > 0.0)
            .map(|o| (o.symbol.clone(), o.weight))
            .collect();

        let unchanged = snapshots
            .last()
            .map(|current| same_weights(&current.weights, &weights))
            .unwrap_or(false);

        if !unchanged {
            snapshots.push(CompositionSnapshot::new(date, weights));
        }
    }

    snapshots
}

/// Top `size` symbols by market cap on each date, weighted 1/N where N is the number
/// selected. Only symbols with a price that day and a positive market cap are ranked;
/// ties go to the lower symbol. A new snapshot opens when membership changes.
pub fn equal_weight_snapshots(
    observations: &[PriceObservation],
    caps: &[MarketCapRow],
    size: usize,
) -> Vec<CompositionSnapshot> {
    let priced: HashSet<(NaiveDate, &str)> = observations
        .iter()
        .map(|o| (o.date, o.symbol.as_str()))
        .collect();

    let mut by_date: BTreeMap<NaiveDate, Vec<&MarketCapRow>> = BTreeMap::new();
    for row in caps {
        if row.market_cap.is_finite()
            && row.market_cap > 0.0
            && priced.contains(&(row.date, row.symbol.as_str()))
        {
            by_date.entry(row.date).or_default().push(row);
        }
    }

    let mut snapshots: Vec<CompositionSnapshot> = Vec::new();
    for (date, mut ranked) in by_date {
        ranked.sort_by(|a, b| {
            b.market_cap
                .total_cmp(&a.market_cap)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        ranked.truncate(size);

        let weight = 1.0 / ranked.len() as f64;
        let weights: BTreeMap<String, f64> = ranked
            .iter()
            .map(|row| (row.symbol.clone(), weight))
            .collect();

        let unchanged = snapshots
            .last()
            .map(|current| same_weights(&current.weights, &weights))
            .unwrap_or(false);

        if !unchanged {
            snapshots.push(CompositionSnapshot::new(date, weights));
        }
    }

    snapshots
}

fn same_weights(a: &BTreeMap<String, f64>, b: &BTreeMap<String, f64>) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|((sa, wa), (sb, wb))| sa == sb && (wa - wb).abs() <= WEIGHT_TOLERANCE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_derive_snapshots_only_on_change() {
        let rows = vec![
            PriceObservation::new(d("2025-05-12"), "A", 10.0, 0.5),
            PriceObservation::new(d("2025-05-12"), "B", 20.0, 0.5),
            PriceObservation::new(d("2025-05-13"), "A", 11.0, 0.5),
            PriceObservation::new(d("2025-05-13"), "B", 21.0, 0.5),
            PriceObservation::new(d("2025-05-14"), "A", 11.0, 0.5),
            PriceObservation::new(d("2025-05-14"), "C", 5.0, 0.5),
        ];

        let snapshots = derive_snapshots(&rows);

        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].effective_date, d("2025-05-12"));
        assert_eq!(snapshots[1].effective_date, d("2025-05-14"));
        assert!(snapshots[1].weights.contains_key("C"));
    }

    #[test]
    fn test_load_dataset_with_snapshot_file() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(PRICES_FILE),
            "date,symbol,price,weight\n2025-05-12,A,100,0.5\n2025-05-12,B,50,0.5\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(SNAPSHOTS_FILE),
            "effective_date,symbol,weight\n2025-05-12,A,0.5\n2025-05-12,B,0.5\n2025-06-01,A,1.0\n",
        )
        .unwrap();

        let (dataset, result) = load_dataset(dir.path(), IndexConstruction::Snapshots).unwrap();

        assert_eq!(result.observations, 2);
        assert_eq!(result.snapshots, 2);
        assert_eq!(result.origin, SnapshotOrigin::File);
        assert_eq!(dataset.snapshot_count(), 2);
    }

    #[test]
    fn test_load_dataset_derives_missing_snapshots() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(PRICES_FILE),
            "date,symbol,price,weight\n2025-05-12,A,100,1.0\n2025-05-13,A,101,1.0\n",
        )
        .unwrap();

        let (_, result) = load_dataset(dir.path(), IndexConstruction::Snapshots).unwrap();
        assert_eq!(result.origin, SnapshotOrigin::PriceWeights);
        assert_eq!(result.snapshots, 1);
    }

    #[test]
    fn test_load_dataset_reports_bad_rows() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(PRICES_FILE),
            "date,symbol,price,weight\n2025-13-40,A,100,1.0\n",
        )
        .unwrap();

        let err = load_dataset(dir.path(), IndexConstruction::Snapshots).unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));
    }

    #[test]
    fn test_import_into_keeps_previous_data_on_error() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(PRICES_FILE),
            "date,symbol,price,weight\n2025-05-12,A,100,1.0\n2025-05-13,A,101,1.0\n",
        )
        .unwrap();

        let store = InMemoryConstituentStore::new(IndexDataset::default());
        let cache = QueryCache::new(true, 3600);
        cache.put_composition(d("2025-05-12"), &[]);

        let result = import_into(&store, &cache, dir.path(), IndexConstruction::Snapshots).unwrap();
        assert_eq!(result.observations, 2);
        assert_eq!(store.dataset().trading_days(), 2);
        // Responses computed from the old data are gone.
        assert!(cache.is_empty());

        cache.put_composition(d("2025-05-12"), &[]);
        fs::write(
            dir.path().join(PRICES_FILE),
            "date,symbol,price,weight\n2025-05-12,A,-1,1.0\n",
        )
        .unwrap();
        assert!(import_into(&store, &cache, dir.path(), IndexConstruction::Snapshots).is_err());
        assert_eq!(store.dataset().trading_days(), 2);
        assert_eq!(cache.len(), 1);
    }

    fn cap(date: &str, symbol: &str, market_cap: f64) -> MarketCapRow {
        MarketCapRow {
            date: d(date),
            symbol: symbol.to_string(),
            market_cap,
        }
    }

    #[test]
    fn test_equal_weight_takes_largest_caps() {
        let prices: Vec<PriceObservation> = ["A", "B", "C"]
            .iter()
            .flat_map(|s| {
                vec![
                    PriceObservation::new(d("2025-05-12"), *s, 10.0, 0.0),
                    PriceObservation::new(d("2025-05-13"), *s, 10.0, 0.0),
                    PriceObservation::new(d("2025-05-14"), *s, 10.0, 0.0),
                ]
            })
            .collect();
        let caps = vec![
            cap("2025-05-12", "A", 300.0),
            cap("2025-05-12", "B", 200.0),
            cap("2025-05-12", "C", 100.0),
            // Same members, different caps: no new snapshot.
            cap("2025-05-13", "A", 310.0),
            cap("2025-05-13", "B", 150.0),
            cap("2025-05-13", "C", 140.0),
            // C overtakes B.
            cap("2025-05-14", "A", 320.0),
            cap("2025-05-14", "B", 120.0),
            cap("2025-05-14", "C", 180.0),
        ];

        let snapshots = equal_weight_snapshots(&prices, &caps, 2);

        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].effective_date, d("2025-05-12"));
        assert_eq!(snapshots[0].weights.get("A"), Some(&0.5));
        assert_eq!(snapshots[0].weights.get("B"), Some(&0.5));
        assert_eq!(snapshots[1].effective_date, d("2025-05-14"));
        assert!(snapshots[1].weights.contains_key("C"));
        assert!(!snapshots[1].weights.contains_key("B"));
    }

    #[test]
    fn test_equal_weight_skips_unpriced_and_uses_actual_count() {
        let prices = vec![
            PriceObservation::new(d("2025-05-12"), "A", 10.0, 0.0),
            PriceObservation::new(d("2025-05-12"), "B", 10.0, 0.0),
            PriceObservation::new(d("2025-05-12"), "C", 10.0, 0.0),
        ];
        let caps = vec![
            cap("2025-05-12", "A", 300.0),
            cap("2025-05-12", "B", 0.0),
            cap("2025-05-12", "C", 100.0),
            cap("2025-05-12", "D", 900.0),
        ];

        let snapshots = equal_weight_snapshots(&prices, &caps, 100);

        assert_eq!(snapshots.len(), 1);
        let members: Vec<&str> = snapshots[0].weights.keys().map(String::as_str).collect();
        assert_eq!(members, vec!["A", "C"]);
        assert!((snapshots[0].total_weight() - 1.0).abs() <= WEIGHT_TOLERANCE);
    }

    #[test]
    fn test_load_dataset_equal_weight_requires_market_caps() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(PRICES_FILE),
            "date,symbol,price,weight\n2025-05-12,A,100,1.0\n",
        )
        .unwrap();
        let construction = IndexConstruction::EqualWeight { size: 100 };

        let err = load_dataset(dir.path(), construction).unwrap_err();
        assert!(err.to_string().contains(MARKET_CAPS_FILE));

        fs::write(
            dir.path().join(MARKET_CAPS_FILE),
            "date,symbol,market_cap\n2025-05-12,A,5000000\n",
        )
        .unwrap();
        let (dataset, result) = load_dataset(dir.path(), construction).unwrap();
        assert_eq!(result.origin, SnapshotOrigin::EqualWeight { size: 100 });
        assert_eq!(dataset.snapshot_count(), 1);
    }

    #[test]
    fn test_load_dataset_rejects_unbalanced_snapshot() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(PRICES_FILE), "date,symbol,price,weight\n").unwrap();
        fs::write(
            dir.path().join(SNAPSHOTS_FILE),
            "effective_date,symbol,weight\n2025-05-12,A,0.7\n2025-05-12,B,0.7\n",
        )
        .unwrap();

        assert!(load_dataset(dir.path(), IndexConstruction::Snapshots).is_err());
    }
}
