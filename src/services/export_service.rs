use chrono::NaiveDate;
use tracing::{error, info};

use crate::errors::AppError;
use crate::models::{CompositionChangeEvent, ConstituentWeight, DateRange, IndexLevelPoint};
use crate::services::xlsx_writer::{self, Cell, Sheet};
use crate::services::{change_detector, return_calculator};
use crate::store::ConstituentStore;

pub const EXPORT_FILENAME: &str = "index_export.xlsx";
pub const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Everything that goes into one export, gathered before rendering.
#[derive(Debug, Clone, Default)]
pub struct ExportBundle {
    pub performance: Vec<IndexLevelPoint>,
    pub composition: Vec<(NaiveDate, Vec<ConstituentWeight>)>,
    pub changes: Vec<CompositionChangeEvent>,
}

/// Builds the xlsx artifact for `[start, end]`.
///
/// Fails with `InvalidRange` for inverted bounds and `EmptyRange` when no prices exist,
/// since an empty workbook carries no meaning. Rendering runs on the blocking pool.
pub async fn build_export(
    store: &dyn ConstituentStore,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<u8>, AppError> {
    let range = DateRange::new(start, end)?;
    let bundle = collect_bundle(store, range).await?;

    info!(
        "Rendering export for {}..={}: {} performance rows, {} change events",
        range.start,
        range.end,
        bundle.performance.len(),
        bundle.changes.len()
    );

    tokio::task::spawn_blocking(move || render_workbook(&bundle))
        .await
        .map_err(|e| {
            error!("Export rendering task failed: {}", e);
            AppError::Export(e.to_string())
        })?
}

pub async fn collect_bundle(
    store: &dyn ConstituentStore,
    range: DateRange,
) -> Result<ExportBundle, AppError> {
    let observations = store.get_prices(range.start, range.end).await?;
    let (first, last) = return_calculator::observed_bounds(&observations, range)?;

    let timeline = return_calculator::resolve_timeline(store, first, last).await?;
    let performance = return_calculator::compute_series(&observations, &timeline)?;

    let composition = performance
        .iter()
        .map(|point| {
            timeline
                .at(point.date)
                .map(|snapshot| (point.date, ConstituentWeight::ranked(snapshot)))
                .ok_or_else(|| {
                    AppError::InternalComputation(format!("Snapshot for {} vanished", point.date))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let changes = change_detector::changes_between(store, range).await?;

    Ok(ExportBundle {
        performance,
        composition,
        changes,
    })
}

/// Renders the bundle as a workbook with Performance, Composition and Changes sheets.
pub fn render_workbook(bundle: &ExportBundle) -> Result<Vec<u8>, AppError> {
    let mut performance = Sheet::new(
        "Performance",
        &["date", "index_level", "daily_return", "cumulative_return"],
    );
    for point in &bundle.performance {
        performance.push_row(vec![
            date_cell(point.date),
            Cell::Number(point.index_level),
            Cell::Number(point.daily_return),
            Cell::Number(point.cumulative_return),
        ]);
    }

    let mut composition = Sheet::new("Composition", &["date", "symbol", "weight"]);
    for (date, rows) in &bundle.composition {
        for row in rows {
            composition.push_row(vec![
                date_cell(*date),
                Cell::Text(row.symbol.clone()),
                Cell::Number(row.weight),
            ]);
        }
    }

    let mut changes = Sheet::new("Changes", &["date", "entered", "exited"]);
    for event in &bundle.changes {
        changes.push_row(vec![
            date_cell(event.date),
            Cell::Text(join_symbols(&event.entered)),
            Cell::Text(join_symbols(&event.exited)),
        ]);
    }

    xlsx_writer::write_workbook(&[performance, composition, changes])
}

fn date_cell(date: NaiveDate) -> Cell {
    Cell::Text(date.format("%Y-%m-%d").to_string())
}

/// Symbols sorted ascending and joined with ", ".
pub fn join_symbols(symbols: &[String]) -> String {
    let mut sorted: Vec<&str> = symbols.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CompositionSnapshot, PriceObservation};
    use crate::store::{IndexDataset, InMemoryConstituentStore};

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn store() -> InMemoryConstituentStore {
        let snapshots = vec![
            CompositionSnapshot::new(
                d("2025-05-12"),
                [("A".to_string(), 0.5), ("B".to_string(), 0.5)].into_iter().collect(),
            ),
            CompositionSnapshot::new(
                d("2025-05-14"),
                [("A".to_string(), 0.5), ("C".to_string(), 0.5)].into_iter().collect(),
            ),
        ];
        let prices = vec![
            PriceObservation::new(d("2025-05-12"), "A", 100.0, 0.5),
            PriceObservation::new(d("2025-05-12"), "B", 50.0, 0.5),
            PriceObservation::new(d("2025-05-13"), "A", 101.0, 0.5),
            PriceObservation::new(d("2025-05-13"), "B", 49.0, 0.5),
            PriceObservation::new(d("2025-05-14"), "A", 102.0, 0.5),
            PriceObservation::new(d("2025-05-14"), "C", 30.0, 0.5),
        ];
        InMemoryConstituentStore::new(IndexDataset::new(prices, snapshots).unwrap())
    }

    #[test]
    fn test_join_symbols_is_sorted() {
        let symbols = vec!["MSFT".to_string(), "AAPL".to_string(), "GOOG".to_string()];
        assert_eq!(join_symbols(&symbols), "AAPL, GOOG, MSFT");
        assert_eq!(join_symbols(&[]), "");
    }

    #[tokio::test]
    async fn test_collect_bundle_covers_all_sections() {
        let store = store();
        let bundle = collect_bundle(&store, DateRange::new(d("2025-05-12"), d("2025-05-14")).unwrap())
            .await
            .unwrap();

        assert_eq!(bundle.performance.len(), 3);
        assert_eq!(bundle.composition.len(), 3);
        assert_eq!(bundle.composition[2].1[0].symbol, "A");
        assert_eq!(bundle.changes.len(), 1);
        assert_eq!(bundle.changes[0].entered, vec!["C".to_string()]);
    }

    #[tokio::test]
    async fn test_export_is_byte_reproducible() {
        let store = store();
        let first = build_export(&store, d("2025-05-12"), d("2025-05-14")).await.unwrap();
        let second = build_export(&store, d("2025-05-12"), d("2025-05-14")).await.unwrap();
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_export_rejects_inverted_range() {
        let store = store();
        let err = build_export(&store, d("2025-05-14"), d("2025-05-12")).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRange(_)));
    }

    #[tokio::test]
    async fn test_export_of_empty_range_fails() {
        let store = store();
        let err = build_export(&store, d("2025-07-01"), d("2025-07-31")).await.unwrap_err();
        assert!(matches!(err, AppError::EmptyRange(_)));
    }
}
