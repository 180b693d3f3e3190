use chrono::NaiveDate;

use crate::errors::AppError;
use crate::models::ConstituentWeight;
use crate::store::ConstituentStore;

/// Constituents effective on `date`, weight descending with ties broken by symbol.
pub async fn composition_at(
    store: &dyn ConstituentStore,
    date: NaiveDate,
) -> Result<Vec<ConstituentWeight>, AppError> {
    let snapshot = store.get_snapshot(date).await?;
    Ok(ConstituentWeight::ranked(&snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CompositionSnapshot;
    use crate::store::{IndexDataset, InMemoryConstituentStore};

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn store() -> InMemoryConstituentStore {
        let snapshots = vec![
            CompositionSnapshot::new(
                d("2025-05-12"),
                [("MSFT", 0.25), ("AAPL", 0.25), ("NVDA", 0.5)]
                    .iter()
                    .map(|(s, w)| (s.to_string(), *w))
                    .collect(),
            ),
        ];
        InMemoryConstituentStore::new(IndexDataset::new(vec![], snapshots).unwrap())
    }

    #[tokio::test]
    async fn test_composition_sorted_and_sums_to_one() {
        let store = store();
        let rows = composition_at(&store, d("2025-05-20")).await.unwrap();

        let symbols: Vec<&str> = rows.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["NVDA", "AAPL", "MSFT"]);

        let total: f64 = rows.iter().map(|r| r.weight).sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_composition_is_idempotent() {
        let store = store();
        let first = composition_at(&store, d("2025-05-12")).await.unwrap();
        let second = composition_at(&store, d("2025-05-12")).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_composition_before_first_snapshot() {
        let store = store();
        let err = composition_at(&store, d("2025-05-11")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
