use std::collections::HashMap;

use chrono::NaiveDate;
use futures::future::try_join_all;
use tracing::{debug, error};

use crate::errors::AppError;
use crate::models::{
    group_by_date, CompositionSnapshot, DateRange, IndexLevelPoint, PriceObservation, SnapshotTimeline,
};
use crate::store::ConstituentStore;

/// Index performance for every trading date in `range` that has observations.
pub async fn index_performance(
    store: &dyn ConstituentStore,
    range: DateRange,
) -> Result<Vec<IndexLevelPoint>, AppError> {
    let observations = store.get_prices(range.start, range.end).await?;
    let (first, last) = observed_bounds(&observations, range)?;

    let timeline = resolve_timeline(store, first, last).await?;
    compute_series(&observations, &timeline)
}

pub(crate) fn observed_bounds(
    observations: &[PriceObservation],
    range: DateRange,
) -> Result<(NaiveDate, NaiveDate), AppError> {
    match (observations.first(), observations.last()) {
        (Some(first), Some(last)) => Ok((first.date, last.date)),
        _ => Err(AppError::EmptyRange(format!(
            "No price observations between {} and {}",
            range.start, range.end
        ))),
    }
}

/// Every snapshot needed to value dates in `[first, last]`: the one effective on `first`
/// plus each later boundary up to `last`.
pub async fn resolve_timeline(
    store: &dyn ConstituentStore,
    first: NaiveDate,
    last: NaiveDate,
) -> Result<SnapshotTimeline, AppError> {
    let baseline = store.get_snapshot(first).await?;

    let boundaries: Vec<NaiveDate> = store
        .list_snapshot_dates(first, last)
        .await?
        .into_iter()
        .filter(|d| *d > first)
        .collect();

    let mut snapshots = try_join_all(boundaries.into_iter().map(|d| store.get_snapshot(d))).await?;
    snapshots.insert(0, baseline);

    debug!("Resolved {} snapshots for {}..={}", snapshots.len(), first, last);
    Ok(SnapshotTimeline::new(snapshots))
}

/// Weighted index level for one trading day using the snapshot effective that day.
///
/// Every constituent must have a price on the day. Prices for symbols outside the
/// snapshot are ignored.
pub fn index_level(snapshot: &CompositionSnapshot, day: &[PriceObservation]) -> Result<f64, AppError> {
    let prices: HashMap<&str, f64> = day.iter().map(|o| (o.symbol.as_str(), o.price)).collect();
    let date = day.first().map(|o| o.date).unwrap_or(snapshot.effective_date);

    snapshot
        .weights
        .iter()
        .try_fold(0.0_f64, |level, (symbol, weight)| match prices.get(symbol.as_str()) {
            Some(price) => Ok(level + weight * price),
            None => Err(AppError::InternalComputation(format!(
                "Constituent {} has no price on {}",
                symbol, date
            ))),
        })
}

/// Builds the index series from observations sorted by `(date, symbol)`.
///
/// The first date anchors the series with zero returns. Each later date compares against
/// the latest earlier date with data, and cumulative returns compound multiplicatively.
pub fn compute_series(
    observations: &[PriceObservation],
    timeline: &SnapshotTimeline,
) -> Result<Vec<IndexLevelPoint>, AppError> {
    let mut points: Vec<IndexLevelPoint> = Vec::new();

    for (date, day) in group_by_date(observations) {
        let snapshot = timeline.at(date).ok_or_else(|| {
            AppError::NotFound(format!("No composition snapshot effective on or before {}", date))
        })?;

        let level = index_level(snapshot, day)?;
        if !level.is_finite() {
            error!("Non-finite index level on {}", date);
            return Err(AppError::InternalComputation(format!("Index level on {} is not finite", date)));
        }

        let (daily_return, cumulative_return) = match points.last() {
            None => (0.0, 0.0),
            Some(prev) => {
                if prev.index_level <= 0.0 {
                    return Err(AppError::InternalComputation(format!(
                        "Index level on {} is {}, cannot compute return for {}",
                        prev.date, prev.index_level, date
                    )));
                }
                let daily = level / prev.index_level - 1.0;
                let cumulative = (1.0 + prev.cumulative_return) * (1.0 + daily) - 1.0;
                (daily, cumulative)
            }
        };

        points.push(IndexLevelPoint {
            date,
            index_level: level,
            daily_return,
            cumulative_return,
        });
    }

    if points.is_empty() {
        return Err(AppError::EmptyRange("No price observations to value".to_string()));
    }

    Ok(points)
}
