use chrono::NaiveDate;
use tracing::debug;

use crate::errors::AppError;
use crate::models::{CompositionChangeEvent, DateRange};
use crate::store::{ConstituentStore, StoreError};

/// Membership changes at every snapshot boundary `d` with `start < d <= end`.
///
/// The composition effective on `start` is the baseline and is never reported itself.
/// Boundaries that only reweight existing members produce no event, and a boundary with
/// no earlier snapshot to compare against is skipped.
pub async fn changes_between(
    store: &dyn ConstituentStore,
    range: DateRange,
) -> Result<Vec<CompositionChangeEvent>, AppError> {
    if range.start == range.end {
        return Ok(Vec::new());
    }

    let boundaries: Vec<NaiveDate> = store
        .list_snapshot_dates(range.start, range.end)
        .await?
        .into_iter()
        .filter(|d| *d > range.start)
        .collect();

    let mut events = Vec::new();
    for boundary in boundaries {
        let Some(day_before) = boundary.pred_opt() else {
            continue;
        };

        let prev = match store.get_snapshot(day_before).await {
            Ok(snapshot) => snapshot,
            Err(StoreError::NotFound(_)) => {
                debug!("No baseline before first snapshot {}, skipping", boundary);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let curr = store.get_snapshot(boundary).await?;

        if let Some(event) = CompositionChangeEvent::between(&prev, &curr) {
            events.push(event);
        }
    }

    Ok(events)
}
