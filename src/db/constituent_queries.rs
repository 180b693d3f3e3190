use chrono::NaiveDate;
use sqlx::PgPool;

use crate::models::{PriceObservation, SnapshotRow};

pub async fn fetch_prices_between(
    pool: &PgPool,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<PriceObservation>, sqlx::Error> {
    sqlx::query_as::<_, PriceObservation>(
        "SELECT date, symbol, price, weight
         FROM price_observations
         WHERE date BETWEEN $1 AND $2
         ORDER BY date ASC, symbol ASC",
    )
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await
}

/// Rows of the latest snapshot effective on or before `date`, in one statement so the
/// lookup and the read see the same MVCC snapshot.
pub async fn fetch_snapshot_rows_at(
    pool: &PgPool,
    date: NaiveDate,
) -> Result<Vec<SnapshotRow>, sqlx::Error> {
    sqlx::query_as::<_, SnapshotRow>(
        "SELECT effective_date, symbol, weight
         FROM composition_snapshots
         WHERE effective_date = (
             SELECT MAX(effective_date)
             FROM composition_snapshots
             WHERE effective_date <= $1
         )
         ORDER BY symbol ASC",
    )
    .bind(date)
    .fetch_all(pool)
    .await
}

pub async fn fetch_snapshot_dates_between(
    pool: &PgPool,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<NaiveDate>, sqlx::Error> {
    sqlx::query_scalar::<_, NaiveDate>(
        "SELECT DISTINCT effective_date
         FROM composition_snapshots
         WHERE effective_date BETWEEN $1 AND $2
         ORDER BY effective_date ASC",
    )
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await
}
