use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use tracing::{error, info};

use crate::errors::AppError;
use crate::models::IndexLevelPoint;
use crate::routes::RangeParams;
use crate::services::return_calculator;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/index-performance", get(get_index_performance))
}

pub async fn get_index_performance(
    State(state): State<AppState>,
    params: Result<Query<RangeParams>, QueryRejection>,
) -> Result<Json<Vec<IndexLevelPoint>>, AppError> {
    let Query(params) = params.map_err(|e| AppError::Validation(e.body_text()))?;
    let range = params.into_range(false)?;
    info!("GET /index-performance - {}..={}", range.start, range.end);

    if let Some(points) = state.cache.get_performance(range) {
        return Ok(Json(points));
    }

    let store = state.store.read_view();
    let points = match return_calculator::index_performance(store.as_ref(), range).await {
        Ok(points) => points,
        // An empty range is a valid, empty series for list endpoints.
        Err(AppError::EmptyRange(_)) => Vec::new(),
        Err(e) => {
            error!("Failed to compute index performance for {}..={}: {}", range.start, range.end, e);
            return Err(e);
        }
    };

    state.cache.put_performance(range, &points);
    Ok(Json(points))
}
