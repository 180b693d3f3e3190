use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use tracing::{error, info};

use crate::errors::AppError;
use crate::models::CompositionChangeEvent;
use crate::routes::RangeParams;
use crate::services::change_detector;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/composition-changes", get(get_composition_changes))
}

pub async fn get_composition_changes(
    State(state): State<AppState>,
    params: Result<Query<RangeParams>, QueryRejection>,
) -> Result<Json<Vec<CompositionChangeEvent>>, AppError> {
    let Query(params) = params.map_err(|e| AppError::Validation(e.body_text()))?;
    let range = params.into_range(true)?;
    info!("GET /composition-changes - {}..={}", range.start, range.end);

    if let Some(events) = state.cache.get_changes(range) {
        return Ok(Json(events));
    }

    let store = state.store.read_view();
    let events = change_detector::changes_between(store.as_ref(), range)
        .await
        .map_err(|e| {
            error!("Failed to detect composition changes for {}..={}: {}", range.start, range.end, e);
            e
        })?;

    state.cache.put_changes(range, &events);
    Ok(Json(events))
}
