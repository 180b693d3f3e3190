use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{error, info};

use crate::errors::AppError;
use crate::models::{parse_date, ConstituentWeight};
use crate::services::composition_service;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/index-composition", get(get_index_composition))
}

#[derive(Debug, Deserialize)]
pub struct CompositionParams {
    date: Option<String>,
}

pub async fn get_index_composition(
    State(state): State<AppState>,
    params: Result<Query<CompositionParams>, QueryRejection>,
) -> Result<Json<Vec<ConstituentWeight>>, AppError> {
    let Query(params) = params.map_err(|e| AppError::Validation(e.body_text()))?;
    let raw = params
        .date
        .ok_or_else(|| AppError::Validation("date is required".to_string()))?;
    let date = parse_date("date", &raw)?;
    info!("GET /index-composition - {}", date);

    if let Some(rows) = state.cache.get_composition(date) {
        return Ok(Json(rows));
    }

    let rows = composition_service::composition_at(state.store.as_ref(), date)
        .await
        .map_err(|e| {
            error!("Failed to resolve composition at {}: {}", date, e);
            e
        })?;

    state.cache.put_composition(date, &rows);
    Ok(Json(rows))
}
