use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use http::header;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::errors::AppError;
use crate::models::DateRange;
use crate::services::export_service::{self, EXPORT_FILENAME, XLSX_CONTENT_TYPE};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/export-data", post(export_data))
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub start_date: String,
    pub end_date: Option<String>,
}

pub async fn export_data(
    State(state): State<AppState>,
    payload: Result<Json<ExportRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    let range = DateRange::parse(&request.start_date, request.end_date.as_deref())?;
    info!("POST /export-data - {}..={}", range.start, range.end);

    let store = state.store.read_view();
    let build = export_service::build_export(store.as_ref(), range.start, range.end);
    // On timeout the in-flight build is dropped; no partial workbook is ever returned.
    let bytes = tokio::time::timeout(state.export_timeout, build)
        .await
        .map_err(|_| {
            warn!("Export for {}..={} timed out", range.start, range.end);
            AppError::ExportTimeout(state.export_timeout)
        })?
        .map_err(|e| {
            error!("Failed to build export for {}..={}: {}", range.start, range.end, e);
            e
        })?;

    let disposition = format!("attachment; filename=\"{}\"", EXPORT_FILENAME);
    Ok((
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}
