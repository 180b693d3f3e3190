use std::time::Duration;

use axum::response::IntoResponse;
use axum::Json;
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid range: {0}")]
    InvalidRange(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("No observations in range: {0}")]
    EmptyRange(String),
    #[error("Internal computation error: {0}")]
    InternalComputation(String),
    #[error("Database error: {0}")]
    Db(sqlx::Error),
    #[error("Export timed out after {0:?}")]
    ExportTimeout(Duration),
    #[error("Export error: {0}")]
    Export(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl AppError {
    /// Stable machine-readable code returned to API callers.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::InvalidRange(_) => "INVALID_RANGE",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::EmptyRange(_) => "EMPTY_RANGE",
            AppError::InternalComputation(_) => "INTERNAL_COMPUTATION_ERROR",
            AppError::Db(_) => "DATABASE_ERROR",
            AppError::ExportTimeout(_) => "EXPORT_TIMEOUT",
            AppError::Export(_) => "EXPORT_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidRange(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) | AppError::EmptyRange(_) => StatusCode::NOT_FOUND,
            AppError::ExportTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::InternalComputation(_) | AppError::Db(_) | AppError::Export(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();

        // Internal details stay in the logs.
        let message = match &self {
            AppError::Db(e) => {
                error!("Database failure surfaced to caller: {}", e);
                "Internal server error".to_string()
            }
            AppError::InternalComputation(msg) | AppError::Export(msg) => {
                error!("{}: {}", self.code(), msg);
                self.to_string()
            }
            _ => self.to_string(),
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(value: sqlx::Error) -> Self {
        AppError::Db(value)
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(msg) => AppError::NotFound(msg),
            StoreError::InvalidData(msg) => AppError::InternalComputation(msg),
            StoreError::Db(e) => AppError::Db(e),
        }
    }
}

impl From<zip::result::ZipError> for AppError {
    fn from(value: zip::result::ZipError) -> Self {
        AppError::Export(value.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        AppError::Export(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_4xx() {
        assert_eq!(AppError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::InvalidRange("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::EmptyRange("x".into()).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_export_timeout_reports_sub_second_limits() {
        let err = AppError::ExportTimeout(Duration::from_millis(200));
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.to_string(), "Export timed out after 200ms");
    }

    #[test]
    fn test_store_errors_keep_their_category() {
        let err: AppError = StoreError::NotFound("no snapshot".into()).into();
        assert_eq!(err.code(), "NOT_FOUND");

        let err: AppError = StoreError::InvalidData("bad weights".into()).into();
        assert_eq!(err.code(), "INTERNAL_COMPUTATION_ERROR");
    }
}
