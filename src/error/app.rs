use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error as ThisError;
use tracing::error;

use super::StoreError;

#[derive(Debug, ThisError)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error("Not found")]
    NotFound,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, detail) = match self {
            AppError::Validation(detail) => (StatusCode::BAD_REQUEST, detail),

            AppError::Storage(StoreError::Database(e)) => {
                // Statement text and driver messages stay in the logs.
                error!(error = %e, "storage operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database error".to_string(),
                )
            }

            AppError::Storage(StoreError::Unavailable(reason)) => {
                error!(%reason, "storage operation rejected; database unavailable");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database unavailable".to_string(),
                )
            }

            AppError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
        };
        (status, Json(ApiErrorBody::new(detail))).into_response()
    }
}

/// Standardized error payload: `{"status":"error","detail":...}`.
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub status: &'static str,
    pub detail: String,
}

impl ApiErrorBody {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            status: "error",
            detail: detail.into(),
        }
    }
}
