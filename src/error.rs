use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
};
use serde_json::json;
use axum::Json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("File processing error: {0}")]
    FileProcessingError(String),
    #[error("DataFrame error: {0}")]
    DataFrameError(String),
    #[error("HTTP Error: {0}")]
    HttpError(String),
    #[error("Analysis of {source_id} failed: {reason}")]
    AnalysisFailed { source_id: String, reason: String },
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn analysis_failed(source_id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        AppError::AnalysisFailed {
            source_id: source_id.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::ParseError(err.to_string())
    }
}

impl From<polars::prelude::PolarsError> for AppError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        AppError::DataFrameError(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::HttpError(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::UnsupportedFormat(_) => StatusCode::BAD_REQUEST,
            AppError::ParseError(_) => StatusCode::BAD_REQUEST,
            AppError::HttpError(_) => StatusCode::BAD_GATEWAY,
            AppError::AnalysisFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::IoError(_)
            | AppError::FileProcessingError(_)
            | AppError::DataFrameError(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::warn!("Request rejected: {}", self);
        }

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_failed_names_the_source() {
        let err = AppError::analysis_failed("data.csv", "ragged columns");
        assert_eq!(err.to_string(), "Analysis of data.csv failed: ragged columns");
    }

    #[test]
    fn status_codes_follow_error_kind() {
        let not_found = AppError::NotFound("x.csv".to_string()).into_response();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let failed = AppError::analysis_failed("x.csv", "corrupt").into_response();
        assert_eq!(failed.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let internal = AppError::Internal("boom".to_string()).into_response();
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
