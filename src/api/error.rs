//! Boundary errors and their HTTP mapping.

use actix_web::error::BlockingError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::error::EditorError;
use crate::storage::UploadError;
use crate::summarize::SummarizeError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No database uploaded")]
    NoDatabase,

    #[error("Database file not found. Please re-upload the database.")]
    DatabaseMissing,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Editor(#[from] EditorError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Summarization(#[from] SummarizeError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::NoDatabase => "NO_DATABASE",
            ApiError::DatabaseMissing => "DATABASE_MISSING",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Editor(e) => e.code(),
            ApiError::Upload(UploadError::MissingFile) => "MISSING_FILE",
            ApiError::Upload(UploadError::TooLarge { .. }) => "FILE_TOO_LARGE",
            ApiError::Upload(UploadError::DisallowedExtension { .. }) => "INVALID_EXTENSION",
            ApiError::Upload(_) => "STORAGE_ERROR",
            ApiError::Summarization(_) => "SUMMARIZATION_UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<BlockingError> for ApiError {
    fn from(err: BlockingError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NoDatabase | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::DatabaseMissing => StatusCode::NOT_FOUND,
            ApiError::Editor(EditorError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Editor(_) => StatusCode::BAD_REQUEST,
            ApiError::Upload(UploadError::MissingFile)
            | ApiError::Upload(UploadError::TooLarge { .. })
            | ApiError::Upload(UploadError::DisallowedExtension { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Upload(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Summarization(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!(code = self.error_code(), error = %self, "request failed");
        }
        HttpResponse::build(status).json(json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string()
            }
        }))
    }
}
