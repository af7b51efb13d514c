use crate::services::migrator::MigrationError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for errors returned by the admin API.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<MigrationError> for AppError {
    fn from(err: MigrationError) -> Self {
        let status = match &err {
            MigrationError::NotConfigured | MigrationError::UnsupportedBackend(_) => {
                StatusCode::NOT_IMPLEMENTED
            }
            MigrationError::TenantNotFound(_) | MigrationError::Unassigned(_) => {
                StatusCode::NOT_FOUND
            }
            MigrationError::AlreadyOnTarget { .. } => StatusCode::CONFLICT,
            MigrationError::TooManyObjects { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            MigrationError::ObjectNotFound { .. }
            | MigrationError::Backend { .. }
            | MigrationError::MetadataWrite { .. }
            | MigrationError::Metadata(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::internal(err.to_string())
    }
}
