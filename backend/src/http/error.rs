//! HTTP error handling and response types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::repository::RepositoryError;
use crate::services::ServiceError;

/// API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Application error type for HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    /// Invalid request (validation error)
    BadRequest(String),
    /// State collision such as a taken slot or a duplicate email
    Conflict(String),
    Forbidden(String),
    /// Missing or wrong admin token
    Unauthorized(String),
    Internal(String),
    Repository(RepositoryError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ApiError::new("NOT_FOUND", msg)),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ApiError::new("BAD_REQUEST", msg))
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, ApiError::new("CONFLICT", msg)),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, ApiError::new("FORBIDDEN", msg)),
            AppError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, ApiError::new("UNAUTHORIZED", msg))
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::new("INTERNAL_ERROR", msg),
                )
            }
            AppError::Repository(e) => {
                tracing::error!(error = %e, "Repository error");
                let error = ApiError::new("REPOSITORY_ERROR", "Storage operation failed")
                    .with_details(e.to_string());
                (StatusCode::INTERNAL_SERVER_ERROR, error)
            }
        };

        (status, Json(error)).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => AppError::BadRequest(msg),
            ServiceError::NotFound(msg) => AppError::NotFound(msg),
            ServiceError::Conflict(msg) => AppError::Conflict(msg),
            ServiceError::Forbidden(msg) => AppError::Forbidden(msg),
            ServiceError::Repository(e) => AppError::Repository(e),
            ServiceError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        ServiceError::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_errors_map_to_status() {
        let cases = [
            (ServiceError::validation("x"), StatusCode::BAD_REQUEST),
            (ServiceError::not_found("x"), StatusCode::NOT_FOUND),
            (ServiceError::conflict("x"), StatusCode::CONFLICT),
            (ServiceError::forbidden("x"), StatusCode::FORBIDDEN),
            (
                ServiceError::Repository(RepositoryError::connection("down")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), status);
        }
    }

    #[test]
    fn test_repository_not_found_is_404() {
        let response = AppError::from(RepositoryError::not_found("client 3")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
