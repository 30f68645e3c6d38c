//! Errors returned by the service layer.

use crate::db::repository::RepositoryError;

#[derive(Debug, thiserror::Error)]
#[allow(clippy::result_large_err)]
pub enum ServiceError {
    /// The request is malformed or breaks a domain rule.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The request collides with existing state (slot taken, duplicate email).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The caller may not perform the operation right now.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Repository(RepositoryError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { message, .. } => Self::NotFound(message),
            RepositoryError::Conflict { message, .. } => Self::Conflict(message),
            RepositoryError::ValidationError { message, .. } => Self::Validation(message),
            other => Self::Repository(other),
        }
    }
}
