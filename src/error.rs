use std::sync::Arc;

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{dao::storage::StorageError, state::mutation::MutationError};

/// Errors surfaced by session operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The remote store rejected or could not complete a read, write or subscription.
    ///
    /// Shared because one failed write can settle several coalesced mutations.
    #[error("network error: {0}")]
    Network(#[source] Arc<StorageError>),
    /// No backend is connected; the supervisor is still retrying.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// A viewer, or a caller without the host token, attempted a mutation.
    #[error("authority violation: {0}")]
    AuthorityViolation(String),
    /// Invalid session configuration or mutation arguments.
    #[error("invalid input: {0}")]
    Validation(String),
    /// No session exists for the requested code.
    #[error("not found: {0}")]
    NotFound(String),
    /// The session runtime has stopped, either unsubscribed or because the document vanished.
    #[error("session closed")]
    SessionClosed,
    /// Every drawn session code was already taken.
    #[error("no free session code after {attempts} attempts")]
    NoFreeCode { attempts: u32 },
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Network(Arc::new(err))
    }
}

impl From<MutationError> for ServiceError {
    fn from(err: MutationError) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::Validation(format!("validation failed: {err}"))
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {err}"))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("gone: {0}")]
    Gone(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Network(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::AuthorityViolation(message) => AppError::Forbidden(message),
            ServiceError::Validation(message) => AppError::BadRequest(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::SessionClosed => AppError::Gone("session closed".into()),
            err @ ServiceError::NoFreeCode { .. } => AppError::ServiceUnavailable(err.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Gone(_) => StatusCode::GONE,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_map_to_http_statuses() {
        let cases = [
            (ServiceError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (
                ServiceError::AuthorityViolation("viewer".into()),
                StatusCode::FORBIDDEN,
            ),
            (ServiceError::NotFound("123456".into()), StatusCode::NOT_FOUND),
            (ServiceError::SessionClosed, StatusCode::GONE),
            (ServiceError::Degraded, StatusCode::SERVICE_UNAVAILABLE),
            (
                StorageError::Offline("down".into()).into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(AppError::from(err).status(), expected);
        }
    }

    #[test]
    fn mutation_errors_are_validation_failures() {
        let err = ServiceError::from(MutationError::ClockExpired);
        assert!(matches!(err, ServiceError::Validation(_)));
    }
}
