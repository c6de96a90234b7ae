use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError,
    state::{round_manager::RoundError, state_machine::TransitionError},
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed input, rejected before any transaction runs.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Wrong phase, group mismatch, self-vote and similar state conflicts.
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),
    /// The phase deadline has passed.
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),
    /// Caller may not perform the action.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Resource already exists (duplicate team name).
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// Capacity reached (room full).
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    /// Storage backend is unavailable or contention did not settle after retries.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Unexpected failure; details are logged, never returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Corrupted(message) => ServiceError::Internal(message),
            StorageError::Missing(message) => ServiceError::NotFound(message),
            other => ServiceError::Unavailable(other),
        }
    }
}

impl From<TransitionError> for ServiceError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::Round(round) => round.into(),
            other => ServiceError::FailedPrecondition(other.to_string()),
        }
    }
}

impl From<RoundError> for ServiceError {
    fn from(err: RoundError) -> Self {
        ServiceError::Internal(err.to_string())
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::InvalidInput(format!("validation failed: {err}"))
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Action not allowed in the current state.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    /// The phase window closed before the request arrived.
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),
    /// Caller lacks the required role.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with an existing resource.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Capacity reached.
    #[error("too many: {0}")]
    Exhausted(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::FailedPrecondition(message) => AppError::PreconditionFailed(message),
            ServiceError::DeadlineExceeded(message) => AppError::DeadlineExceeded(message),
            ServiceError::PermissionDenied(message) => AppError::Forbidden(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::AlreadyExists(message) => AppError::Conflict(message),
            ServiceError::ResourceExhausted(message) => AppError::Exhausted(message),
            ServiceError::Unavailable(_) => {
                AppError::ServiceUnavailable("storage unavailable, try again later".into())
            }
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::Internal(message) => AppError::Internal(message),
        }
    }
}

impl AppError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid-input"),
            AppError::PreconditionFailed(_) => {
                (StatusCode::PRECONDITION_FAILED, "failed-precondition")
            }
            AppError::DeadlineExceeded(_) => (StatusCode::REQUEST_TIMEOUT, "deadline-exceeded"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "permission-denied"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not-found"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "already-exists"),
            AppError::Exhausted(_) => (StatusCode::TOO_MANY_REQUESTS, "resource-exhausted"),
            AppError::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

/// JSON body of every error response.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    /// Stable machine-readable error kind.
    #[schema(value_type = String)]
    kind: &'static str,
    /// Human-readable message.
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, kind) = self.status_and_kind();
        if let AppError::Internal(detail) = &self {
            error!(%detail, "request failed with an internal error");
        }

        let payload = Json(ErrorBody {
            kind,
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
