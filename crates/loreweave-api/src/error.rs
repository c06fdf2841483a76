//! Loreweave — API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use loreweave_core::error::DomainError;
use loreweave_session::domain::errors::SessionError;
use serde::Serialize;
use thiserror::Error;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),

    /// Tracing or span export could not be set up.
    #[error("telemetry error: {0}")]
    Telemetry(String),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
    /// The role roster, sent with `capacity_reached`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roster: Option<Vec<String>>,
}

/// HTTP-layer error that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A session operation failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// An admin route was called without a valid admin token.
    #[error("missing or invalid admin token")]
    Unauthorized,
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self::Session(SessionError::Domain(err))
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        let Self::Session(err) = self else {
            return (StatusCode::UNAUTHORIZED, "unauthorized");
        };
        match err {
            SessionError::WorldNotFound => (StatusCode::NOT_FOUND, "world_not_found"),
            SessionError::NotRegistered(_) => (StatusCode::FORBIDDEN, "not_registered"),
            SessionError::IncompleteSetup(_) => (StatusCode::BAD_REQUEST, "incomplete_setup"),
            SessionError::InvalidCharacterName => {
                (StatusCode::BAD_REQUEST, "invalid_character_name")
            }
            SessionError::InvalidChoice(_) => (StatusCode::BAD_REQUEST, "invalid_choice"),
            SessionError::AlreadyInitialized(_) => (StatusCode::CONFLICT, "already_initialized"),
            SessionError::RegistrationClosed(_) => (StatusCode::CONFLICT, "registration_closed"),
            SessionError::NameTaken(_) => (StatusCode::CONFLICT, "name_taken"),
            SessionError::CapacityReached { .. } => (StatusCode::CONFLICT, "capacity_reached"),
            SessionError::RoleAlreadyChosen(_) => (StatusCode::CONFLICT, "role_already_chosen"),
            SessionError::RoleUnavailable(_) => (StatusCode::CONFLICT, "role_unavailable"),
            SessionError::DuplicateSubmission(_) => {
                (StatusCode::CONFLICT, "duplicate_submission")
            }
            SessionError::WrongPhase(_) => (StatusCode::CONFLICT, "wrong_phase"),
            SessionError::Domain(domain) => match domain {
                DomainError::AggregateNotFound(_) => {
                    (StatusCode::NOT_FOUND, "aggregate_not_found")
                }
                DomainError::ConcurrencyConflict { .. } => {
                    (StatusCode::CONFLICT, "concurrency_conflict")
                }
                DomainError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
                DomainError::Infrastructure(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "infrastructure_error")
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let roster = match &self {
            Self::Session(SessionError::CapacityReached { roster, .. }) => Some(roster.clone()),
            _ => None,
        };
        let body = ErrorBody {
            error: error_code,
            message: self.to_string(),
            roster,
        };

        (status, Json(body)).into_response()
    }
}
