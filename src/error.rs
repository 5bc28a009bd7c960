use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

use crate::{
    scheduler::SchedulerError,
    state::{
        countdown::CountdownError, players::RegistryError, session::SessionError,
        votes::LedgerError,
    },
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Caller or target is not an active player.
    #[error("not eligible: {0}")]
    NotEligible(String),
    /// A player tried to vote for themselves.
    #[error("players cannot vote for themselves")]
    SelfVote,
    /// The caller has no vote to withdraw.
    #[error("no active vote: {0}")]
    NoActiveVote(String),
    /// Referenced player does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A countdown is already running.
    #[error("a countdown is already running")]
    AlreadyRunning,
    /// No countdown is running.
    #[error("no countdown is running")]
    NotRunning,
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Caller lacks the rights for the command, or the scope is not allowed.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Countdown timers could not be armed.
    #[error("scheduling failed: {0}")]
    Scheduling(String),
}

impl From<RegistryError> for ServiceError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(id) => {
                ServiceError::NotFound(format!("player {id} is not an active player of this game"))
            }
        }
    }
}

impl From<LedgerError> for ServiceError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotEligible(id) => {
                ServiceError::NotEligible(format!("player {id} is not an active player"))
            }
            LedgerError::SelfVote => ServiceError::SelfVote,
            LedgerError::NoActiveVote(id) => {
                ServiceError::NoActiveVote(format!("player {id} has not voted"))
            }
        }
    }
}

impl From<CountdownError> for ServiceError {
    fn from(err: CountdownError) -> Self {
        match err {
            CountdownError::AlreadyRunning => ServiceError::AlreadyRunning,
            CountdownError::NotRunning => ServiceError::NotRunning,
            stale @ CountdownError::Stale { .. } => ServiceError::InvalidState(stale.to_string()),
        }
    }
}

impl From<SessionError> for ServiceError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Registry(err) => err.into(),
            SessionError::Ledger(err) => err.into(),
            SessionError::Countdown(err) => err.into(),
            SessionError::InvalidState(message) => ServiceError::InvalidState(message),
        }
    }
}

impl From<SchedulerError> for ServiceError {
    fn from(err: SchedulerError) -> Self {
        ServiceError::Scheduling(err.to_string())
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Caller is not allowed to run the command.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::NotEligible(_)
            | ServiceError::SelfVote
            | ServiceError::NoActiveVote(_)
            | ServiceError::InvalidInput(_) => AppError::BadRequest(message),
            ServiceError::Forbidden(reason) => AppError::Forbidden(reason),
            ServiceError::NotFound(what) => AppError::NotFound(what),
            ServiceError::AlreadyRunning
            | ServiceError::NotRunning
            | ServiceError::InvalidState(_) => AppError::Conflict(message),
            ServiceError::Scheduling(_) => AppError::ServiceUnavailable(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
