use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::ledger::models::TransactionId;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Submission error: {0}")]
    Submission(#[from] SubmissionError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Every id in the scan window failed to resolve
    #[error("Failed to fetch transactions: {failed} read(s) failed")]
    BatchUnavailable { failed: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A single ledger read failed (transport or decoding)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error("Transport failure reading transaction {id}: {message}")]
    Transport { id: TransactionId, message: String },

    #[error("Ledger rejected read of transaction {id}: {cause}")]
    Rejected { id: TransactionId, cause: String },

    #[error("Failed to decode transaction {id}: {message}")]
    Decode { id: TransactionId, message: String },
}

impl ReadError {
    pub fn id(&self) -> TransactionId {
        match self {
            ReadError::Transport { id, .. }
            | ReadError::Rejected { id, .. }
            | ReadError::Decode { id, .. } => *id,
        }
    }
}

/// A write was rejected before or during broadcast
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("No wallet is signed in")]
    NotSignedIn,

    #[error("Wallet declined {function}: {reason}")]
    Rejected { function: String, reason: String },

    #[error("Broadcast of {function} failed: {reason}")]
    Broadcast { function: String, reason: String },
}

/// Client-side input errors, raised before any gateway call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid ID")]
    InvalidId,

    #[error("Invalid amount")]
    InvalidAmount,

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Transaction {0} is outside the scan range")]
    OutOfRange(TransactionId),

    #[error("Transaction {0} is not awaiting approval")]
    NotPendingApproval(TransactionId),

    #[error("Transaction {0} does not have enough approvals to execute")]
    NotExecutable(TransactionId),

    #[error("An action for transaction {0} is already in flight")]
    ActionInFlight(TransactionId),

    #[error("Connect a wallet first")]
    NotSignedIn,
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(ValidationError::ActionInFlight(_)) => {
                (StatusCode::CONFLICT, "ACTION_IN_FLIGHT")
            }
            AppError::Validation(ValidationError::NotSignedIn) => {
                (StatusCode::UNAUTHORIZED, "NOT_SIGNED_IN")
            }
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
            AppError::Submission(SubmissionError::NotSignedIn) => {
                (StatusCode::UNAUTHORIZED, "NOT_SIGNED_IN")
            }
            AppError::Submission(SubmissionError::Rejected { .. }) => {
                (StatusCode::BAD_GATEWAY, "SUBMISSION_REJECTED")
            }
            AppError::Submission(SubmissionError::Broadcast { .. }) => {
                (StatusCode::BAD_GATEWAY, "BROADCAST_FAILED")
            }
            AppError::BatchUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "LEDGER_UNAVAILABLE")
            }
            AppError::Config(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();
        let message = match &self {
            AppError::Config(_) | AppError::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        AppError::Internal(format!("HTTP client error: {:?}", error))
    }
}

/// Only the recipient field carries derive-based rules
impl From<validator::ValidationErrors> for ValidationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let details = errors
            .field_errors()
            .into_iter()
            .map(|(field, errors)| {
                let messages: Vec<String> = errors
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|s| s.to_string())
                            .unwrap_or_else(|| e.code.to_string())
                    })
                    .collect();
                format!("{}: {}", field, messages.join(", "))
            })
            .collect::<Vec<String>>()
            .join("; ");

        ValidationError::InvalidRecipient(details)
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
