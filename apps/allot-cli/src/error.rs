//! # CLI Error Type
//!
//! One error shape for every command, printed to stdout as JSON.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  AllocationError ─┐                                                     │
//! │  QuoteError ──────┤                                                     │
//! │  ConfigError ─────┼──► CliError { code, message, retryable } ──► stdout │
//! │  SeedError ───────┤                                                     │
//! │  DbError ─────────┘                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ```json
//! {
//!   "code": "ALREADY_CLAIMED",
//!   "message": "Requester alice already holds an active claim on welcome",
//!   "retryable": false
//! }
//! ```

use allot_core::{AllocationError, QuoteError};
use allot_db::DbError;
use allot_engine::{ConfigError, SeedError};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CliError {
    /// Machine-readable error code for scripts
    pub code: ErrorCode,

    /// Human-readable message
    pub message: String,

    /// Whether resubmitting the same command may succeed
    pub retryable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    ValidationError,
    OutOfWindow,
    Exhausted,
    AlreadyClaimed,
    AlreadyConsumed,
    /// Optimistic retries ran out or a claim changed underneath us
    Contention,
    /// A discount rule cannot be applied by this requester to this order
    NotEligible,
    ConfigError,
    StorageError,
    Internal,
}

impl CliError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        CliError {
            code,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CliError::new(ErrorCode::Internal, message)
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        if self.retryable {
            75
        } else {
            1
        }
    }
}

impl From<AllocationError> for CliError {
    fn from(err: AllocationError) -> Self {
        let code = match &err {
            AllocationError::ResourceNotFound(_) | AllocationError::ClaimNotFound(_) => {
                ErrorCode::NotFound
            }
            AllocationError::OutOfWindow(_) => ErrorCode::OutOfWindow,
            AllocationError::Exhausted { .. } => ErrorCode::Exhausted,
            AllocationError::AlreadyClaimed { .. } => ErrorCode::AlreadyClaimed,
            AllocationError::AlreadyConsumed(_) => ErrorCode::AlreadyConsumed,
            AllocationError::AllocationFailed { .. } | AllocationError::ClaimConflict(_) => {
                ErrorCode::Contention
            }
            AllocationError::InvalidQuantity { .. }
            | AllocationError::NotReleasable(_)
            | AllocationError::ReleaseExceedsConsumed { .. }
            | AllocationError::Validation(_) => ErrorCode::ValidationError,
            AllocationError::Storage(_) => ErrorCode::StorageError,
        };
        CliError::new(code, err.to_string()).retryable(err.is_retryable())
    }
}

impl From<QuoteError> for CliError {
    fn from(err: QuoteError) -> Self {
        let code = match &err {
            QuoteError::RuleNotFound(_) => ErrorCode::NotFound,
            QuoteError::DuplicateRule(_) | QuoteError::Validation(_) => ErrorCode::ValidationError,
            QuoteError::NotOwned(_) | QuoteError::NotValid(_) | QuoteError::BelowMinimum { .. } => {
                ErrorCode::NotEligible
            }
            QuoteError::Storage(_) => ErrorCode::StorageError,
        };
        CliError::new(code, err.to_string()).retryable(err.is_retryable())
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        CliError::new(ErrorCode::ConfigError, err.to_string())
    }
}

impl From<DbError> for CliError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => {
                CliError::new(ErrorCode::NotFound, format!("{} not found: {}", entity, id))
            }
            DbError::UniqueViolation { field, value } => CliError::new(
                ErrorCode::ValidationError,
                format!("{} '{}' already exists", field, value),
            ),
            DbError::ForeignKeyViolation { message } => {
                CliError::new(ErrorCode::ValidationError, format!("Invalid reference: {}", message))
            }
            DbError::PoolExhausted => {
                CliError::new(ErrorCode::StorageError, "Database pool exhausted").retryable(true)
            }
            other => {
                tracing::error!(error = %other, "Storage failure");
                CliError::new(ErrorCode::StorageError, other.to_string())
            }
        }
    }
}

impl From<SeedError> for CliError {
    fn from(err: SeedError) -> Self {
        match err {
            SeedError::Storage(db) => db.into(),
            other => CliError::new(ErrorCode::ValidationError, other.to_string()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::internal(err.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::internal(format!("Failed to encode output: {}", err))
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for CliError {}
