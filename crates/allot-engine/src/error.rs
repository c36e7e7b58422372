//! # Engine Error Types
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Engine Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────┐         │
//! │  │  LedgerError    │  │  ConfigError    │  │  SeedError      │         │
//! │  │  ─────────────  │  │  ─────────────  │  │  ─────────────  │         │
//! │  │  NotFound       │  │  ReadFailed     │  │  Parse          │         │
//! │  │  Capacity       │  │  Parse          │  │  Invalid        │         │
//! │  │  Conflict ◄─────┼──┼── retryable     │  │  Storage        │         │
//! │  │  AlreadyClaimed │  │  Invalid        │  │                 │         │
//! │  │  Storage        │  │                 │  │                 │         │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────┘         │
//! │                                                                         │
//! │  LedgerError is internal: the coordinator turns it into the            │
//! │  caller-facing AllocationError (allot-core).                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use allot_core::{AllocationError, CapacityError, ValidationError, VersionConflict};
use allot_db::DbError;
use thiserror::Error;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// Ledger Error
// =============================================================================

/// Outcome of a single ledger write that did not commit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The capacity check refused; nothing was written.
    #[error(transparent)]
    Capacity(#[from] CapacityError),

    /// Optimistic write lost the race; nothing was written.
    #[error(transparent)]
    Conflict(#[from] VersionConflict),

    /// The attached claim hit the active-claim unique constraint.
    #[error("Requester {requester_id} already holds an active claim on {resource_id}")]
    AlreadyClaimed {
        resource_id: String,
        requester_id: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Translates a store error for a write on `resource_id`.
    ///
    /// `requester_id` names the holder of the claim that was attached, if any,
    /// so a unique violation can be reported as `AlreadyClaimed`.
    pub(crate) fn from_store(err: DbError, resource_id: &str, requester_id: Option<&str>) -> Self {
        match (err, requester_id) {
            (DbError::NotFound { entity, .. }, _) if entity == "Resource" => {
                LedgerError::NotFound(resource_id.to_string())
            }
            (DbError::Rejected(capacity), _) => LedgerError::Capacity(capacity),
            (DbError::UniqueViolation { .. }, Some(requester)) => LedgerError::AlreadyClaimed {
                resource_id: resource_id.to_string(),
                requester_id: requester.to_string(),
            },
            (other, _) => LedgerError::Storage(other.to_string()),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::Conflict(_))
    }
}

impl From<LedgerError> for AllocationError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(id) => AllocationError::ResourceNotFound(id),
            LedgerError::Capacity(capacity) => capacity.into(),
            LedgerError::Conflict(conflict) => AllocationError::AllocationFailed {
                resource_id: conflict.resource_id.clone(),
                attempts: 1,
                last_conflict: conflict,
            },
            LedgerError::AlreadyClaimed {
                resource_id,
                requester_id,
            } => AllocationError::AlreadyClaimed {
                resource_id,
                requester_id,
            },
            LedgerError::Storage(msg) => AllocationError::Storage(msg),
        }
    }
}

// =============================================================================
// Config Error
// =============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFailed(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range or inconsistent with another.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Seed Error
// =============================================================================

/// Errors while loading fixture data into a store.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Failed to parse seed data: {0}")]
    Parse(String),

    #[error("Invalid seed entry {id}: {source}")]
    Invalid {
        id: String,
        #[source]
        source: ValidationError,
    },

    #[error("Failed to store seed entry: {0}")]
    Storage(#[from] DbError),
}

// =============================================================================
// Unit Tests
// =============================================================================
