//! # Error Types
//!
//! Domain-specific error types for allot-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  allot-core errors (this file)                                         │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  ├── CapacityError    - A claim/release rejected by the capacity check │
//! │  ├── VersionConflict  - An optimistic write lost the race              │
//! │  ├── AllocationError  - What an allocation caller sees                 │
//! │  └── QuoteError       - What a discount caller sees                    │
//! │                                                                         │
//! │  allot-db errors (separate crate)                                      │
//! │  └── DbError          - Storage operation failures                     │
//! │                                                                         │
//! │  Flow: CapacityError → DbError/LedgerError → AllocationError → caller  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Retryable vs Terminal
//! Callers need to tell "try again later" apart from "this will never
//! succeed". Both caller-facing enums expose `is_retryable()`; only
//! contention outcomes and opaque storage failures answer `true`.

use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Capacity Error
// =============================================================================

/// Outcome of the shared capacity check when it refuses a mutation.
///
/// Produced by [`Resource::apply_claim`](crate::types::Resource::apply_claim)
/// and [`Resource::apply_release`](crate::types::Resource::apply_release).
/// When one of these is returned, no state was changed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapacityError {
    /// Quantity was zero, negative, or above [`MAX_CLAIM_QUANTITY`](crate::MAX_CLAIM_QUANTITY).
    #[error("Invalid quantity: {requested}")]
    InvalidQuantity { requested: i64 },

    /// `now` is outside `[valid_from, valid_until)`.
    #[error("Resource {resource_id} is outside its validity window")]
    OutOfWindow { resource_id: String },

    /// `consumed + requested` would exceed `limit`.
    ///
    /// ## User Workflow
    /// ```text
    /// allocate("coupon-1", "user-42")
    ///      │
    ///      ▼
    /// limit=100, consumed=100
    ///      │
    ///      ▼
    /// Exhausted { remaining: 0, requested: 1 }
    /// ```
    #[error("Resource {resource_id} exhausted: remaining {remaining}, requested {requested}")]
    Exhausted {
        resource_id: String,
        remaining: i64,
        requested: i64,
    },

    /// Quota resources never give units back.
    #[error("Resource {resource_id} is a quota and cannot be released")]
    NotReleasable { resource_id: String },

    /// Releasing more than was consumed would take the counter below zero.
    #[error("Cannot release {requested} from {resource_id}: only {consumed} consumed")]
    ReleaseExceedsConsumed {
        resource_id: String,
        consumed: i64,
        requested: i64,
    },
}

// =============================================================================
// Version Conflict
// =============================================================================

/// An optimistic compare-and-swap found a different version than it read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Resource {resource_id} changed since version {expected_version}")]
pub struct VersionConflict {
    pub resource_id: String,
    pub expected_version: i64,
}

// =============================================================================
// Allocation Error
// =============================================================================

/// Errors surfaced to callers of the allocation operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    /// The resource id does not exist. Caller error, never retried.
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// The resource is outside its validity window.
    #[error("Resource {0} is outside its validity window")]
    OutOfWindow(String),

    /// No units left.
    #[error("Resource {resource_id} exhausted: remaining {remaining}, requested {requested}")]
    Exhausted {
        resource_id: String,
        remaining: i64,
        requested: i64,
    },

    /// The requester already holds an active claim on this quota.
    #[error("Requester {requester_id} already holds an active claim on {resource_id}")]
    AlreadyClaimed {
        resource_id: String,
        requester_id: String,
    },

    /// Optimistic retries ran out; the last conflict is attached.
    #[error("Allocation on {resource_id} failed after {attempts} attempts")]
    AllocationFailed {
        resource_id: String,
        attempts: u32,
        #[source]
        last_conflict: VersionConflict,
    },

    #[error("Invalid quantity: {requested}")]
    InvalidQuantity { requested: i64 },

    #[error("Resource {0} is a quota and cannot be released")]
    NotReleasable(String),

    #[error("Cannot release {requested} from {resource_id}: only {consumed} consumed")]
    ReleaseExceedsConsumed {
        resource_id: String,
        consumed: i64,
        requested: i64,
    },

    #[error("Claim not found: {0}")]
    ClaimNotFound(String),

    /// The claim was already marked used.
    #[error("Claim {0} has already been consumed")]
    AlreadyConsumed(String),

    /// Another caller changed the claim between read and write.
    #[error("Claim {0} was modified concurrently")]
    ClaimConflict(String),

    /// Malformed request input (empty requester id, oversized identifier).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Opaque storage failure (connection, query, pool).
    #[error("Storage error: {0}")]
    Storage(String),
}

impl AllocationError {
    /// Returns true when resubmitting the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AllocationError::AllocationFailed { .. }
                | AllocationError::ClaimConflict(_)
                | AllocationError::Storage(_)
        )
    }
}

impl From<CapacityError> for AllocationError {
    fn from(err: CapacityError) -> Self {
        match err {
            CapacityError::InvalidQuantity { requested } => {
                AllocationError::InvalidQuantity { requested }
            }
            CapacityError::OutOfWindow { resource_id } => AllocationError::OutOfWindow(resource_id),
            CapacityError::Exhausted {
                resource_id,
                remaining,
                requested,
            } => AllocationError::Exhausted {
                resource_id,
                remaining,
                requested,
            },
            CapacityError::NotReleasable { resource_id } => {
                AllocationError::NotReleasable(resource_id)
            }
            CapacityError::ReleaseExceedsConsumed {
                resource_id,
                consumed,
                requested,
            } => AllocationError::ReleaseExceedsConsumed {
                resource_id,
                consumed,
                requested,
            },
        }
    }
}

// =============================================================================
// Quote Error
// =============================================================================

/// Errors surfaced to callers of the discount quote operation.
///
/// Validation is fail-fast: the first violated rule aborts the whole
/// request, so every variant names the rule that stopped it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuoteError {
    /// The same rule id appears twice in one request.
    #[error("Rule {0} was supplied more than once")]
    DuplicateRule(String),

    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    /// The requester holds no active claim on the rule's resource.
    #[error("Rule {0} is not owned by the requester")]
    NotOwned(String),

    /// `now` is outside the rule's validity window.
    #[error("Rule {0} is not currently valid")]
    NotValid(String),

    #[error("Order amount {actual} is below the minimum {required} for rule {rule_id}")]
    BelowMinimum {
        rule_id: String,
        required: Money,
        actual: Money,
    },

    /// Malformed request input (negative amount, empty requester id).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl QuoteError {
    /// Only storage failures are worth retrying; every rule violation is terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QuoteError::Storage(_))
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must be zero or greater.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format or inconsistent combination of fields.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with AllocationError.
pub type AllocationResult<T> = Result<T, AllocationError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CapacityError::Exhausted {
            resource_id: "coupon-1".to_string(),
            remaining: 0,
            requested: 1,
        };
        assert_eq!(
            err.to_string(),
            "Resource coupon-1 exhausted: remaining 0, requested 1"
        );

        let err = QuoteError::BelowMinimum {
            rule_id: "r1".to_string(),
            required: Money::from_minor(15_000),
            actual: Money::from_minor(10_000),
        };
        assert_eq!(
            err.to_string(),
            "Order amount 10000 is below the minimum 15000 for rule r1"
        );
    }

    #[test]
    fn test_capacity_converts_to_allocation_error() {
        let err: AllocationError = CapacityError::OutOfWindow {
            resource_id: "coupon-1".to_string(),
        }
        .into();
        assert_eq!(err, AllocationError::OutOfWindow("coupon-1".to_string()));
    }

    #[test]
    fn test_retryable_classification() {
        let failed = AllocationError::AllocationFailed {
            resource_id: "r".to_string(),
            attempts: 3,
            last_conflict: VersionConflict {
                resource_id: "r".to_string(),
                expected_version: 7,
            },
        };
        assert!(failed.is_retryable());
        assert!(!AllocationError::OutOfWindow("r".to_string()).is_retryable());
        assert!(!AllocationError::AlreadyClaimed {
            resource_id: "r".to_string(),
            requester_id: "u".to_string(),
        }
        .is_retryable());
        assert!(!QuoteError::NotOwned("r".to_string()).is_retryable());
    }

    #[test]
    fn test_allocation_failed_keeps_last_conflict_as_source() {
        use std::error::Error as _;

        let err = AllocationError::AllocationFailed {
            resource_id: "menu-1".to_string(),
            attempts: 3,
            last_conflict: VersionConflict {
                resource_id: "menu-1".to_string(),
                expected_version: 4,
            },
        };
        let source = err.source().map(|s| s.to_string());
        assert_eq!(
            source.as_deref(),
            Some("Resource menu-1 changed since version 4")
        );
    }

    #[test]
    fn test_validation_converts_to_quote_error() {
        let err: QuoteError = ValidationError::Required {
            field: "requester_id".to_string(),
        }
        .into();
        assert!(matches!(err, QuoteError::Validation(_)));
    }
}
