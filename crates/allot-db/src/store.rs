//! # Resource Store
//!
//! The storage seam between the engine and a backend.
//!
//! ## Two Ways To Write A Resource
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  write_resource_exclusive (pessimistic)                                 │
//! │                                                                         │
//! │    lock(id) ─► read ─► mutate(&current) ─► write + claim ─► unlock     │
//! │    Contenders queue on the lock. A refused mutation writes nothing.    │
//! │                                                                         │
//! │  compare_and_write_resource (optimistic)                                │
//! │                                                                         │
//! │    caller read (no lock) ... compare version ─► write + claim          │
//! │                                  │                                      │
//! │                                  └─ mismatch ─► VersionMismatch         │
//! │    Nothing waits; the caller decides whether to retry.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! In both paths the optional claim is persisted in the same atomic step
//! as the resource state. If the claim violates the active-claim
//! uniqueness constraint, the resource is left untouched and the call
//! returns [`DbError::UniqueViolation`](crate::DbError::UniqueViolation).

use allot_core::{CapacityError, Claim, DiscountRule, Resource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DbResult;

/// The mutation run under the resource's exclusive lock.
///
/// Receives the current state and returns the next state, or the reason
/// the capacity check refused.
pub type ExclusiveMutation =
    Box<dyn FnOnce(&Resource) -> Result<Resource, CapacityError> + Send>;

/// Outcome of a version-checked write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    Committed,
    /// The stored version differed from the expected one; nothing changed.
    VersionMismatch,
}

impl CasOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CasOutcome::Committed)
    }
}

/// Async storage interface for resources, claims and discount rules.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    // -------------------------------------------------------------------------
    // Resources
    // -------------------------------------------------------------------------

    /// Reads a resource without taking any lock.
    async fn read_resource(&self, id: &str) -> DbResult<Resource>;

    async fn list_resources(&self) -> DbResult<Vec<Resource>>;

    async fn insert_resource(&self, resource: &Resource) -> DbResult<()>;

    /// Locks the resource, applies `mutate` to its current state and
    /// persists the result together with `claim`.
    async fn write_resource_exclusive(
        &self,
        id: &str,
        mutate: ExclusiveMutation,
        claim: Option<Claim>,
    ) -> DbResult<Resource>;

    /// Writes `new_state` (and `claim`) only if the stored version still
    /// equals `expected_version`.
    async fn compare_and_write_resource(
        &self,
        id: &str,
        expected_version: i64,
        new_state: &Resource,
        claim: Option<Claim>,
    ) -> DbResult<CasOutcome>;

    // -------------------------------------------------------------------------
    // Claims
    // -------------------------------------------------------------------------

    async fn read_active_claim(
        &self,
        resource_id: &str,
        requester_id: &str,
    ) -> DbResult<Option<Claim>>;

    /// Inserts a claim on its own. Fails with `UniqueViolation` when the
    /// requester already holds an active claim on a quota resource.
    async fn insert_claim(&self, claim: &Claim) -> DbResult<()>;

    async fn read_claim(&self, id: &str) -> DbResult<Claim>;

    /// Unconsumed claims held by `requester_id`, oldest first.
    async fn list_active_claims(&self, requester_id: &str) -> DbResult<Vec<Claim>>;

    /// Marks a claim consumed if its version still equals `expected_version`.
    async fn consume_claim(
        &self,
        id: &str,
        expected_version: i64,
        at: DateTime<Utc>,
    ) -> DbResult<CasOutcome>;

    /// Deletes an unconsumed claim and hands its units back to the
    /// resource, both in one step under the resource's exclusive lock.
    ///
    /// Used to undo the lines of an order that could not be completed.
    async fn revoke_claim(&self, id: &str) -> DbResult<Resource>;

    /// Number of claims ever issued against a resource.
    async fn count_claims(&self, resource_id: &str) -> DbResult<i64>;

    // -------------------------------------------------------------------------
    // Discount rules
    // -------------------------------------------------------------------------

    async fn read_rule(&self, id: &str) -> DbResult<DiscountRule>;

    async fn insert_rule(&self, rule: &DiscountRule) -> DbResult<()>;
}
