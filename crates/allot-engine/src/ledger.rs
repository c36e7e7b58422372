//! # Resource Ledger
//!
//! One atomic claim or release against one resource, under the configured
//! [`LockStrategy`]. The ledger never retries; it reports a lost race as
//! [`LedgerError::Conflict`] and leaves the decision to its caller.
//!
//! ## Strategies
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Pessimistic                                                            │
//! │    store.write_resource_exclusive(id, |current| current.apply_claim)    │
//! │      → Ok(next) | Capacity(..) | AlreadyClaimed                         │
//! │                                                                         │
//! │  Optimistic                                                             │
//! │    current = store.read_resource(id)          (no lock)                 │
//! │    next    = current.apply_claim(amount)      (local check)             │
//! │    store.compare_and_write_resource(id, current.version, next)          │
//! │      → Committed → Ok(next)                                             │
//! │      → VersionMismatch → Conflict                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use allot_core::{Claim, Resource, VersionConflict};
use allot_db::{CasOutcome, ResourceStore};
use chrono::Utc;
use tracing::{debug, trace};

use crate::config::LockStrategy;
use crate::error::{LedgerError, LedgerResult};

#[derive(Clone)]
pub struct ResourceLedger {
    store: Arc<dyn ResourceStore>,
    strategy: LockStrategy,
}

impl std::fmt::Debug for ResourceLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceLedger")
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl ResourceLedger {
    pub fn new(store: Arc<dyn ResourceStore>, strategy: LockStrategy) -> Self {
        ResourceLedger { store, strategy }
    }

    pub fn strategy(&self) -> LockStrategy {
        self.strategy
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    /// Claims `amount` units, persisting `claim` in the same atomic write.
    pub async fn try_claim(
        &self,
        resource_id: &str,
        amount: i64,
        claim: Option<Claim>,
    ) -> LedgerResult<Resource> {
        let requester = claim.as_ref().map(|c| c.requester_id.clone());
        trace!(resource_id, amount, strategy = %self.strategy, "Ledger claim");

        let result = match self.strategy {
            LockStrategy::Pessimistic => {
                // The clock is read under the row lock, not on arrival
                self.store
                    .write_resource_exclusive(
                        resource_id,
                        Box::new(move |current: &Resource| {
                            current.apply_claim(amount, Utc::now())
                        }),
                        claim,
                    )
                    .await
            }
            LockStrategy::Optimistic => {
                return self
                    .compare_and_write(resource_id, claim, |current| {
                        current.apply_claim(amount, Utc::now())
                    })
                    .await;
            }
        };

        result.map_err(|e| LedgerError::from_store(e, resource_id, requester.as_deref()))
    }

    /// Returns `amount` units to a stock resource.
    pub async fn release(&self, resource_id: &str, amount: i64) -> LedgerResult<Resource> {
        trace!(resource_id, amount, strategy = %self.strategy, "Ledger release");

        match self.strategy {
            LockStrategy::Pessimistic => self
                .store
                .write_resource_exclusive(
                    resource_id,
                    Box::new(move |current: &Resource| current.apply_release(amount)),
                    None,
                )
                .await
                .map_err(|e| LedgerError::from_store(e, resource_id, None)),
            LockStrategy::Optimistic => {
                self.compare_and_write(resource_id, None, |current| current.apply_release(amount))
                    .await
            }
        }
    }

    /// Undoes a committed claim, deleting it and handing its units back.
    ///
    /// Runs under the resource's exclusive lock whatever the strategy; an
    /// optimistic writer racing it sees the version bump and retries.
    pub async fn revoke(&self, claim: &Claim) -> LedgerResult<Resource> {
        trace!(claim_id = %claim.id, resource_id = %claim.resource_id, "Ledger revoke");
        self.store
            .revoke_claim(&claim.id)
            .await
            .map_err(|e| LedgerError::from_store(e, &claim.resource_id, None))
    }

    /// Current state of a resource, read without locking.
    pub async fn snapshot(&self, resource_id: &str) -> LedgerResult<Resource> {
        self.store
            .read_resource(resource_id)
            .await
            .map_err(|e| LedgerError::from_store(e, resource_id, None))
    }

    async fn compare_and_write<F>(
        &self,
        resource_id: &str,
        claim: Option<Claim>,
        transition: F,
    ) -> LedgerResult<Resource>
    where
        F: FnOnce(&Resource) -> Result<Resource, allot_core::CapacityError>,
    {
        let requester = claim.as_ref().map(|c| c.requester_id.clone());
        let to_ledger = |e| LedgerError::from_store(e, resource_id, requester.as_deref());

        let current = self.store.read_resource(resource_id).await.map_err(to_ledger)?;
        let next = transition(&current)?;

        let outcome = self
            .store
            .compare_and_write_resource(resource_id, current.version, &next, claim)
            .await
            .map_err(to_ledger)?;

        match outcome {
            CasOutcome::Committed => Ok(next),
            CasOutcome::VersionMismatch => {
                debug!(resource_id, expected_version = current.version, "Optimistic write lost the race");
                Err(LedgerError::Conflict(VersionConflict {
                    resource_id: resource_id.to_string(),
                    expected_version: current.version,
                }))
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
