//! # Allocation Coordinator
//!
//! "Give one unit of resource X to requester Y", with per-requester
//! uniqueness and the optimistic retry loop.
//!
//! ## Allocation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  reserve(resource_id, requester_id, quantity)                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  validate ids + quantity ── bad ──► Validation / InvalidQuantity       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌──► read resource ── missing ──► ResourceNotFound                    │
//! │  │    │                                                                 │
//! │  │    ▼                                                                 │
//! │  │  quota and active claim exists? ── yes ──► AlreadyClaimed (fast)    │
//! │  │    │                                                                 │
//! │  │    ▼                                                                 │
//! │  │  ledger.try_claim(id, quantity, claim)                               │
//! │  │    ├── Ok ─────────────────────────► Claim                          │
//! │  │    ├── Capacity ───────────────────► OutOfWindow / Exhausted        │
//! │  │    ├── AlreadyClaimed (unique) ────► AlreadyClaimed (authoritative) │
//! │  │    └── Conflict                                                      │
//! │  │          │                                                           │
//! │  │          ├── budget left: sleep(base × attempt) ──┐                 │
//! │  └──────────┼────────────────────────────────────────┘                 │
//! │             └── budget spent ──► AllocationFailed { attempts }         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Either the claim exists and `consumed` reflects it, or neither changed.
//!
//! ## Orders
//! [`AllocationCoordinator::reserve_many`] reserves several lines for one
//! requester. Lines are reserved in order; when one fails, the lines
//! already committed are revoked newest first and the line's error is
//! returned, so an order either holds every line or none.

use std::future::Future;
use std::sync::Arc;

use allot_core::validation::{validate_identifier, validate_quantity};
use allot_core::{AllocationError, AllocationResult, Claim, OrderLine, Resource, ValidationError};
use allot_db::{CasOutcome, DbError, ResourceStore};
use backoff::backoff::Backoff;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::ResourceLedger;
use crate::retry::RetryPolicy;

fn storage(err: DbError) -> AllocationError {
    AllocationError::Storage(err.to_string())
}

#[derive(Debug, Clone)]
pub struct AllocationCoordinator {
    ledger: ResourceLedger,
    retry: RetryPolicy,
}

impl AllocationCoordinator {
    pub fn new(ledger: ResourceLedger, retry: RetryPolicy) -> Self {
        AllocationCoordinator { ledger, retry }
    }

    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    fn store(&self) -> &Arc<dyn ResourceStore> {
        self.ledger.store()
    }

    /// Claims a single unit.
    pub async fn allocate(&self, resource_id: &str, requester_id: &str) -> AllocationResult<Claim> {
        self.reserve(resource_id, requester_id, 1).await
    }

    /// Claims `quantity` units for `requester_id`.
    pub async fn reserve(
        &self,
        resource_id: &str,
        requester_id: &str,
        quantity: i64,
    ) -> AllocationResult<Claim> {
        validate_identifier("resource_id", resource_id)?;
        validate_identifier("requester_id", requester_id)?;
        if validate_quantity(quantity).is_err() {
            return Err(AllocationError::InvalidQuantity {
                requested: quantity,
            });
        }

        let claim = self
            .with_retry(resource_id, |attempt| async move {
                debug!(resource_id, requester_id, quantity, attempt, "Allocation attempt");

                let resource = self.ledger.snapshot(resource_id).await?;
                if resource.kind.one_per_requester() {
                    let existing = self
                        .store()
                        .read_active_claim(resource_id, requester_id)
                        .await
                        .map_err(|e| LedgerError::Storage(e.to_string()))?;
                    if existing.is_some() {
                        return Err(LedgerError::AlreadyClaimed {
                            resource_id: resource_id.to_string(),
                            requester_id: requester_id.to_string(),
                        });
                    }
                }

                let claim = Claim::issue(resource_id, requester_id, quantity, Utc::now());
                let committed = self
                    .ledger
                    .try_claim(resource_id, quantity, Some(claim.clone()))
                    .await?;
                Ok::<_, LedgerError>((claim, committed))
            })
            .await
            .map(|(claim, committed)| {
                info!(
                    resource_id,
                    requester_id,
                    claim_id = %claim.id,
                    consumed = committed.consumed,
                    limit = committed.limit,
                    "Claim committed"
                );
                claim
            })?;

        Ok(claim)
    }

    /// Reserves every line of an order for `requester_id`, or none of them.
    pub async fn reserve_many(
        &self,
        requester_id: &str,
        lines: &[OrderLine],
    ) -> AllocationResult<Vec<Claim>> {
        validate_identifier("requester_id", requester_id)?;
        if lines.is_empty() {
            return Err(ValidationError::Required {
                field: "lines".to_string(),
            }
            .into());
        }

        let mut claims = Vec::with_capacity(lines.len());
        for line in lines {
            match self
                .reserve(&line.resource_id, requester_id, line.quantity)
                .await
            {
                Ok(claim) => claims.push(claim),
                Err(err) => {
                    warn!(
                        requester_id,
                        resource_id = %line.resource_id,
                        error = %err,
                        committed = claims.len(),
                        "Order line failed, rolling back"
                    );
                    self.roll_back(&claims).await?;
                    return Err(err);
                }
            }
        }

        info!(requester_id, lines = claims.len(), "Order reserved");
        Ok(claims)
    }

    /// Revokes `claims` newest first. Keeps going past a failure and
    /// reports the first one.
    async fn roll_back(&self, claims: &[Claim]) -> AllocationResult<()> {
        let mut first_failure = None;
        for claim in claims.iter().rev() {
            if let Err(e) = self.ledger.revoke(claim).await {
                error!(
                    claim_id = %claim.id,
                    resource_id = %claim.resource_id,
                    error = %e,
                    "Rollback of order line failed"
                );
                first_failure.get_or_insert(e);
            }
        }

        match first_failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Returns `quantity` units to a stock resource.
    pub async fn release(&self, resource_id: &str, quantity: i64) -> AllocationResult<Resource> {
        validate_identifier("resource_id", resource_id)?;
        if validate_quantity(quantity).is_err() {
            return Err(AllocationError::InvalidQuantity {
                requested: quantity,
            });
        }

        let resource = self
            .with_retry(resource_id, |_| self.ledger.release(resource_id, quantity))
            .await?;
        info!(resource_id, quantity, consumed = resource.consumed, "Units released");
        Ok(resource)
    }

    /// Marks a claim used. A claim can be consumed exactly once.
    pub async fn consume_claim(&self, claim_id: &str) -> AllocationResult<Claim> {
        validate_identifier("claim_id", claim_id)?;

        let claim = self.store().read_claim(claim_id).await.map_err(|e| {
            if e.is_not_found() {
                AllocationError::ClaimNotFound(claim_id.to_string())
            } else {
                storage(e)
            }
        })?;

        let now = Utc::now();
        let consumed = claim.consume(now)?;

        match self
            .store()
            .consume_claim(claim_id, claim.version, now)
            .await
            .map_err(storage)?
        {
            CasOutcome::Committed => {
                info!(claim_id, resource_id = %claim.resource_id, "Claim consumed");
                Ok(consumed)
            }
            CasOutcome::VersionMismatch => {
                let latest = self.store().read_claim(claim_id).await.map_err(storage)?;
                if latest.consumed {
                    Err(AllocationError::AlreadyConsumed(claim_id.to_string()))
                } else {
                    Err(AllocationError::ClaimConflict(claim_id.to_string()))
                }
            }
        }
    }

    /// Resources that could issue a unit right now.
    pub async fn available_resources(&self) -> AllocationResult<Vec<Resource>> {
        let now = Utc::now();
        let resources = self.store().list_resources().await.map_err(storage)?;
        Ok(resources.into_iter().filter(|r| r.can_issue(now)).collect())
    }

    /// Active claims held by `requester_id` whose resource is inside its window.
    pub async fn requester_claims(&self, requester_id: &str) -> AllocationResult<Vec<Claim>> {
        validate_identifier("requester_id", requester_id)?;

        let now = Utc::now();
        let claims = self
            .store()
            .list_active_claims(requester_id)
            .await
            .map_err(storage)?;

        let mut usable = Vec::with_capacity(claims.len());
        for claim in claims {
            match self.store().read_resource(&claim.resource_id).await {
                Ok(resource) if resource.is_within_window(now) => usable.push(claim),
                Ok(_) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(storage(e)),
            }
        }
        Ok(usable)
    }

    /// Current state of a resource.
    pub async fn snapshot(&self, resource_id: &str) -> AllocationResult<Resource> {
        Ok(self.ledger.snapshot(resource_id).await?)
    }

    /// Runs `op` until it stops reporting a version conflict or the retry
    /// budget is spent. Every other outcome is returned as is.
    async fn with_retry<T, F, Fut>(&self, resource_id: &str, mut op: F) -> AllocationResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = LedgerResult<T>>,
    {
        let mut schedule = self.retry.schedule();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(LedgerError::Conflict(conflict)) => {
                    let Some(backoff) = schedule.next_backoff() else {
                        warn!(resource_id, attempts = attempt, "Retry budget exhausted");
                        return Err(AllocationError::AllocationFailed {
                            resource_id: resource_id.to_string(),
                            attempts: attempt,
                            last_conflict: conflict,
                        });
                    };
                    warn!(
                        resource_id,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "Version conflict, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(other) => return Err(other.into()),
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockStrategy;
    use allot_core::VersionConflict;
    use allot_db::MemoryStore;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    async fn coordinator(strategy: LockStrategy, resources: &[Resource]) -> AllocationCoordinator {
        let store = Arc::new(MemoryStore::new());
        for r in resources {
            store.insert_resource(r).await.unwrap();
        }
        AllocationCoordinator::new(
            ResourceLedger::new(store, strategy),
            RetryPolicy::new(3, Duration::from_millis(1)),
        )
    }

    fn order_fixture() -> Vec<Resource> {
        vec![
            Resource::stock("Bibimbap", 10).with_id("m1"),
            Resource::stock("Kimchi stew", 1).with_id("m2"),
            Resource::quota("Welcome coupon", 5).with_id("c1"),
        ]
    }

    #[tokio::test]
    async fn test_reserve_many_commits_every_line() {
        for strategy in [LockStrategy::Pessimistic, LockStrategy::Optimistic] {
            let coord = coordinator(strategy, &order_fixture()).await;

            let claims = coord
                .reserve_many(
                    "u1",
                    &[OrderLine::new("m1", 3), OrderLine::new("m2", 1), OrderLine::new("c1", 1)],
                )
                .await
                .unwrap();
            assert_eq!(claims.len(), 3);
            assert_eq!(coord.snapshot("m1").await.unwrap().consumed, 3);
            assert_eq!(coord.snapshot("m2").await.unwrap().consumed, 1);
            assert_eq!(coord.snapshot("c1").await.unwrap().consumed, 1);
        }
    }

    #[tokio::test]
    async fn test_reserve_many_rolls_back_on_exhausted_line() {
        for strategy in [LockStrategy::Pessimistic, LockStrategy::Optimistic] {
            let coord = coordinator(strategy, &order_fixture()).await;

            let err = coord
                .reserve_many(
                    "u1",
                    &[OrderLine::new("c1", 1), OrderLine::new("m1", 3), OrderLine::new("m2", 2)],
                )
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                AllocationError::Exhausted { remaining: 1, requested: 2, .. }
            ));

            for id in ["m1", "m2", "c1"] {
                assert_eq!(coord.snapshot(id).await.unwrap().consumed, 0, "{id}");
                assert_eq!(coord.store().count_claims(id).await.unwrap(), 0, "{id}");
            }
            assert!(coord.requester_claims("u1").await.unwrap().is_empty());

            // The coupon slot was given back too
            coord.allocate("c1", "u1").await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_reserve_many_rejects_empty_order() {
        let coord = coordinator(LockStrategy::Pessimistic, &order_fixture()).await;
        assert!(matches!(
            coord.reserve_many("u1", &[]).await.unwrap_err(),
            AllocationError::Validation(ValidationError::Required { .. })
        ));
        assert!(matches!(
            coord
                .reserve_many("u1", &[OrderLine::new("m1", 2), OrderLine::new("ghost", 1)])
                .await
                .unwrap_err(),
            AllocationError::ResourceNotFound(_)
        ));
        assert_eq!(coord.snapshot("m1").await.unwrap().consumed, 0);
    }

    #[tokio::test]
    async fn test_allocate_then_already_claimed() {
        let coord = coordinator(LockStrategy::Pessimistic, &[Resource::quota("Coupon", 10).with_id("c1")]).await;

        let claim = coord.allocate("c1", "u1").await.unwrap();
        assert_eq!(claim.quantity, 1);
        assert!(claim.is_active());

        let err = coord.allocate("c1", "u1").await.unwrap_err();
        assert_eq!(
            err,
            AllocationError::AlreadyClaimed {
                resource_id: "c1".to_string(),
                requester_id: "u1".to_string(),
            }
        );
        assert_eq!(coord.snapshot("c1").await.unwrap().consumed, 1);
    }

    #[tokio::test]
    async fn test_failure_taxonomy() {
        let now = Utc::now();
        let coord = coordinator(
            LockStrategy::Optimistic,
            &[
                Resource::quota("Gone", 0).with_id("empty"),
                Resource::quota("Expired", 10)
                    .with_id("old")
                    .with_window(None, Some(now - ChronoDuration::hours(1))),
            ],
        )
        .await;

        assert_eq!(
            coord.allocate("missing", "u1").await.unwrap_err(),
            AllocationError::ResourceNotFound("missing".to_string())
        );
        assert!(matches!(
            coord.allocate("empty", "u1").await.unwrap_err(),
            AllocationError::Exhausted { remaining: 0, requested: 1, .. }
        ));
        assert_eq!(
            coord.allocate("old", "u1").await.unwrap_err(),
            AllocationError::OutOfWindow("old".to_string())
        );
        assert!(matches!(
            coord.reserve("empty", "u1", 0).await.unwrap_err(),
            AllocationError::InvalidQuantity { requested: 0 }
        ));
        assert!(matches!(
            coord.allocate("empty", "").await.unwrap_err(),
            AllocationError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_stock_reserve_and_release() {
        let coord = coordinator(LockStrategy::Optimistic, &[Resource::stock("Bibimbap", 5).with_id("m1")]).await;

        coord.reserve("m1", "u1", 2).await.unwrap();
        coord.reserve("m1", "u1", 2).await.unwrap();
        assert!(matches!(
            coord.reserve("m1", "u2", 2).await.unwrap_err(),
            AllocationError::Exhausted { remaining: 1, .. }
        ));

        let after = coord.release("m1", 3).await.unwrap();
        assert_eq!(after.consumed, 1);
        assert!(matches!(
            coord.release("m1", 5).await.unwrap_err(),
            AllocationError::ReleaseExceedsConsumed { consumed: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_consume_claim_once_then_reclaim() {
        let coord = coordinator(LockStrategy::Pessimistic, &[Resource::quota("Coupon", 10).with_id("c1")]).await;

        let claim = coord.allocate("c1", "u1").await.unwrap();
        let used = coord.consume_claim(&claim.id).await.unwrap();
        assert!(used.consumed);
        assert!(used.consumed_at.is_some());

        assert_eq!(
            coord.consume_claim(&claim.id).await.unwrap_err(),
            AllocationError::AlreadyConsumed(claim.id.clone())
        );
        assert!(matches!(
            coord.consume_claim("nope").await.unwrap_err(),
            AllocationError::ClaimNotFound(_)
        ));

        // The quota slot is free again once the claim is used
        coord.allocate("c1", "u1").await.unwrap();
        assert_eq!(coord.snapshot("c1").await.unwrap().consumed, 2);
    }

    #[tokio::test]
    async fn test_listing_filters_by_window_and_capacity() {
        let now = Utc::now();
        let coord = coordinator(
            LockStrategy::Pessimistic,
            &[
                Resource::quota("Open", 5).with_id("open"),
                Resource::quota("Full", 0).with_id("full"),
                Resource::quota("Later", 5)
                    .with_id("later")
                    .with_window(Some(now + ChronoDuration::days(1)), None),
            ],
        )
        .await;

        let ids: Vec<String> = coord
            .available_resources()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["open".to_string()]);

        coord.allocate("open", "u1").await.unwrap();
        let claims = coord.requester_claims("u1").await.unwrap();
        assert_eq!(claims.len(), 1);
        assert!(coord.requester_claims("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retry_budget_reports_attempts() {
        let coord = coordinator(LockStrategy::Optimistic, &[Resource::stock("x", 1).with_id("x")]).await;

        let result: AllocationResult<()> = coord
            .with_retry("x", |_| async {
                Err(LedgerError::Conflict(VersionConflict {
                    resource_id: "x".to_string(),
                    expected_version: 0,
                }))
            })
            .await;

        match result {
            Err(AllocationError::AllocationFailed { attempts, last_conflict, .. }) => {
                assert_eq!(attempts, 4);
                assert_eq!(last_conflict.expected_version, 0);
            }
            other => panic!("expected AllocationFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retry_stops_on_success() {
        let coord = coordinator(LockStrategy::Optimistic, &[Resource::stock("x", 1).with_id("x")]).await;
        let calls = std::sync::atomic::AtomicU32::new(0);

        let result = coord
            .with_retry("x", |attempt| {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(LedgerError::Conflict(VersionConflict {
                            resource_id: "x".to_string(),
                            expected_version: attempt as i64,
                        }))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
