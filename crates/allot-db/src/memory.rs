//! # In-Memory Store
//!
//! A [`ResourceStore`] backed by process memory, used by tests, the
//! contention simulation and the CLI's default backend.
//!
//! ## Locking Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  resources: RwLock<HashMap<id, Arc<ResourceSlot>>>                      │
//! │                                                                         │
//! │  ResourceSlot                                                           │
//! │  ├── row_lock: tokio::sync::Mutex<()>   held across simulated I/O      │
//! │  └── state:    std::sync::Mutex<Resource>  held for a copy or a store  │
//! │                                                                         │
//! │  claims: std::sync::Mutex<ClaimTable>                                   │
//! │  └── active_exclusive: HashSet<(resource_id, requester_id)>            │
//! │                                                                         │
//! │  Lock order: row_lock → state → claims                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Plain reads only touch `state`, so they never wait behind a writer
//! that is sleeping inside `row_lock`.
//!
//! ## Cancellation
//! Every write path applies its changes after its last `.await`. A future
//! dropped while it holds (or waits for) `row_lock` releases the lock and
//! leaves the resource and the claim table exactly as they were.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use allot_core::{Claim, DiscountRule, Resource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::error::{DbError, DbResult};
use crate::store::{CasOutcome, ExclusiveMutation, ResourceStore};

// =============================================================================
// Internal Tables
// =============================================================================

struct ResourceSlot {
    row_lock: tokio::sync::Mutex<()>,
    state: Mutex<Resource>,
}

impl ResourceSlot {
    fn new(resource: Resource) -> Self {
        ResourceSlot {
            row_lock: tokio::sync::Mutex::new(()),
            state: Mutex::new(resource),
        }
    }

    fn state(&self) -> MutexGuard<'_, Resource> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct StoredClaim {
    claim: Claim,
    exclusive: bool,
}

#[derive(Default)]
struct ClaimTable {
    by_id: HashMap<String, StoredClaim>,
    /// (resource_id, requester_id) of every active quota claim.
    active_exclusive: HashSet<(String, String)>,
    /// Claim ids in insertion order.
    order: Vec<String>,
}

impl ClaimTable {
    fn insert(&mut self, claim: Claim, exclusive: bool) -> DbResult<()> {
        if self.by_id.contains_key(&claim.id) {
            return Err(DbError::duplicate("claims.id", claim.id));
        }

        if exclusive && claim.is_active() {
            let key = (claim.resource_id.clone(), claim.requester_id.clone());
            if self.active_exclusive.contains(&key) {
                return Err(DbError::duplicate(
                    "claims.resource_id, claims.requester_id",
                    format!("{}/{}", key.0, key.1),
                ));
            }
            self.active_exclusive.insert(key);
        }

        self.order.push(claim.id.clone());
        self.by_id
            .insert(claim.id.clone(), StoredClaim { claim, exclusive });
        Ok(())
    }

    fn remove(&mut self, id: &str) -> Option<Claim> {
        let stored = self.by_id.remove(id)?;
        if stored.exclusive && stored.claim.is_active() {
            self.active_exclusive.remove(&(
                stored.claim.resource_id.clone(),
                stored.claim.requester_id.clone(),
            ));
        }
        self.order.retain(|claim_id| claim_id != id);
        Some(stored.claim)
    }
}

/// Refuses states the SQL CHECK constraint would refuse.
fn check_resource_bounds(resource: &Resource) -> DbResult<()> {
    if resource.consumed < 0 || resource.consumed > resource.limit {
        return Err(DbError::QueryFailed(format!(
            "CHECK constraint failed: consumed {} outside 0..={} for {}",
            resource.consumed, resource.limit, resource.id
        )));
    }
    Ok(())
}

// =============================================================================
// MemoryStore
// =============================================================================

/// Process-local store with per-resource row locks.
///
/// ## Example
/// ```rust,ignore
/// let store = MemoryStore::new().with_io_latency(Duration::from_millis(5));
/// store.insert_resource(&Resource::quota("Launch coupon", 100)).await?;
/// ```
#[derive(Default)]
pub struct MemoryStore {
    resources: RwLock<HashMap<String, Arc<ResourceSlot>>>,
    claims: Mutex<ClaimTable>,
    rules: RwLock<HashMap<String, DiscountRule>>,
    io_latency: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps for `latency` inside every write, standing in for a
    /// database round trip while the row lock is held.
    pub fn with_io_latency(mut self, latency: Duration) -> Self {
        self.io_latency = (!latency.is_zero()).then_some(latency);
        self
    }

    fn slot(&self, id: &str) -> DbResult<Arc<ResourceSlot>> {
        self.resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| DbError::not_found("Resource", id))
    }

    fn claims(&self) -> MutexGuard<'_, ClaimTable> {
        self.claims.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_io(&self) {
        if let Some(latency) = self.io_latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn read_resource(&self, id: &str) -> DbResult<Resource> {
        let slot = self.slot(id)?;
        let resource = slot.state().clone();
        Ok(resource)
    }

    async fn list_resources(&self) -> DbResult<Vec<Resource>> {
        let slots: Vec<Arc<ResourceSlot>> = self
            .resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut resources: Vec<Resource> = slots.iter().map(|s| s.state().clone()).collect();
        resources.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(resources)
    }

    async fn insert_resource(&self, resource: &Resource) -> DbResult<()> {
        check_resource_bounds(resource)?;

        let mut table = self
            .resources
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if table.contains_key(&resource.id) {
            return Err(DbError::duplicate("resources.id", &resource.id));
        }

        debug!(resource_id = %resource.id, kind = %resource.kind, limit = resource.limit, "Inserting resource");
        table.insert(
            resource.id.clone(),
            Arc::new(ResourceSlot::new(resource.clone())),
        );
        Ok(())
    }

    async fn write_resource_exclusive(
        &self,
        id: &str,
        mutate: ExclusiveMutation,
        claim: Option<Claim>,
    ) -> DbResult<Resource> {
        let slot = self.slot(id)?;

        let _row = slot.row_lock.lock().await;
        trace!(resource_id = %id, "Row lock acquired");
        self.simulate_io().await;

        // No awaits below: the read, the check and both writes are one step.
        let mut state = slot.state();
        let next = mutate(&*state).map_err(DbError::Rejected)?;
        check_resource_bounds(&next)?;

        if let Some(claim) = claim {
            self.claims()
                .insert(claim, state.kind.one_per_requester())?;
        }

        *state = next.clone();
        Ok(next)
    }

    async fn compare_and_write_resource(
        &self,
        id: &str,
        expected_version: i64,
        new_state: &Resource,
        claim: Option<Claim>,
    ) -> DbResult<CasOutcome> {
        let slot = self.slot(id)?;

        // Latency sits between the caller's read and the compare, widening
        // the window in which another writer can win.
        self.simulate_io().await;
        let _row = slot.row_lock.lock().await;

        let mut state = slot.state();
        if state.version != expected_version {
            trace!(
                resource_id = %id,
                expected_version,
                actual_version = state.version,
                "Version mismatch"
            );
            return Ok(CasOutcome::VersionMismatch);
        }
        check_resource_bounds(new_state)?;

        if let Some(claim) = claim {
            self.claims()
                .insert(claim, state.kind.one_per_requester())?;
        }

        *state = Resource {
            version: expected_version + 1,
            ..new_state.clone()
        };
        Ok(CasOutcome::Committed)
    }

    async fn read_active_claim(
        &self,
        resource_id: &str,
        requester_id: &str,
    ) -> DbResult<Option<Claim>> {
        let claims = self.claims();
        let found = claims
            .order
            .iter()
            .filter_map(|id| claims.by_id.get(id))
            .map(|stored| &stored.claim)
            .find(|c| c.is_active() && c.resource_id == resource_id && c.requester_id == requester_id)
            .cloned();
        Ok(found)
    }

    async fn insert_claim(&self, claim: &Claim) -> DbResult<()> {
        let exclusive = self
            .read_resource(&claim.resource_id)
            .await?
            .kind
            .one_per_requester();
        self.claims().insert(claim.clone(), exclusive)
    }

    async fn read_claim(&self, id: &str) -> DbResult<Claim> {
        self.claims()
            .by_id
            .get(id)
            .map(|stored| stored.claim.clone())
            .ok_or_else(|| DbError::not_found("Claim", id))
    }

    async fn list_active_claims(&self, requester_id: &str) -> DbResult<Vec<Claim>> {
        let claims = self.claims();
        Ok(claims
            .order
            .iter()
            .filter_map(|id| claims.by_id.get(id))
            .map(|stored| &stored.claim)
            .filter(|c| c.is_active() && c.requester_id == requester_id)
            .cloned()
            .collect())
    }

    async fn consume_claim(
        &self,
        id: &str,
        expected_version: i64,
        at: DateTime<Utc>,
    ) -> DbResult<CasOutcome> {
        let mut table = self.claims();
        let ClaimTable {
            by_id,
            active_exclusive,
            ..
        } = &mut *table;

        let stored = by_id
            .get_mut(id)
            .ok_or_else(|| DbError::not_found("Claim", id))?;

        if stored.claim.version != expected_version {
            return Ok(CasOutcome::VersionMismatch);
        }

        if stored.exclusive && stored.claim.is_active() {
            active_exclusive.remove(&(
                stored.claim.resource_id.clone(),
                stored.claim.requester_id.clone(),
            ));
        }

        stored.claim.consumed = true;
        stored.claim.consumed_at = Some(at);
        stored.claim.version = expected_version + 1;
        Ok(CasOutcome::Committed)
    }

    async fn revoke_claim(&self, id: &str) -> DbResult<Resource> {
        let resource_id = self.read_claim(id).await?.resource_id;
        let slot = self.slot(&resource_id)?;

        let _row = slot.row_lock.lock().await;
        self.simulate_io().await;

        let mut state = slot.state();
        let mut claims = self.claims();
        let quantity = match claims.by_id.get(id) {
            Some(stored) if stored.claim.is_active() => stored.claim.quantity,
            Some(_) => {
                return Err(DbError::TransactionFailed(format!(
                    "claim {id} is consumed and cannot be revoked"
                )))
            }
            None => return Err(DbError::not_found("Claim", id)),
        };

        let next = state.apply_revoke(quantity)?;
        check_resource_bounds(&next)?;

        claims.remove(id);
        *state = next.clone();
        debug!(claim_id = %id, resource_id = %resource_id, quantity, "Claim revoked");
        Ok(next)
    }

    async fn count_claims(&self, resource_id: &str) -> DbResult<i64> {
        let count = self
            .claims()
            .by_id
            .values()
            .filter(|stored| stored.claim.resource_id == resource_id)
            .count();
        Ok(count as i64)
    }

    async fn read_rule(&self, id: &str) -> DbResult<DiscountRule> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| DbError::not_found("DiscountRule", id))
    }

    async fn insert_rule(&self, rule: &DiscountRule) -> DbResult<()> {
        // Mirrors the foreign key on discount_rules.resource_id
        self.slot(&rule.resource_id).map_err(|_| DbError::ForeignKeyViolation {
            message: format!("resource {} does not exist", rule.resource_id),
        })?;

        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        if rules.contains_key(&rule.id) {
            return Err(DbError::duplicate("discount_rules.id", &rule.id));
        }
        rules.insert(rule.id.clone(), rule.clone());
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
