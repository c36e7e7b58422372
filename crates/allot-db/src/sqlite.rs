//! # SQLite Store
//!
//! A [`ResourceStore`] over a sqlx `SqlitePool`.
//!
//! ## Exclusive Writes Without Row Locks
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SQLite locks the whole database, not rows. The exclusive path is:     │
//! │                                                                         │
//! │  1. RowLocks::acquire(id)        in-process, per resource, async       │
//! │  2. BEGIN                                                               │
//! │  3. UPDATE resources SET version = version WHERE id = ?                │
//! │       └─ first statement is a write: takes the write lock up front,    │
//! │          so no read→write upgrade can fail with SQLITE_BUSY later      │
//! │  4. SELECT resource, run the mutation                                  │
//! │  5. UPDATE resource state, INSERT claim                                │
//! │  6. COMMIT  (a dropped transaction rolls back)                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The compare-and-swap path needs no in-process lock: the
//! `WHERE id = ? AND version = ?` clause is the comparison.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use allot_core::{Claim, DiscountRule, Resource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, trace};

use crate::error::{DbError, DbResult};
use crate::store::{CasOutcome, ExclusiveMutation, ResourceStore};

const RESOURCE_COLUMNS: &str =
    "id, name, kind, unit_limit, consumed, valid_from, valid_until, version";

const CLAIM_COLUMNS: &str =
    "id, resource_id, requester_id, quantity, issued_at, consumed, consumed_at, version";

const RULE_COLUMNS: &str = "id, name, resource_id, kind, value, min_order_amount, \
     max_discount_amount, valid_from, valid_until";

// =============================================================================
// Row Locks
// =============================================================================

/// In-process table of per-resource async locks.
///
/// Shared by every [`SqliteStore`] created from the same
/// [`Database`](crate::Database).
#[derive(Debug, Default)]
pub struct RowLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RowLocks {
    fn lock_for(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id.to_string())
            .or_default()
            .clone()
    }
}

// =============================================================================
// SqliteStore
// =============================================================================

/// SQLite-backed store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    row_locks: Arc<RowLocks>,
    io_latency: Option<Duration>,
}

impl SqliteStore {
    /// Creates a store with its own row-lock table.
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_row_locks(pool, Arc::new(RowLocks::default()))
    }

    pub(crate) fn with_row_locks(pool: SqlitePool, row_locks: Arc<RowLocks>) -> Self {
        SqliteStore {
            pool,
            row_locks,
            io_latency: None,
        }
    }

    /// Sleeps for `latency` inside every write (see `MemoryStore`).
    pub fn with_io_latency(mut self, latency: Duration) -> Self {
        self.io_latency = (!latency.is_zero()).then_some(latency);
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn simulate_io(&self) {
        if let Some(latency) = self.io_latency {
            tokio::time::sleep(latency).await;
        }
    }

    async fn fetch_resource(
        tx: &mut Transaction<'_, Sqlite>,
        id: &str,
    ) -> DbResult<Resource> {
        let sql = format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE id = ?1");
        sqlx::query_as::<_, Resource>(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| DbError::not_found("Resource", id))
    }

    async fn update_resource(
        tx: &mut Transaction<'_, Sqlite>,
        resource: &Resource,
        expected_version: i64,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE resources
            SET consumed = ?1, version = ?2
            WHERE id = ?3 AND version = ?4
            "#,
        )
        .bind(resource.consumed)
        .bind(expected_version + 1)
        .bind(&resource.id)
        .bind(expected_version)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected())
    }

    /// Inserts a claim, copying `exclusive` from the resource's kind so the
    /// partial unique index only covers quota claims.
    async fn insert_claim_tx(tx: &mut Transaction<'_, Sqlite>, claim: &Claim) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO claims (
                id, resource_id, requester_id, quantity, issued_at,
                consumed, consumed_at, version, exclusive
            )
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, kind = 'quota'
            FROM resources
            WHERE id = ?2
            "#,
        )
        .bind(&claim.id)
        .bind(&claim.resource_id)
        .bind(&claim.requester_id)
        .bind(claim.quantity)
        .bind(claim.issued_at)
        .bind(claim.consumed)
        .bind(claim.consumed_at)
        .bind(claim.version)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Resource", &claim.resource_id));
        }

        Ok(())
    }
}

#[async_trait]
impl ResourceStore for SqliteStore {
    async fn read_resource(&self, id: &str) -> DbResult<Resource> {
        let sql = format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE id = ?1");
        sqlx::query_as::<_, Resource>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Resource", id))
    }

    async fn list_resources(&self) -> DbResult<Vec<Resource>> {
        let sql = format!("SELECT {RESOURCE_COLUMNS} FROM resources ORDER BY name, id");
        let resources = sqlx::query_as::<_, Resource>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(resources)
    }

    async fn insert_resource(&self, resource: &Resource) -> DbResult<()> {
        debug!(resource_id = %resource.id, kind = %resource.kind, limit = resource.limit, "Inserting resource");

        sqlx::query(
            r#"
            INSERT INTO resources (
                id, name, kind, unit_limit, consumed, valid_from, valid_until, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&resource.id)
        .bind(&resource.name)
        .bind(resource.kind)
        .bind(resource.limit)
        .bind(resource.consumed)
        .bind(resource.valid_from)
        .bind(resource.valid_until)
        .bind(resource.version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn write_resource_exclusive(
        &self,
        id: &str,
        mutate: ExclusiveMutation,
        claim: Option<Claim>,
    ) -> DbResult<Resource> {
        let lock = self.row_locks.lock_for(id);
        let _row = lock.lock().await;
        trace!(resource_id = %id, "Row lock acquired");

        let mut tx = self.pool.begin().await?;

        let touched = sqlx::query("UPDATE resources SET version = version WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            return Err(DbError::not_found("Resource", id));
        }

        let current = Self::fetch_resource(&mut tx, id).await?;
        self.simulate_io().await;

        let next = mutate(&current)?;

        if Self::update_resource(&mut tx, &next, current.version).await? == 0 {
            return Err(DbError::TransactionFailed(format!(
                "resource {id} changed while exclusively locked"
            )));
        }

        if let Some(claim) = claim {
            Self::insert_claim_tx(&mut tx, &claim).await?;
        }

        tx.commit().await?;

        Ok(Resource {
            version: current.version + 1,
            ..next
        })
    }

    async fn compare_and_write_resource(
        &self,
        id: &str,
        expected_version: i64,
        new_state: &Resource,
        claim: Option<Claim>,
    ) -> DbResult<CasOutcome> {
        self.simulate_io().await;

        let mut tx = self.pool.begin().await?;

        if Self::update_resource(&mut tx, new_state, expected_version).await? == 0 {
            // Distinguish a lost race from a missing row
            Self::fetch_resource(&mut tx, id).await?;
            trace!(resource_id = %id, expected_version, "Version mismatch");
            return Ok(CasOutcome::VersionMismatch);
        }

        if let Some(claim) = claim {
            Self::insert_claim_tx(&mut tx, &claim).await?;
        }

        tx.commit().await?;
        Ok(CasOutcome::Committed)
    }

    async fn read_active_claim(
        &self,
        resource_id: &str,
        requester_id: &str,
    ) -> DbResult<Option<Claim>> {
        let sql = format!(
            "SELECT {CLAIM_COLUMNS} FROM claims \
             WHERE resource_id = ?1 AND requester_id = ?2 AND consumed = 0 \
             ORDER BY issued_at LIMIT 1"
        );
        let claim = sqlx::query_as::<_, Claim>(&sql)
            .bind(resource_id)
            .bind(requester_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(claim)
    }

    async fn insert_claim(&self, claim: &Claim) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_claim_tx(&mut tx, claim).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn read_claim(&self, id: &str) -> DbResult<Claim> {
        let sql = format!("SELECT {CLAIM_COLUMNS} FROM claims WHERE id = ?1");
        sqlx::query_as::<_, Claim>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Claim", id))
    }

    async fn list_active_claims(&self, requester_id: &str) -> DbResult<Vec<Claim>> {
        let sql = format!(
            "SELECT {CLAIM_COLUMNS} FROM claims \
             WHERE requester_id = ?1 AND consumed = 0 \
             ORDER BY issued_at, id"
        );
        let claims = sqlx::query_as::<_, Claim>(&sql)
            .bind(requester_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(claims)
    }

    async fn consume_claim(
        &self,
        id: &str,
        expected_version: i64,
        at: DateTime<Utc>,
    ) -> DbResult<CasOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE claims
            SET consumed = 1, consumed_at = ?1, version = ?2
            WHERE id = ?3 AND version = ?4
            "#,
        )
        .bind(at)
        .bind(expected_version + 1)
        .bind(id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            self.read_claim(id).await?;
            return Ok(CasOutcome::VersionMismatch);
        }

        Ok(CasOutcome::Committed)
    }

    async fn revoke_claim(&self, id: &str) -> DbResult<Resource> {
        let claim = self.read_claim(id).await?;
        let lock = self.row_locks.lock_for(&claim.resource_id);
        let _row = lock.lock().await;

        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM claims WHERE id = ?1 AND consumed = 0")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(DbError::TransactionFailed(format!(
                "claim {id} is consumed and cannot be revoked"
            )));
        }

        let current = Self::fetch_resource(&mut tx, &claim.resource_id).await?;
        self.simulate_io().await;

        let next = current.apply_revoke(claim.quantity)?;
        if Self::update_resource(&mut tx, &next, current.version).await? == 0 {
            return Err(DbError::TransactionFailed(format!(
                "resource {} changed while exclusively locked",
                claim.resource_id
            )));
        }

        tx.commit().await?;
        debug!(claim_id = %id, resource_id = %claim.resource_id, "Claim revoked");

        Ok(Resource {
            version: current.version + 1,
            ..next
        })
    }

    async fn count_claims(&self, resource_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM claims WHERE resource_id = ?1")
            .bind(resource_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn read_rule(&self, id: &str) -> DbResult<DiscountRule> {
        let sql = format!("SELECT {RULE_COLUMNS} FROM discount_rules WHERE id = ?1");
        sqlx::query_as::<_, DiscountRule>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("DiscountRule", id))
    }

    async fn insert_rule(&self, rule: &DiscountRule) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO discount_rules (
                id, name, resource_id, kind, value, min_order_amount,
                max_discount_amount, valid_from, valid_until
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&rule.id)
        .bind(&rule.name)
        .bind(&rule.resource_id)
        .bind(rule.kind)
        .bind(rule.value)
        .bind(rule.min_order_amount)
        .bind(rule.max_discount_amount)
        .bind(rule.valid_from)
        .bind(rule.valid_until)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use allot_core::CapacityError;
    use chrono::Duration as ChronoDuration;

    async fn store() -> SqliteStore {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.store()
    }

    fn claim_one(now: DateTime<Utc>) -> ExclusiveMutation {
        Box::new(move |r: &Resource| r.apply_claim(1, now))
    }

    #[tokio::test]
    async fn test_resource_round_trip() {
        let store = store().await;
        let now = Utc::now();
        let resource = Resource::quota("Launch coupon", 100)
            .with_id("c1")
            .with_window(Some(now - ChronoDuration::days(1)), Some(now + ChronoDuration::days(1)));
        store.insert_resource(&resource).await.unwrap();

        let loaded = store.read_resource("c1").await.unwrap();
        assert_eq!(loaded.limit, 100);
        assert_eq!(loaded.kind, resource.kind);
        assert!(loaded.is_within_window(now));

        assert!(store.insert_resource(&resource).await.unwrap_err().is_unique_violation());
        assert!(store.read_resource("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_exclusive_write_and_unique_violation() {
        let store = store().await;
        let now = Utc::now();
        store
            .insert_resource(&Resource::quota("Coupon", 10).with_id("c1"))
            .await
            .unwrap();

        let next = store
            .write_resource_exclusive("c1", claim_one(now), Some(Claim::issue("c1", "u1", 1, now)))
            .await
            .unwrap();
        assert_eq!((next.consumed, next.version), (1, 1));

        let err = store
            .write_resource_exclusive("c1", claim_one(now), Some(Claim::issue("c1", "u1", 1, now)))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());

        let resource = store.read_resource("c1").await.unwrap();
        assert_eq!(resource.consumed, 1);
        assert_eq!(store.count_claims("c1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_exclusive_write_rejection_rolls_back() {
        let store = store().await;
        let now = Utc::now();
        store
            .insert_resource(&Resource::quota("Empty", 0).with_id("c0"))
            .await
            .unwrap();

        let err = store
            .write_resource_exclusive("c0", claim_one(now), Some(Claim::issue("c0", "u1", 1, now)))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Rejected(CapacityError::Exhausted { .. })));
        assert_eq!(store.count_claims("c0").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_revoke_claim_in_one_transaction() {
        let store = store().await;
        let now = Utc::now();
        store
            .insert_resource(&Resource::quota("Coupon", 1).with_id("c1"))
            .await
            .unwrap();
        let claim = Claim::issue("c1", "u1", 1, now);
        store
            .write_resource_exclusive("c1", claim_one(now), Some(claim.clone()))
            .await
            .unwrap();

        let restored = store.revoke_claim(&claim.id).await.unwrap();
        assert_eq!((restored.consumed, restored.version), (0, 2));
        assert_eq!(store.read_resource("c1").await.unwrap().consumed, 0);
        assert_eq!(store.count_claims("c1").await.unwrap(), 0);
        assert!(store.read_active_claim("c1", "u1").await.unwrap().is_none());

        let second = Claim::issue("c1", "u1", 1, now);
        store
            .write_resource_exclusive("c1", claim_one(now), Some(second.clone()))
            .await
            .unwrap();
        store.consume_claim(&second.id, 0, now).await.unwrap();
        assert!(matches!(
            store.revoke_claim(&second.id).await.unwrap_err(),
            DbError::TransactionFailed(_)
        ));
        assert_eq!(store.read_resource("c1").await.unwrap().consumed, 1);
    }

    #[tokio::test]
    async fn test_compare_and_write() {
        let store = store().await;
        let now = Utc::now();
        store
            .insert_resource(&Resource::stock("Bibimbap", 5).with_id("m1"))
            .await
            .unwrap();

        let current = store.read_resource("m1").await.unwrap();
        let next = current.apply_claim(2, now).unwrap();

        let first = store
            .compare_and_write_resource("m1", current.version, &next, Some(Claim::issue("m1", "u1", 2, now)))
            .await
            .unwrap();
        assert_eq!(first, CasOutcome::Committed);

        let second = store
            .compare_and_write_resource("m1", current.version, &next, Some(Claim::issue("m1", "u2", 2, now)))
            .await
            .unwrap();
        assert_eq!(second, CasOutcome::VersionMismatch);

        let stored = store.read_resource("m1").await.unwrap();
        assert_eq!((stored.consumed, stored.version), (2, 1));
        assert_eq!(store.count_claims("m1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stock_claims_are_not_exclusive() {
        let store = store().await;
        let now = Utc::now();
        store
            .insert_resource(&Resource::stock("Kimchi", 10).with_id("m1"))
            .await
            .unwrap();

        store.insert_claim(&Claim::issue("m1", "u1", 1, now)).await.unwrap();
        store.insert_claim(&Claim::issue("m1", "u1", 1, now)).await.unwrap();
        assert_eq!(store.list_active_claims("u1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_consume_claim_cas() {
        let store = store().await;
        let now = Utc::now();
        store
            .insert_resource(&Resource::quota("Coupon", 10).with_id("c1"))
            .await
            .unwrap();
        let claim = Claim::issue("c1", "u1", 1, now);
        store.insert_claim(&claim).await.unwrap();

        assert_eq!(
            store.consume_claim(&claim.id, 0, now).await.unwrap(),
            CasOutcome::Committed
        );
        assert_eq!(
            store.consume_claim(&claim.id, 0, now).await.unwrap(),
            CasOutcome::VersionMismatch
        );

        let stored = store.read_claim(&claim.id).await.unwrap();
        assert!(stored.consumed);
        assert!(store.read_active_claim("c1", "u1").await.unwrap().is_none());

        // The partial index no longer covers the consumed claim
        store.insert_claim(&Claim::issue("c1", "u1", 1, now)).await.unwrap();
    }

    #[tokio::test]
    async fn test_rules() {
        let store = store().await;
        store
            .insert_resource(&Resource::quota("Coupon", 10).with_id("c1"))
            .await
            .unwrap();

        let rule = DiscountRule::percentage("r1", "10% off", "c1", 10)
            .with_min_order(20_000)
            .with_max_discount(5_000);
        store.insert_rule(&rule).await.unwrap();
        assert_eq!(store.read_rule("r1").await.unwrap(), rule);

        let orphan = DiscountRule::fixed("r2", "orphan", "missing", 1_000);
        assert!(matches!(
            store.insert_rule(&orphan).await,
            Err(DbError::ForeignKeyViolation { .. })
        ));
    }
}
