//! # Domain Types
//!
//! Core domain types used throughout Allot.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Resource     │   │      Claim      │   │  DiscountRule   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │◄──│  resource_id    │   │  id             │       │
//! │  │  kind           │   │  requester_id   │   │  resource_id ───┼──►    │
//! │  │  limit          │   │  quantity       │   │  kind, value    │       │
//! │  │  consumed       │   │  consumed       │   │  min_order      │       │
//! │  │  version        │   │  version        │   │  max_discount   │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐                             │
//! │  │  ResourceKind   │   │  DiscountKind   │                             │
//! │  │  Quota          │   │  Fixed          │                             │
//! │  │  Stock          │   │  Percentage     │                             │
//! │  └─────────────────┘   └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Pure State Transitions
//! Mutation of a [`Resource`] is expressed as `&self -> Result<Resource, _>`:
//! the storage layer decides *when* the new state is written (under a lock,
//! or via compare-and-swap), this module decides *what* it is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AllocationError, CapacityError};
use crate::money::Money;
use crate::MAX_CLAIM_QUANTITY;

// =============================================================================
// Validity Window
// =============================================================================

/// Returns true if `now` lies in the half-open window `[from, until)`.
///
/// A missing bound is open on that side.
pub fn within_window(
    from: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    from.map_or(true, |start| now >= start) && until.map_or(true, |end| now < end)
}

// =============================================================================
// Resource Kind
// =============================================================================

/// How a resource hands out units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// One active claim per requester; `consumed` only grows (coupons).
    Quota,
    /// Many claims per requester; units can be released back (menu stock).
    Stock,
}

impl ResourceKind {
    /// Whether the store must enforce one active claim per requester.
    #[inline]
    pub const fn one_per_requester(&self) -> bool {
        matches!(self, ResourceKind::Quota)
    }

    /// Whether units may be returned through the release path.
    #[inline]
    pub const fn is_releasable(&self) -> bool {
        matches!(self, ResourceKind::Stock)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Quota => write!(f, "quota"),
            ResourceKind::Stock => write!(f, "stock"),
        }
    }
}

// =============================================================================
// Resource
// =============================================================================

/// A bounded resource: a coupon quota or an item's stock count.
///
/// ## Invariants
/// - `0 <= consumed <= limit`
/// - `version` grows by exactly one on every committed write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Resource {
    /// Opaque identifier.
    pub id: String,

    /// Display name (coupon title, menu item name).
    pub name: String,

    pub kind: ResourceKind,

    /// Total units available, fixed at creation.
    #[cfg_attr(feature = "sqlx", sqlx(rename = "unit_limit"))]
    pub limit: i64,

    /// Units already claimed.
    #[serde(default)]
    pub consumed: i64,

    pub valid_from: Option<DateTime<Utc>>,

    pub valid_until: Option<DateTime<Utc>>,

    /// Optimistic concurrency token.
    #[serde(default)]
    pub version: i64,
}

impl Resource {
    /// Creates a resource with a generated id and no validity window.
    pub fn new(name: impl Into<String>, kind: ResourceKind, limit: i64) -> Self {
        Resource {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            kind,
            limit,
            consumed: 0,
            valid_from: None,
            valid_until: None,
            version: 0,
        }
    }

    /// Creates a one-per-requester quota (a first-come coupon).
    pub fn quota(name: impl Into<String>, limit: i64) -> Self {
        Self::new(name, ResourceKind::Quota, limit)
    }

    /// Creates a stock counter (a menu item).
    pub fn stock(name: impl Into<String>, limit: i64) -> Self {
        Self::new(name, ResourceKind::Stock, limit)
    }

    /// Replaces the generated id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Restricts claims to `[from, until)`.
    pub fn with_window(
        mut self,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Self {
        self.valid_from = from;
        self.valid_until = until;
        self
    }

    /// Units still available.
    #[inline]
    pub fn remaining(&self) -> i64 {
        self.limit - self.consumed
    }

    #[inline]
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        within_window(self.valid_from, self.valid_until, now)
    }

    /// True when at least one unit could be claimed at `now`.
    pub fn can_issue(&self, now: DateTime<Utc>) -> bool {
        self.is_within_window(now) && self.remaining() > 0
    }

    /// The shared capacity check for both locking strategies.
    ///
    /// ## Check Order
    /// ```text
    /// amount in 1..=999? ── no ──► InvalidQuantity
    ///      │ yes
    ///      ▼
    /// now in [valid_from, valid_until)? ── no ──► OutOfWindow
    ///      │ yes
    ///      ▼
    /// consumed + amount <= limit? ── no ──► Exhausted
    ///      │ yes
    ///      ▼
    /// Ok(next state: consumed + amount, version + 1)
    /// ```
    pub fn apply_claim(&self, amount: i64, now: DateTime<Utc>) -> Result<Resource, CapacityError> {
        if amount <= 0 || amount > MAX_CLAIM_QUANTITY {
            return Err(CapacityError::InvalidQuantity { requested: amount });
        }

        if !self.is_within_window(now) {
            return Err(CapacityError::OutOfWindow {
                resource_id: self.id.clone(),
            });
        }

        if amount > self.remaining() {
            return Err(CapacityError::Exhausted {
                resource_id: self.id.clone(),
                remaining: self.remaining(),
                requested: amount,
            });
        }

        Ok(Resource {
            consumed: self.consumed + amount,
            version: self.version + 1,
            ..self.clone()
        })
    }

    /// Returns `amount` units to a stock resource (refund/cancel path).
    pub fn apply_release(&self, amount: i64) -> Result<Resource, CapacityError> {
        if !self.kind.is_releasable() {
            return Err(CapacityError::NotReleasable {
                resource_id: self.id.clone(),
            });
        }

        self.apply_revoke(amount)
    }

    /// Hands back `amount` units of a claim that is being undone.
    ///
    /// Unlike [`apply_release`](Self::apply_release) this works on quotas
    /// too: the units were never really given out.
    pub fn apply_revoke(&self, amount: i64) -> Result<Resource, CapacityError> {
        if amount <= 0 || amount > MAX_CLAIM_QUANTITY {
            return Err(CapacityError::InvalidQuantity { requested: amount });
        }

        if amount > self.consumed {
            return Err(CapacityError::ReleaseExceedsConsumed {
                resource_id: self.id.clone(),
                consumed: self.consumed,
                requested: amount,
            });
        }

        Ok(Resource {
            consumed: self.consumed - amount,
            version: self.version + 1,
            ..self.clone()
        })
    }
}

// =============================================================================
// Claim
// =============================================================================

/// A grant of units of one resource to one requester.
///
/// Created atomically with the resource mutation. After that only
/// `consumed`/`consumed_at` ever change, once, guarded by `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Claim {
    pub id: String,
    pub resource_id: String,
    pub requester_id: String,
    pub quantity: i64,
    pub issued_at: DateTime<Utc>,
    /// Whether the claim has been used (coupon redeemed).
    pub consumed: bool,
    pub consumed_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl Claim {
    /// Builds a fresh, unconsumed claim.
    pub fn issue(
        resource_id: impl Into<String>,
        requester_id: impl Into<String>,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Claim {
            id: Uuid::new_v4().to_string(),
            resource_id: resource_id.into(),
            requester_id: requester_id.into(),
            quantity,
            issued_at: now,
            consumed: false,
            consumed_at: None,
            version: 0,
        }
    }

    /// Active means not yet consumed.
    #[inline]
    pub fn is_active(&self) -> bool {
        !self.consumed
    }

    /// Returns the consumed form of this claim.
    pub fn consume(&self, now: DateTime<Utc>) -> Result<Claim, AllocationError> {
        if self.consumed {
            return Err(AllocationError::AlreadyConsumed(self.id.clone()));
        }

        Ok(Claim {
            consumed: true,
            consumed_at: Some(now),
            version: self.version + 1,
            ..self.clone()
        })
    }
}

// =============================================================================
// Order Line
// =============================================================================

/// One line of a multi-resource order: `quantity` units of `resource_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub resource_id: String,
    pub quantity: i64,
}

impl OrderLine {
    pub fn new(resource_id: impl Into<String>, quantity: i64) -> Self {
        OrderLine {
            resource_id: resource_id.into(),
            quantity,
        }
    }
}

// =============================================================================
// Discount Rule
// =============================================================================

/// How a rule's `value` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    /// `value` is an absolute amount off (e.g. 3000 off).
    Fixed,
    /// `value` is percentage points off (e.g. 10 = 10%).
    Percentage,
}

/// A named, time-bounded, amount-bounded discount definition.
///
/// ## Ownership
/// A requester may apply a rule only while holding an active claim on
/// `resource_id`. For a plain coupon the rule and its quota share an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DiscountRule {
    pub id: String,
    pub name: String,
    /// The quota whose claim grants the right to use this rule.
    pub resource_id: String,
    pub kind: DiscountKind,
    /// Absolute amount (Fixed) or percentage points (Percentage).
    pub value: i64,
    #[serde(default)]
    pub min_order_amount: i64,
    /// Cap on the computed amount; Percentage only.
    pub max_discount_amount: Option<i64>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

impl DiscountRule {
    fn base(
        id: impl Into<String>,
        name: impl Into<String>,
        resource_id: impl Into<String>,
        kind: DiscountKind,
        value: i64,
    ) -> Self {
        DiscountRule {
            id: id.into(),
            name: name.into(),
            resource_id: resource_id.into(),
            kind,
            value,
            min_order_amount: 0,
            max_discount_amount: None,
            valid_from: None,
            valid_until: None,
        }
    }

    /// A fixed amount off.
    pub fn fixed(
        id: impl Into<String>,
        name: impl Into<String>,
        resource_id: impl Into<String>,
        amount: i64,
    ) -> Self {
        Self::base(id, name, resource_id, DiscountKind::Fixed, amount)
    }

    /// A percentage off, in whole percentage points.
    pub fn percentage(
        id: impl Into<String>,
        name: impl Into<String>,
        resource_id: impl Into<String>,
        percent: i64,
    ) -> Self {
        Self::base(id, name, resource_id, DiscountKind::Percentage, percent)
    }

    pub fn with_min_order(mut self, amount: i64) -> Self {
        self.min_order_amount = amount;
        self
    }

    pub fn with_max_discount(mut self, cap: i64) -> Self {
        self.max_discount_amount = Some(cap);
        self
    }

    pub fn with_window(
        mut self,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Self {
        self.valid_from = from;
        self.valid_until = until;
        self
    }

    /// Minimum order amount as Money.
    #[inline]
    pub fn min_order(&self) -> Money {
        Money::from_minor(self.min_order_amount)
    }

    /// Discount cap as Money, if any.
    #[inline]
    pub fn max_discount(&self) -> Option<Money> {
        self.max_discount_amount.map(Money::from_minor)
    }

    #[inline]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        within_window(self.valid_from, self.valid_until, now)
    }

    #[inline]
    pub fn meets_minimum(&self, order_amount: Money) -> bool {
        order_amount >= self.min_order()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_within_window_is_half_open() {
        let now = Utc::now();
        assert!(within_window(None, None, now));
        assert!(within_window(Some(now), None, now));
        assert!(!within_window(None, Some(now), now));
        assert!(!within_window(Some(now + Duration::seconds(1)), None, now));
        assert!(within_window(
            Some(now - Duration::days(1)),
            Some(now + Duration::days(1)),
            now
        ));
    }

    #[test]
    fn test_apply_claim_bumps_consumed_and_version() {
        let resource = Resource::quota("Welcome coupon", 2).with_id("c1");
        let now = Utc::now();

        let next = resource.apply_claim(1, now).unwrap();
        assert_eq!(next.consumed, 1);
        assert_eq!(next.version, 1);
        assert_eq!(next.id, "c1");

        let last = next.apply_claim(1, now).unwrap();
        assert_eq!(last.remaining(), 0);

        let err = last.apply_claim(1, now).unwrap_err();
        assert_eq!(
            err,
            CapacityError::Exhausted {
                resource_id: "c1".to_string(),
                remaining: 0,
                requested: 1,
            }
        );
    }

    #[test]
    fn test_apply_claim_respects_window() {
        let now = Utc::now();
        let expired = Resource::quota("Old", 10)
            .with_id("old")
            .with_window(Some(now - Duration::days(2)), Some(now - Duration::days(1)));
        assert!(matches!(
            expired.apply_claim(1, now),
            Err(CapacityError::OutOfWindow { .. })
        ));

        let upcoming = Resource::quota("Soon", 10)
            .with_window(Some(now + Duration::hours(1)), None);
        assert!(!upcoming.can_issue(now));
    }

    #[test]
    fn test_apply_claim_rejects_bad_quantity() {
        let stock = Resource::stock("Bibimbap", 10);
        let now = Utc::now();
        assert!(matches!(
            stock.apply_claim(0, now),
            Err(CapacityError::InvalidQuantity { requested: 0 })
        ));
        assert!(matches!(
            stock.apply_claim(1000, now),
            Err(CapacityError::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn test_apply_release_only_for_stock() {
        let now = Utc::now();
        let stock = Resource::stock("Bibimbap", 10).apply_claim(3, now).unwrap();

        let released = stock.apply_release(2).unwrap();
        assert_eq!(released.consumed, 1);
        assert_eq!(released.version, 2);

        assert!(matches!(
            released.apply_release(2),
            Err(CapacityError::ReleaseExceedsConsumed { consumed: 1, .. })
        ));

        let quota = Resource::quota("Coupon", 10).apply_claim(1, now).unwrap();
        assert!(matches!(
            quota.apply_release(1),
            Err(CapacityError::NotReleasable { .. })
        ));
    }

    #[test]
    fn test_apply_revoke_works_on_quotas() {
        let quota = Resource::quota("Coupon", 10).apply_claim(1, Utc::now()).unwrap();

        let revoked = quota.apply_revoke(1).unwrap();
        assert_eq!(revoked.consumed, 0);
        assert_eq!(revoked.version, 2);
        assert!(matches!(
            revoked.apply_revoke(1),
            Err(CapacityError::ReleaseExceedsConsumed { consumed: 0, .. })
        ));
    }

    #[test]
    fn test_claim_consume_once() {
        let now = Utc::now();
        let claim = Claim::issue("c1", "u1", 1, now);
        assert!(claim.is_active());

        let used = claim.consume(now).unwrap();
        assert!(!used.is_active());
        assert_eq!(used.version, 1);
        assert_eq!(used.consumed_at, Some(now));

        assert!(matches!(
            used.consume(now),
            Err(AllocationError::AlreadyConsumed(_))
        ));
    }

    #[test]
    fn test_rule_builders() {
        let rule = DiscountRule::percentage("r1", "10% off", "c1", 10)
            .with_min_order(20_000)
            .with_max_discount(5_000);
        assert_eq!(rule.kind, DiscountKind::Percentage);
        assert_eq!(rule.max_discount(), Some(Money::from_minor(5_000)));
        assert!(rule.meets_minimum(Money::from_minor(20_000)));
        assert!(!rule.meets_minimum(Money::from_minor(19_999)));
    }

    #[test]
    fn test_kind_serialization() {
        assert_eq!(serde_json::to_string(&ResourceKind::Quota).unwrap(), "\"quota\"");
        assert_eq!(
            serde_json::to_string(&DiscountKind::Percentage).unwrap(),
            "\"percentage\""
        );
    }
}
