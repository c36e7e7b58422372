//! # Eligibility Validator
//!
//! Checks that a requester may apply a set of discount rules to an order.
//!
//! ## Check Order (per rule, fail-fast)
//! ```text
//! order_amount >= 0, requester_id present
//!      │
//!      ▼
//! for rule_id in rule_ids:
//!   seen before in this request?  ──► DuplicateRule
//!   rule exists?                  ──► RuleNotFound
//!   active claim on its resource? ──► NotOwned
//!   now in [valid_from, until)?   ──► NotValid
//!   order >= min_order_amount?    ──► BelowMinimum
//! ```
//!
//! The first violation aborts the request; no partial rule list is returned.

use std::collections::HashSet;
use std::sync::Arc;

use allot_core::validation::{validate_identifier, validate_order_amount};
use allot_core::{DiscountRule, Money, QuoteError};
use allot_db::{DbError, ResourceStore};
use chrono::{DateTime, Utc};
use tracing::debug;

fn storage(err: DbError) -> QuoteError {
    QuoteError::Storage(err.to_string())
}

#[derive(Clone)]
pub struct EligibilityValidator {
    store: Arc<dyn ResourceStore>,
}

impl std::fmt::Debug for EligibilityValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EligibilityValidator").finish_non_exhaustive()
    }
}

impl EligibilityValidator {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        EligibilityValidator { store }
    }

    /// Validates against the current time.
    pub async fn validate(
        &self,
        requester_id: &str,
        order_amount: Money,
        rule_ids: &[String],
    ) -> Result<Vec<DiscountRule>, QuoteError> {
        self.validate_at(requester_id, order_amount, rule_ids, Utc::now())
            .await
    }

    /// Returns the rules in request order when every one of them applies.
    pub async fn validate_at(
        &self,
        requester_id: &str,
        order_amount: Money,
        rule_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<DiscountRule>, QuoteError> {
        validate_order_amount(order_amount.minor())?;
        validate_identifier("requester_id", requester_id)?;

        let mut seen = HashSet::with_capacity(rule_ids.len());
        let mut rules = Vec::with_capacity(rule_ids.len());

        for rule_id in rule_ids {
            if !seen.insert(rule_id.as_str()) {
                return Err(QuoteError::DuplicateRule(rule_id.clone()));
            }

            let rule = self.store.read_rule(rule_id).await.map_err(|e| {
                if e.is_not_found() {
                    QuoteError::RuleNotFound(rule_id.clone())
                } else {
                    storage(e)
                }
            })?;

            let owned = self
                .store
                .read_active_claim(&rule.resource_id, requester_id)
                .await
                .map_err(storage)?;
            if owned.is_none() {
                return Err(QuoteError::NotOwned(rule_id.clone()));
            }

            if !rule.is_valid_at(now) {
                return Err(QuoteError::NotValid(rule_id.clone()));
            }

            if !rule.meets_minimum(order_amount) {
                return Err(QuoteError::BelowMinimum {
                    rule_id: rule_id.clone(),
                    required: rule.min_order(),
                    actual: order_amount,
                });
            }

            debug!(requester_id, rule_id = %rule.id, "Rule eligible");
            rules.push(rule);
        }

        Ok(rules)
    }
}
