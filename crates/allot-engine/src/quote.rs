//! # Quote Service
//!
//! Eligibility first, then the pure discount math. Nothing is persisted:
//! a quote never consumes a claim.

use allot_core::{DiscountEngine, DiscountQuote, Money, QuoteError};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::eligibility::EligibilityValidator;

#[derive(Debug, Clone)]
pub struct QuoteService {
    validator: EligibilityValidator,
    engine: DiscountEngine,
}

impl QuoteService {
    pub fn new(validator: EligibilityValidator, engine: DiscountEngine) -> Self {
        QuoteService { validator, engine }
    }

    pub fn engine(&self) -> DiscountEngine {
        self.engine
    }

    pub async fn quote(
        &self,
        requester_id: &str,
        order_amount: Money,
        rule_ids: &[String],
    ) -> Result<DiscountQuote, QuoteError> {
        self.quote_at(requester_id, order_amount, rule_ids, Utc::now())
            .await
    }

    pub async fn quote_at(
        &self,
        requester_id: &str,
        order_amount: Money,
        rule_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<DiscountQuote, QuoteError> {
        let rules = self
            .validator
            .validate_at(requester_id, order_amount, rule_ids, now)
            .await?;
        let quote = self.engine.quote(order_amount, &rules);

        info!(
            requester_id,
            order_amount = %order_amount,
            total_discount = %quote.total_discount,
            final_amount = %quote.final_amount,
            rules = rules.len(),
            clamped = quote.was_clamped(),
            "Quote computed"
        );
        Ok(quote)
    }
}
