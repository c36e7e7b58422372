//! # Discount Engine
//!
//! Computes an itemized, capped quote for a set of already-validated rules.
//!
//! ## Algorithm
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  order_amount = 50,000                                                  │
//! │                                                                         │
//! │  rule A: FIXED 3,000            → min(3,000, 50,000)        =  3,000   │
//! │  rule B: 10%, cap 2,000         → min(floor(5,000), 2,000)  =  2,000   │
//! │                                   ─────────────────────────────────     │
//! │  total = Σ applied              →                              5,000   │
//! │  total = min(total, order)      →                              5,000   │
//! │  final = order - total          →                             45,000   │
//! │                                                                         │
//! │  Every rule is computed against the ORIGINAL order amount, so the      │
//! │  order in which rules are listed never changes the total.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Per-Rule Amounts Are Not Rescaled
//! When the sum exceeds the order amount only the total is clamped; each
//! `applied_amount` still reports what its rule computed. Consumers that
//! need line items summing to the total must prorate themselves.
//!
//! The engine performs no eligibility checks. Ownership, windows and
//! minimums are the caller's job (see `allot-engine`'s EligibilityValidator).

use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::types::{DiscountKind, DiscountRule};

// =============================================================================
// Stacking Order
// =============================================================================

/// Order in which applied discounts are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackingOrder {
    /// Rules are reported in the order the caller supplied them.
    #[default]
    InputOrder,
    /// Largest applied amount first; ties keep input order.
    HighestFirst,
}

// =============================================================================
// Quote Output
// =============================================================================

/// One rule's contribution to a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDiscount {
    pub rule_id: String,
    pub name: String,
    /// What this rule computed on its own, before the aggregate clamp.
    pub applied_amount: Money,
}

/// Itemized result of applying a set of rules to an order amount.
///
/// ## Invariants
/// - `final_amount == original_amount - total_discount`
/// - `0 <= total_discount <= original_amount`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountQuote {
    pub original_amount: Money,
    pub total_discount: Money,
    pub final_amount: Money,
    pub applied: Vec<AppliedDiscount>,
}

impl DiscountQuote {
    /// A quote with nothing applied.
    pub fn undiscounted(order_amount: Money) -> Self {
        DiscountQuote {
            original_amount: order_amount,
            total_discount: Money::zero(),
            final_amount: order_amount,
            applied: Vec::new(),
        }
    }

    /// True when the raw per-rule sum was larger than the order.
    pub fn was_clamped(&self) -> bool {
        let raw: Money = self.applied.iter().map(|a| a.applied_amount).sum();
        raw > self.total_discount
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Pure discount calculator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscountEngine {
    stacking: StackingOrder,
}

impl DiscountEngine {
    pub fn new(stacking: StackingOrder) -> Self {
        DiscountEngine { stacking }
    }

    pub fn stacking(&self) -> StackingOrder {
        self.stacking
    }

    /// Amount a single rule takes off `order_amount`.
    ///
    /// - FIXED: `min(value, order_amount)`
    /// - PERCENTAGE: `floor(order_amount * value / 100)`, then `min(.., cap)`
    pub fn rule_amount(order_amount: Money, rule: &DiscountRule) -> Money {
        let amount = match rule.kind {
            DiscountKind::Fixed => Money::from_minor(rule.value).min(order_amount),
            DiscountKind::Percentage => {
                let raw = order_amount.percentage_floor(rule.value);
                match rule.max_discount() {
                    Some(cap) => raw.min(cap),
                    None => raw,
                }
            }
        };
        amount.max(Money::zero())
    }

    /// Builds the quote for `rules` against `order_amount`.
    ///
    /// ## Example
    /// ```rust
    /// use allot_core::{DiscountEngine, DiscountRule, Money};
    ///
    /// let rules = [
    ///     DiscountRule::fixed("a", "3000 off", "c-a", 3_000),
    ///     DiscountRule::percentage("b", "10% off", "c-b", 10).with_max_discount(2_000),
    /// ];
    /// let quote = DiscountEngine::default().quote(Money::from_minor(50_000), &rules);
    /// assert_eq!(quote.total_discount.minor(), 5_000);
    /// assert_eq!(quote.final_amount.minor(), 45_000);
    /// ```
    pub fn quote(&self, order_amount: Money, rules: &[DiscountRule]) -> DiscountQuote {
        let mut applied: Vec<AppliedDiscount> = rules
            .iter()
            .map(|rule| AppliedDiscount {
                rule_id: rule.id.clone(),
                name: rule.name.clone(),
                applied_amount: Self::rule_amount(order_amount, rule),
            })
            .collect();

        if self.stacking == StackingOrder::HighestFirst {
            // sort_by is stable, so equal amounts keep input order
            applied.sort_by(|a, b| b.applied_amount.cmp(&a.applied_amount));
        }

        // Each item is at most order_amount, but several can still exceed i64
        let raw_total: Money = applied.iter().map(|a| a.applied_amount).sum();
        let total_discount = raw_total.min(order_amount.max(Money::zero()));

        DiscountQuote {
            original_amount: order_amount,
            total_discount,
            final_amount: order_amount - total_discount,
            applied,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn m(v: i64) -> Money {
        Money::from_minor(v)
    }

    #[test]
    fn test_fixed_discount() {
        let rules = [DiscountRule::fixed("r1", "3000 off", "c1", 3_000)];
        let quote = DiscountEngine::default().quote(m(20_000), &rules);

        assert_eq!(quote.total_discount, m(3_000));
        assert_eq!(quote.final_amount, m(17_000));
        assert_eq!(quote.applied.len(), 1);
        assert_eq!(quote.applied[0].applied_amount, m(3_000));
    }

    #[test]
    fn test_percentage_with_cap() {
        let rules = [DiscountRule::percentage("r1", "10% off", "c1", 10).with_max_discount(5_000)];
        let quote = DiscountEngine::default().quote(m(100_000), &rules);

        assert_eq!(quote.total_discount, m(5_000));
        assert_eq!(quote.final_amount, m(95_000));
    }

    #[test]
    fn test_percentage_floors() {
        let rules = [DiscountRule::percentage("r1", "15% off", "c1", 15)];
        let quote = DiscountEngine::default().quote(m(999), &rules);
        // 999 * 15 / 100 = 149.85
        assert_eq!(quote.total_discount, m(149));
    }

    #[test]
    fn test_stacking_against_original_amount() {
        let rules = [
            DiscountRule::fixed("a", "3000 off", "ca", 3_000),
            DiscountRule::percentage("b", "10% off", "cb", 10).with_max_discount(2_000),
        ];
        let quote = DiscountEngine::default().quote(m(50_000), &rules);

        assert_eq!(quote.total_discount, m(5_000));
        assert_eq!(quote.final_amount, m(45_000));
        assert_eq!(quote.applied[0].rule_id, "a");
        assert_eq!(quote.applied[1].rule_id, "b");
    }

    #[test]
    fn test_total_clamped_but_items_reported_unclamped() {
        let rules = [
            DiscountRule::fixed("a", "a", "ca", 8_000),
            DiscountRule::fixed("b", "b", "cb", 5_000),
        ];
        let quote = DiscountEngine::default().quote(m(10_000), &rules);

        assert_eq!(quote.total_discount, m(10_000));
        assert_eq!(quote.final_amount, m(0));
        assert_eq!(quote.applied[0].applied_amount, m(8_000));
        assert_eq!(quote.applied[1].applied_amount, m(5_000));
        assert!(quote.was_clamped());
    }

    #[test]
    fn test_fixed_larger_than_order_is_capped_at_order() {
        let rules = [DiscountRule::fixed("a", "a", "ca", 150_000)];
        let quote = DiscountEngine::default().quote(m(40_000), &rules);

        assert_eq!(quote.applied[0].applied_amount, m(40_000));
        assert_eq!(quote.final_amount, m(0));
        assert!(!quote.was_clamped());
    }

    #[test]
    fn test_empty_rules() {
        let quote = DiscountEngine::default().quote(m(12_000), &[]);
        assert_eq!(quote, DiscountQuote::undiscounted(m(12_000)));
    }

    #[test]
    fn test_zero_order_amount() {
        let rules = [
            DiscountRule::fixed("a", "a", "ca", 1_000),
            DiscountRule::percentage("b", "b", "cb", 50),
        ];
        let quote = DiscountEngine::default().quote(m(0), &rules);
        assert_eq!(quote.total_discount, m(0));
        assert_eq!(quote.final_amount, m(0));
    }

    #[test]
    fn test_highest_first_reorders_without_changing_totals() {
        let rules = [
            DiscountRule::fixed("small", "small", "c1", 1_000),
            DiscountRule::percentage("big", "big", "c2", 20),
            DiscountRule::fixed("tie", "tie", "c3", 1_000),
        ];
        let input = DiscountEngine::default().quote(m(50_000), &rules);
        let highest = DiscountEngine::new(StackingOrder::HighestFirst).quote(m(50_000), &rules);

        let order: Vec<&str> = highest.applied.iter().map(|a| a.rule_id.as_str()).collect();
        assert_eq!(order, vec!["big", "small", "tie"]);
        assert_eq!(input.total_discount, highest.total_discount);
        assert_eq!(input.final_amount, highest.final_amount);
    }

    #[test]
    fn test_randomized_quote_invariants() {
        let mut rng = rand::thread_rng();

        for _ in 0..500 {
            let order = m(rng.gen_range(0..1_000_000));
            let count = rng.gen_range(0..6);
            let rules: Vec<DiscountRule> = (0..count)
                .map(|i| {
                    let id = format!("r{i}");
                    if rng.gen_bool(0.5) {
                        DiscountRule::fixed(id.clone(), id, "c", rng.gen_range(1..500_000))
                    } else {
                        let rule =
                            DiscountRule::percentage(id.clone(), id, "c", rng.gen_range(1..=100));
                        if rng.gen_bool(0.5) {
                            rule.with_max_discount(rng.gen_range(1..100_000))
                        } else {
                            rule
                        }
                    }
                })
                .collect();

            let quote = DiscountEngine::default().quote(order, &rules);
            assert!(quote.total_discount >= Money::zero());
            assert!(quote.total_discount <= order);
            assert_eq!(quote.final_amount, order - quote.total_discount);
            assert!(quote.final_amount >= Money::zero());
            assert_eq!(quote.applied.len(), rules.len());

            let mut reversed = rules.clone();
            reversed.reverse();
            let flipped = DiscountEngine::default().quote(order, &reversed);
            assert_eq!(flipped.total_discount, quote.total_discount);
        }
    }

    #[test]
    fn test_huge_amounts_clamp_without_overflow() {
        let mut rng = rand::thread_rng();

        for _ in 0..200 {
            let order = m(rng.gen_range(i64::MAX / 2..=i64::MAX));
            let count = rng.gen_range(2..6);
            let rules: Vec<DiscountRule> = (0..count)
                .map(|i| {
                    let id = format!("r{i}");
                    if rng.gen_bool(0.5) {
                        DiscountRule::fixed(id.clone(), id, "c", rng.gen_range(i64::MAX / 2..=i64::MAX))
                    } else {
                        DiscountRule::percentage(id.clone(), id, "c", rng.gen_range(60..=100))
                    }
                })
                .collect();

            let quote = DiscountEngine::default().quote(order, &rules);
            assert_eq!(quote.total_discount, order);
            assert_eq!(quote.final_amount, Money::zero());
        }

        let rules = [
            DiscountRule::fixed("a", "a", "ca", 5_000_000_000_000_000_000),
            DiscountRule::fixed("b", "b", "cb", 5_000_000_000_000_000_000),
        ];
        let quote = DiscountEngine::default().quote(m(6_000_000_000_000_000_000), &rules);
        assert_eq!(quote.total_discount, m(6_000_000_000_000_000_000));
        assert_eq!(quote.final_amount, m(0));
    }
}
