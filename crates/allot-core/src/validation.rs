//! # Validation Module
//!
//! Input validation for resources, discount rules and request parameters.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller (CLI / service boundary)                              │
//! │  ├── Type validation (clap parsing, serde deserialization)             │
//! │  └── THIS MODULE: identifiers, quantities, amounts                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Engine                                                        │
//! │  ├── THIS MODULE: rule and resource shape before insert                │
//! │  └── Capacity check (Resource::apply_claim)                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (consumed BETWEEN 0 AND unit_limit)                         │
//! │  └── Partial UNIQUE index on active quota claims                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use allot_core::validation::{validate_identifier, validate_quantity};
//!
//! validate_identifier("requester_id", "user-42").unwrap();
//! validate_quantity(5).unwrap();
//! ```

use chrono::{DateTime, Utc};

use crate::error::ValidationError;
use crate::types::{DiscountKind, DiscountRule, Resource};
use crate::{MAX_CLAIM_QUANTITY, MAX_IDENTIFIER_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates an opaque identifier (resource, requester, rule, claim).
///
/// ## Rules
/// - Must not be empty or whitespace
/// - At most [`MAX_IDENTIFIER_LEN`] characters
///
/// ## Example
/// ```rust
/// use allot_core::validation::validate_identifier;
///
/// assert!(validate_identifier("resource_id", "coupon-1").is_ok());
/// assert!(validate_identifier("resource_id", "  ").is_err());
/// ```
pub fn validate_identifier(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > MAX_IDENTIFIER_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_IDENTIFIER_LEN,
        });
    }

    Ok(())
}

/// Validates a display name.
pub fn validate_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.chars().count() > 200 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a claim quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_CLAIM_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_CLAIM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_CLAIM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates an order amount in minor units. Zero is allowed.
///
/// ## Example
/// ```rust
/// use allot_core::validation::validate_order_amount;
///
/// assert!(validate_order_amount(0).is_ok());
/// assert!(validate_order_amount(-1).is_err());
/// ```
pub fn validate_order_amount(amount: i64) -> ValidationResult<()> {
    if amount < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "order_amount".to_string(),
        });
    }

    Ok(())
}

fn validate_window(
    field: &str,
    from: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
) -> ValidationResult<()> {
    if let (Some(start), Some(end)) = (from, until) {
        if start >= end {
            return Err(ValidationError::InvalidFormat {
                field: field.to_string(),
                reason: "valid_from must be before valid_until".to_string(),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Entity Validators
// =============================================================================

/// Validates a resource before it is stored.
///
/// ## Rules
/// - Identifier and name present
/// - `limit >= 0`
/// - `0 <= consumed <= limit`
/// - `valid_from < valid_until` when both are set
pub fn validate_resource(resource: &Resource) -> ValidationResult<()> {
    validate_identifier("resource_id", &resource.id)?;
    validate_name(&resource.name)?;

    if resource.limit < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "limit".to_string(),
        });
    }

    if resource.consumed < 0 || resource.consumed > resource.limit {
        return Err(ValidationError::OutOfRange {
            field: "consumed".to_string(),
            min: 0,
            max: resource.limit,
        });
    }

    validate_window("window", resource.valid_from, resource.valid_until)
}

/// Validates a discount rule before it is stored.
///
/// ## Rules
/// ```text
/// value > 0                         (both kinds)
/// value <= 100                      (Percentage)
/// min_order_amount >= 0
/// max_discount_amount > 0           (when set)
/// max_discount_amount only on Percentage
/// valid_from < valid_until          (when both set)
/// ```
pub fn validate_rule(rule: &DiscountRule) -> ValidationResult<()> {
    validate_identifier("rule_id", &rule.id)?;
    validate_identifier("resource_id", &rule.resource_id)?;
    validate_name(&rule.name)?;

    if rule.value <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "value".to_string(),
        });
    }

    if rule.kind == DiscountKind::Percentage && rule.value > 100 {
        return Err(ValidationError::OutOfRange {
            field: "value".to_string(),
            min: 1,
            max: 100,
        });
    }

    if rule.min_order_amount < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "min_order_amount".to_string(),
        });
    }

    if let Some(cap) = rule.max_discount_amount {
        if rule.kind == DiscountKind::Fixed {
            return Err(ValidationError::InvalidFormat {
                field: "max_discount_amount".to_string(),
                reason: "only percentage rules carry a cap".to_string(),
            });
        }
        if cap <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "max_discount_amount".to_string(),
            });
        }
    }

    validate_window("window", rule.valid_from, rule.valid_until)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("id", "coupon-1").is_ok());
        assert!(validate_identifier("id", &"a".repeat(MAX_IDENTIFIER_LEN)).is_ok());

        assert_eq!(
            validate_identifier("requester_id", ""),
            Err(ValidationError::Required {
                field: "requester_id".to_string()
            })
        );
        assert!(validate_identifier("id", &"a".repeat(MAX_IDENTIFIER_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_resource() {
        assert!(validate_resource(&Resource::quota("Coupon", 100)).is_ok());
        assert!(validate_resource(&Resource::stock("Empty shelf", 0)).is_ok());
        assert!(validate_resource(&Resource::quota("Bad", -1)).is_err());

        let mut over = Resource::stock("Over", 5);
        over.consumed = 6;
        assert!(validate_resource(&over).is_err());

        let now = Utc::now();
        let backwards = Resource::quota("Backwards", 5).with_window(Some(now), Some(now));
        assert!(validate_resource(&backwards).is_err());
    }

    #[test]
    fn test_validate_rule_percentage_bounds() {
        assert!(validate_rule(&DiscountRule::percentage("r", "p", "c", 100)).is_ok());
        assert!(validate_rule(&DiscountRule::percentage("r", "p", "c", 101)).is_err());
        assert!(validate_rule(&DiscountRule::percentage("r", "p", "c", 0)).is_err());
        assert!(validate_rule(
            &DiscountRule::percentage("r", "p", "c", 10).with_max_discount(0)
        )
        .is_err());
    }

    #[test]
    fn test_validate_rule_fixed() {
        assert!(validate_rule(&DiscountRule::fixed("r", "f", "c", 150_000)).is_ok());
        assert!(validate_rule(&DiscountRule::fixed("r", "f", "c", -5)).is_err());
        assert!(validate_rule(&DiscountRule::fixed("r", "f", "c", 100).with_min_order(-1)).is_err());
        assert!(matches!(
            validate_rule(&DiscountRule::fixed("r", "f", "c", 100).with_max_discount(50)),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_validate_rule_window() {
        let now = Utc::now();
        let rule = DiscountRule::fixed("r", "f", "c", 100)
            .with_window(Some(now + Duration::days(1)), Some(now));
        assert!(validate_rule(&rule).is_err());
    }
}
