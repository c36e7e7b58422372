//! # Seed Data
//!
//! Fixture resources and discount rules for development and demos.
//!
//! ## File Format
//! ```toml
//! [[resources]]
//! id = "welcome"
//! name = "Welcome coupon"
//! kind = "quota"
//! limit = 100
//!
//! [[rules]]
//! id = "welcome-3000"
//! name = "3000 off"
//! resource_id = "welcome"
//! kind = "fixed"
//! value = 3000
//! min_order_amount = 15000
//! ```
//!
//! Every entry is validated before anything is written. Resources are
//! inserted before rules so rule foreign keys resolve.

use allot_core::validation::{validate_resource, validate_rule};
use allot_core::{DiscountRule, Resource};
use allot_db::ResourceStore;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SeedError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub rules: Vec<DiscountRule>,
}

/// What a seed run wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub resources: usize,
    pub rules: usize,
}

impl SeedData {
    /// Two coupons with matching rules and one stock item.
    pub fn demo() -> Self {
        SeedData {
            resources: vec![
                Resource::quota("Welcome coupon", 100).with_id("welcome"),
                Resource::quota("Ten percent coupon", 50).with_id("ten-percent"),
                Resource::stock("Lunch set", 20).with_id("lunch-set"),
            ],
            rules: vec![
                DiscountRule::fixed("welcome-3000", "3000 off", "welcome", 3_000)
                    .with_min_order(15_000),
                DiscountRule::percentage("ten-percent", "10% off, up to 5000", "ten-percent", 10)
                    .with_max_discount(5_000),
            ],
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, SeedError> {
        toml::from_str(content).map_err(|e| SeedError::Parse(e.to_string()))
    }

    /// Checks every entry without touching a store.
    pub fn validate(&self) -> Result<(), SeedError> {
        for resource in &self.resources {
            validate_resource(resource).map_err(|source| SeedError::Invalid {
                id: resource.id.clone(),
                source,
            })?;
        }
        for rule in &self.rules {
            validate_rule(rule).map_err(|source| SeedError::Invalid {
                id: rule.id.clone(),
                source,
            })?;
        }
        Ok(())
    }

    pub async fn apply(&self, store: &dyn ResourceStore) -> Result<SeedSummary, SeedError> {
        self.validate()?;

        for resource in &self.resources {
            store.insert_resource(resource).await?;
        }
        for rule in &self.rules {
            store.insert_rule(rule).await?;
        }

        let summary = SeedSummary {
            resources: self.resources.len(),
            rules: self.rules.len(),
        };
        info!(resources = summary.resources, rules = summary.rules, "Seed data applied");
        Ok(summary)
    }
}
