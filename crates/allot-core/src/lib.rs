//! # allot-core: Pure Business Logic for Allot
//!
//! This crate is the **heart** of Allot. It contains the capacity rules for
//! bounded resources and the discount stacking math as pure functions with
//! zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Allot Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    allot-cli (or any caller)                    │   │
//! │  │        allocate ──► quote ──► simulate ──► claims              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    allot-engine                                 │   │
//! │  │    ResourceLedger, AllocationCoordinator, EligibilityValidator │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ allot-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │ discount  │  │ validation│  │   │
//! │  │   │ Resource  │  │   Money   │  │  Engine   │  │   rules   │  │   │
//! │  │   │  Claim    │  │  floor %  │  │  Quote    │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO LOCKS • NO SLEEPS • PURE FUNCTIONS               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    allot-db (Storage Layer)                     │   │
//! │  │         MemoryStore, SqliteStore, migrations                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain entities (Resource, Claim, DiscountRule)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`discount`] - The discount engine and its quote output
//! - [`error`] - Domain error types
//! - [`validation`] - Input and rule validation
//!
//! ## Example Usage
//!
//! ```rust
//! use allot_core::discount::DiscountEngine;
//! use allot_core::money::Money;
//! use allot_core::types::DiscountRule;
//!
//! let rule = DiscountRule::percentage("r-10", "Ten percent", "coupon-1", 10)
//!     .with_max_discount(5_000)
//!     .with_min_order(20_000);
//!
//! let quote = DiscountEngine::default().quote(Money::from_minor(50_000), &[rule]);
//! assert_eq!(quote.total_discount.minor(), 5_000);
//! assert_eq!(quote.final_amount.minor(), 45_000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod discount;
pub mod error;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use discount::{AppliedDiscount, DiscountEngine, DiscountQuote, StackingOrder};
pub use error::{
    AllocationError, AllocationResult, CapacityError, QuoteError, ValidationError, VersionConflict,
};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum units a single claim may take.
///
/// ## Business Reason
/// Mirrors the per-line cap on order quantities; prevents a typo from
/// draining a stock resource in one request.
pub const MAX_CLAIM_QUANTITY: i64 = 999;

/// Maximum length of any opaque identifier (resource, requester, rule).
pub const MAX_IDENTIFIER_LEN: usize = 64;
