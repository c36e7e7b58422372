//! # allot-engine: Allocation and Quoting Services
//!
//! Decides who gets a unit of a bounded resource and what a set of
//! discount rules is worth. Storage is reached only through
//! [`allot_db::ResourceStore`].
//!
//! ## Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Engine Overview                                  │
//! │                                                                         │
//! │  allocate(resource, requester)        quote(requester, amount, rules)   │
//! │        │                                       │                        │
//! │        ▼                                       ▼                        │
//! │  ┌────────────────────────┐         ┌────────────────────────┐          │
//! │  │ AllocationCoordinator  │         │ QuoteService           │          │
//! │  │  • input validation    │         │  • EligibilityValidator│          │
//! │  │  • duplicate fast path │         │  • DiscountEngine      │          │
//! │  │  • bounded retry       │         │    (allot-core, pure)  │          │
//! │  └───────────┬────────────┘         └───────────┬────────────┘          │
//! │              ▼                                  │                       │
//! │  ┌────────────────────────┐                     │                       │
//! │  │ ResourceLedger         │                     │                       │
//! │  │  Pessimistic | CAS     │                     │                       │
//! │  └───────────┬────────────┘                     │                       │
//! │              └──────────────┬───────────────────┘                       │
//! │                             ▼                                           │
//! │                  Arc<dyn ResourceStore>                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`config`] - `EngineConfig`, `LockStrategy`, TOML + env loading
//! - [`context`] - Builds both services on one store
//! - [`coordinator`] - Allocation, release, claim consumption
//! - [`eligibility`] - Rule ownership / window / minimum checks
//! - [`error`] - Ledger, config and seed errors
//! - [`ledger`] - One atomic claim or release under a strategy
//! - [`quote`] - Eligibility followed by discount math
//! - [`retry`] - Bounded linear backoff
//! - [`seed`] - Fixture data

pub mod config;
pub mod context;
pub mod coordinator;
pub mod eligibility;
pub mod error;
pub mod ledger;
pub mod quote;
pub mod retry;
pub mod seed;

pub use config::{EngineConfig, LedgerSettings, LockStrategy, RetrySettings, StoreBackend, StoreSettings};
pub use context::EngineContext;
pub use coordinator::AllocationCoordinator;
pub use eligibility::EligibilityValidator;
pub use error::{ConfigError, ConfigResult, LedgerError, LedgerResult, SeedError};
pub use ledger::ResourceLedger;
pub use quote::QuoteService;
pub use retry::{LinearBackoff, RetryPolicy};
pub use seed::{SeedData, SeedSummary};
