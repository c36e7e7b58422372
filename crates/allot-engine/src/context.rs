//! # Engine Context
//!
//! Wires one store into both services so they see the same claims.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  EngineConfig ──► StoreSettings::open() ──► Arc<dyn ResourceStore>      │
//! │                                               │                         │
//! │                 ┌─────────────────────────────┼───────────────┐         │
//! │                 ▼                             ▼               │         │
//! │   ResourceLedger(strategy)         EligibilityValidator       │         │
//! │                 │                             │               │         │
//! │                 ▼                             ▼               │         │
//! │   AllocationCoordinator(retry)     QuoteService(stacking)     │         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use allot_core::DiscountEngine;
use allot_db::{DbResult, ResourceStore};
use tracing::info;

use crate::config::EngineConfig;
use crate::coordinator::AllocationCoordinator;
use crate::eligibility::EligibilityValidator;
use crate::ledger::ResourceLedger;
use crate::quote::QuoteService;

#[derive(Clone)]
pub struct EngineContext {
    store: Arc<dyn ResourceStore>,
    coordinator: AllocationCoordinator,
    quotes: QuoteService,
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("coordinator", &self.coordinator)
            .field("quotes", &self.quotes)
            .finish_non_exhaustive()
    }
}

impl EngineContext {
    /// Opens the configured backend and builds both services on it.
    pub async fn open(config: &EngineConfig) -> DbResult<Self> {
        let store = config.store.open().await?;
        info!(
            backend = ?config.store.backend,
            strategy = %config.strategy(),
            max_retries = config.retry.max_retries,
            "Engine ready"
        );
        Ok(Self::with_store(store, config))
    }

    /// Builds both services on an existing store.
    pub fn with_store(store: Arc<dyn ResourceStore>, config: &EngineConfig) -> Self {
        let ledger = ResourceLedger::new(store.clone(), config.strategy());
        let coordinator = AllocationCoordinator::new(ledger, config.retry_policy());
        let quotes = QuoteService::new(
            EligibilityValidator::new(store.clone()),
            DiscountEngine::new(config.stacking()),
        );

        EngineContext {
            store,
            coordinator,
            quotes,
        }
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &AllocationCoordinator {
        &self.coordinator
    }

    pub fn quotes(&self) -> &QuoteService {
        &self.quotes
    }
}
