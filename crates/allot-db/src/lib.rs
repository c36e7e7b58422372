//! # allot-db: Storage Layer for Allot
//!
//! Every read and write of resource, claim and rule state goes through the
//! [`ResourceStore`] trait defined here. Two implementations ship:
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Allot Data Flow                                  │
//! │                                                                         │
//! │  ResourceLedger / AllocationCoordinator (allot-engine)                 │
//! │       │                                                                 │
//! │       ▼  Arc<dyn ResourceStore>                                        │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     allot-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │  MemoryStore  │    │  SqliteStore  │    │  Migrations  │  │   │
//! │  │   │  (memory.rs)  │    │  (sqlite.rs)  │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ per-resource  │    │ row-lock table│    │ 001_initial  │  │   │
//! │  │   │ tokio Mutex   │    │ + transactions│    │  _schema.sql │  │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │                                │  Database (pool.rs)           │   │
//! │  └────────────────────────────────┼────────────────────────────────┘   │
//! │                                   ▼                                     │
//! │                            SQLite (WAL)                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`store`] - The `ResourceStore` trait and `CasOutcome`
//! - [`memory`] - In-process implementation
//! - [`sqlite`] - SQLite implementation
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use allot_db::{Database, DbConfig, ResourceStore};
//!
//! let db = Database::new(DbConfig::new("allot.db")).await?;
//! let store = db.store();
//! let coupon = store.read_resource("coupon-1").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod memory;
pub mod migrations;
pub mod pool;
pub mod sqlite;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use memory::MemoryStore;
pub use pool::{Database, DbConfig};
pub use sqlite::SqliteStore;
pub use store::{CasOutcome, ExclusiveMutation, ResourceStore};
