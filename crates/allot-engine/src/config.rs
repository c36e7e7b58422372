//! # Engine Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     ALLOT_STRATEGY=optimistic                                          │
//! │     ALLOT_MAX_RETRIES=5                                                │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     --config <path>, or                                                │
//! │     ~/.config/allot/allot.toml (Linux)                                 │
//! │     ~/Library/Application Support/dev.allot.allot/allot.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     pessimistic, 3 retries, 50ms backoff, memory store                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [ledger]
//! strategy = "optimistic"   # pessimistic | optimistic
//! stacking = "input_order"  # input_order | highest_first
//!
//! [retry]
//! max_retries = 3
//! base_backoff_ms = 50
//!
//! [store]
//! backend = "sqlite"        # memory | sqlite
//! database_path = "allot.db"
//! max_connections = 5
//! io_latency_ms = 0
//! ```
//!
//! ## Environment Variables
//! | Variable | Field |
//! |---|---|
//! | `ALLOT_STRATEGY` | `ledger.strategy` |
//! | `ALLOT_STACKING` | `ledger.stacking` |
//! | `ALLOT_MAX_RETRIES` | `retry.max_retries` |
//! | `ALLOT_BASE_BACKOFF_MS` | `retry.base_backoff_ms` |
//! | `ALLOT_STORE` | `store.backend` |
//! | `ALLOT_DATABASE_PATH` | `store.database_path` |
//! | `ALLOT_MAX_CONNECTIONS` | `store.max_connections` |
//! | `ALLOT_IO_LATENCY_MS` | `store.io_latency_ms` |

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use allot_core::StackingOrder;
use allot_db::{Database, DbConfig, DbResult, MemoryStore, ResourceStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::retry::RetryPolicy;

// =============================================================================
// Lock Strategy
// =============================================================================

/// How the ledger serializes writers on one resource.
///
/// ## Strategy Comparison
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  PESSIMISTIC (Default)              │  OPTIMISTIC                       │
/// │  ──────────────────────             │  ──────────                       │
/// │  • Lock, then read                  │  • Read without lock              │
/// │  • Contenders queue                 │  • Compare version on write       │
/// │  • Every request gets an answer     │  • Losers retry, then give up     │
/// │  • Lock held across I/O latency     │  • No lock held across latency    │
/// │  • Best under heavy contention      │  • Best when conflicts are rare   │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStrategy {
    #[default]
    Pessimistic,
    Optimistic,
}

impl std::fmt::Display for LockStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockStrategy::Pessimistic => write!(f, "pessimistic"),
            LockStrategy::Optimistic => write!(f, "optimistic"),
        }
    }
}

impl std::str::FromStr for LockStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pessimistic" | "lock" | "exclusive" => Ok(LockStrategy::Pessimistic),
            "optimistic" | "cas" | "version" => Ok(LockStrategy::Optimistic),
            other => Err(ConfigError::Invalid(format!(
                "Unknown lock strategy: '{}'. Valid options: pessimistic, optimistic",
                other
            ))),
        }
    }
}

fn parse_stacking(s: &str) -> ConfigResult<StackingOrder> {
    match s.to_lowercase().replace('-', "_").as_str() {
        "input_order" | "input" => Ok(StackingOrder::InputOrder),
        "highest_first" | "highest" => Ok(StackingOrder::HighestFirst),
        other => Err(ConfigError::Invalid(format!(
            "Unknown stacking order: '{}'. Valid options: input_order, highest_first",
            other
        ))),
    }
}

// =============================================================================
// Store Backend
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Process memory; state is lost on exit.
    #[default]
    Memory,
    Sqlite,
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackend::Memory => write!(f, "memory"),
            StoreBackend::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "mem" | "in-memory" => Ok(StoreBackend::Memory),
            "sqlite" | "sql" => Ok(StoreBackend::Sqlite),
            other => Err(ConfigError::Invalid(format!(
                "Unknown store backend: '{}'. Valid options: memory, sqlite",
                other
            ))),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSettings {
    #[serde(default)]
    pub strategy: LockStrategy,

    /// Order in which quotes report applied discounts.
    #[serde(default)]
    pub stacking: StackingOrder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Optimistic retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff before retry `n` is `n * base_backoff_ms`.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    50
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub backend: StoreBackend,

    /// SQLite file. Defaults to `allot.db` in the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Simulated latency held inside every write (demonstrations only).
    #[serde(default)]
    pub io_latency_ms: u64,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            backend: StoreBackend::default(),
            database_path: None,
            max_connections: default_max_connections(),
            io_latency_ms: 0,
        }
    }
}

impl StoreSettings {
    pub fn io_latency(&self) -> Duration {
        Duration::from_millis(self.io_latency_ms)
    }

    /// The SQLite file this configuration points at.
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("dev", "allot", "allot")
                .map(|dirs| dirs.data_dir().join("allot.db"))
                .unwrap_or_else(|| PathBuf::from("allot.db"))
        })
    }

    /// Opens the configured backend.
    pub async fn open(&self) -> DbResult<Arc<dyn ResourceStore>> {
        match self.backend {
            StoreBackend::Memory => {
                debug!("Opening in-memory store");
                Ok(Arc::new(MemoryStore::new().with_io_latency(self.io_latency())))
            }
            StoreBackend::Sqlite => {
                let path = self.resolved_database_path();
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| allot_db::DbError::ConnectionFailed(e.to_string()))?;
                }
                let db = Database::new(DbConfig::new(path).max_connections(self.max_connections))
                    .await?;
                Ok(Arc::new(db.store().with_io_latency(self.io_latency())))
            }
        }
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub ledger: LedgerSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub store: StoreSettings,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (explicit path, else the platform config dir)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let explicit = config_path.is_some();
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml_str(&contents)?;
            } else if explicit {
                return Err(ConfigError::ReadFailed(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} does not exist", path.display()),
                )));
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML document; missing sections take their defaults.
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.retry.max_retries > 10_000 {
            return Err(ConfigError::Invalid(
                "retry.max_retries must be at most 10000".into(),
            ));
        }

        if self.retry.base_backoff_ms > 60_000 {
            return Err(ConfigError::Invalid(
                "retry.base_backoff_ms must be at most 60000".into(),
            ));
        }

        if self.store.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "store.max_connections must be greater than 0".into(),
            ));
        }

        if let Some(path) = &self.store.database_path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(
                    "store.database_path must not be empty".into(),
                ));
            }
        }

        Ok(())
    }

    /// Applies `ALLOT_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup. Unparseable values are
    /// logged and ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("ALLOT_STRATEGY") {
            match value.parse() {
                Ok(strategy) => {
                    debug!(strategy = %value, "Overriding lock strategy from environment");
                    self.ledger.strategy = strategy;
                }
                Err(e) => warn!(error = %e, "Ignoring ALLOT_STRATEGY"),
            }
        }

        if let Some(value) = lookup("ALLOT_STACKING") {
            match parse_stacking(&value) {
                Ok(stacking) => self.ledger.stacking = stacking,
                Err(e) => warn!(error = %e, "Ignoring ALLOT_STACKING"),
            }
        }

        if let Some(value) = lookup("ALLOT_MAX_RETRIES") {
            if let Ok(n) = value.parse::<u32>() {
                debug!(max_retries = n, "Overriding max retries from environment");
                self.retry.max_retries = n;
            } else {
                warn!(value = %value, "Ignoring ALLOT_MAX_RETRIES");
            }
        }

        if let Some(value) = lookup("ALLOT_BASE_BACKOFF_MS") {
            match value.parse::<u64>() {
                Ok(ms) => self.retry.base_backoff_ms = ms,
                Err(e) => warn!(value = %value, error = %e, "Ignoring ALLOT_BASE_BACKOFF_MS"),
            }
        }

        if let Some(value) = lookup("ALLOT_STORE") {
            match value.parse() {
                Ok(backend) => self.store.backend = backend,
                Err(e) => warn!(error = %e, "Ignoring ALLOT_STORE"),
            }
        }

        if let Some(value) = lookup("ALLOT_DATABASE_PATH") {
            debug!(path = %value, "Overriding database path from environment");
            self.store.database_path = Some(PathBuf::from(value));
        }

        if let Some(value) = lookup("ALLOT_MAX_CONNECTIONS") {
            match value.parse::<u32>() {
                Ok(n) => self.store.max_connections = n,
                Err(e) => warn!(value = %value, error = %e, "Ignoring ALLOT_MAX_CONNECTIONS"),
            }
        }

        if let Some(value) = lookup("ALLOT_IO_LATENCY_MS") {
            match value.parse::<u64>() {
                Ok(ms) => self.store.io_latency_ms = ms,
                Err(e) => warn!(value = %value, error = %e, "Ignoring ALLOT_IO_LATENCY_MS"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "allot", "allot")
            .map(|dirs| dirs.config_dir().join("allot.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn strategy(&self) -> LockStrategy {
        self.ledger.strategy
    }

    pub fn stacking(&self) -> StackingOrder {
        self.ledger.stacking
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_retries,
            Duration::from_millis(self.retry.base_backoff_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use backoff::backoff::Backoff;

    fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("pessimistic".parse::<LockStrategy>().unwrap(), LockStrategy::Pessimistic);
        assert_eq!("CAS".parse::<LockStrategy>().unwrap(), LockStrategy::Optimistic);
        assert!("spinlock".parse::<LockStrategy>().is_err());
        assert_eq!("sqlite".parse::<StoreBackend>().unwrap(), StoreBackend::Sqlite);
        assert_eq!(parse_stacking("highest-first").unwrap(), StackingOrder::HighestFirst);
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.strategy(), LockStrategy::Pessimistic);
        assert_eq!(config.stacking(), StackingOrder::InputOrder);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_backoff_ms, 50);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_parsing_with_partial_sections() {
        let config = EngineConfig::from_toml_str(
            r#"
            [ledger]
            strategy = "optimistic"
            stacking = "highest_first"

            [retry]
            max_retries = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.strategy(), LockStrategy::Optimistic);
        assert_eq!(config.stacking(), StackingOrder::HighestFirst);
        assert_eq!(config.retry.max_retries, 7);
        assert_eq!(config.retry.base_backoff_ms, 50);
        assert_eq!(config.store.max_connections, 5);
    }

    #[test]
    fn test_toml_rejects_unknown_strategy() {
        let result = EngineConfig::from_toml_str("[ledger]\nstrategy = \"yolo\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = EngineConfig::default();
        config.apply_overrides_from(overrides(&[
            ("ALLOT_STRATEGY", "optimistic"),
            ("ALLOT_MAX_RETRIES", "12"),
            ("ALLOT_STORE", "sqlite"),
            ("ALLOT_DATABASE_PATH", "/tmp/allot-test.db"),
            ("ALLOT_IO_LATENCY_MS", "not-a-number"),
        ]));

        assert_eq!(config.strategy(), LockStrategy::Optimistic);
        assert_eq!(config.retry.max_retries, 12);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(
            config.store.resolved_database_path(),
            PathBuf::from("/tmp/allot-test.db")
        );
        assert_eq!(config.store.io_latency_ms, 0);
    }

    #[test]
    fn test_unparsable_numeric_overrides_keep_defaults() {
        let mut config = EngineConfig::default();
        config.apply_overrides_from(overrides(&[
            ("ALLOT_BASE_BACKOFF_MS", "fast"),
            ("ALLOT_MAX_CONNECTIONS", "-1"),
            ("ALLOT_MAX_RETRIES", "7"),
        ]));

        assert_eq!(config.retry.base_backoff_ms, 50);
        assert_eq!(config.store.max_connections, 5);
        assert_eq!(config.retry.max_retries, 7);

        config.apply_overrides_from(overrides(&[("ALLOT_BASE_BACKOFF_MS", "20")]));
        assert_eq!(config.retry.base_backoff_ms, 20);
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();
        config.store.max_connections = 0;
        assert!(config.validate().is_err());

        config.store.max_connections = 1;
        config.retry.max_retries = 1_000_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_policy_from_config() {
        let mut config = EngineConfig::default();
        config.retry.max_retries = 4;
        config.retry.base_backoff_ms = 10;
        let policy = config.retry_policy();
        assert_eq!(policy.max_retries(), 4);
        let mut schedule = policy.schedule();
        schedule.next_backoff();
        schedule.next_backoff();
        assert_eq!(schedule.next_backoff(), Some(Duration::from_millis(30)));
    }

    #[test]
    fn test_toml_serialization() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[ledger]"));
        assert!(toml_str.contains("[retry]"));
        assert!(toml_str.contains("[store]"));
    }

    #[tokio::test]
    async fn test_open_memory_store() {
        let store = StoreSettings::default().open().await.unwrap();
        assert!(store.list_resources().await.unwrap().is_empty());
    }
}
