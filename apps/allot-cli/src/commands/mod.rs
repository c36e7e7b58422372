//! # Commands
//!
//! ```text
//! allot [--config FILE] [--strategy S] [--store B] <command>
//!
//!   seed       load fixture resources and rules into the store
//!   allocate   claim units of a resource for a requester
//!   order      claim several resources at once, all or nothing
//!   release    return units to a stock resource
//!   consume    mark a claim used
//!   quote      price an order with discount rules
//!   claims     a requester's active claims
//!   available  resources that can issue right now
//!   simulate   race many requesters against one bounded resource
//! ```
//!
//! With the memory backend every invocation starts from the demo fixture,
//! so `quote --claim` allocates first within the same process.

use std::path::PathBuf;

use allot_engine::{EngineConfig, EngineContext, LockStrategy, SeedData, StoreBackend};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::debug;

use crate::error::CliError;

mod allocate;
mod listing;
mod quote;
mod seed;
mod simulate;

#[derive(Debug, Parser)]
#[command(name = "allot", about = "Bounded allocation and discount quoting", long_about = None)]
pub(crate) struct Cli {
    /// Config file (TOML)
    #[arg(long, global = true, env = "ALLOT_CONFIG")]
    config: Option<PathBuf>,

    /// Lock strategy, overriding the config file
    #[arg(long, global = true)]
    strategy: Option<LockStrategy>,

    /// Storage backend, overriding the config file
    #[arg(long, global = true, value_enum)]
    store: Option<BackendArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendArg {
    Memory,
    Sqlite,
}

impl From<BackendArg> for StoreBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Memory => StoreBackend::Memory,
            BackendArg::Sqlite => StoreBackend::Sqlite,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    Seed(seed::SeedArgs),
    Allocate(allocate::AllocateArgs),
    Order(allocate::OrderArgs),
    Release(allocate::ReleaseArgs),
    Consume(allocate::ConsumeArgs),
    Quote(quote::QuoteArgs),
    Claims(listing::ClaimsArgs),
    Available,
    Simulate(simulate::SimulateArgs),
}

impl Cli {
    pub(crate) async fn run(self) -> Result<(), CliError> {
        let mut config = EngineConfig::load(self.config)?;
        if let Some(strategy) = self.strategy {
            config.ledger.strategy = strategy;
        }
        if let Some(store) = self.store {
            config.store.backend = store.into();
        }
        config.validate()?;
        debug!(?config, "Effective configuration");

        match self.command {
            Commands::Seed(args) => seed::run(&config, args).await,
            Commands::Allocate(args) => allocate::allocate(&config, args).await,
            Commands::Order(args) => allocate::order(&config, args).await,
            Commands::Release(args) => allocate::release(&config, args).await,
            Commands::Consume(args) => allocate::consume(&config, args).await,
            Commands::Quote(args) => quote::run(&config, args).await,
            Commands::Claims(args) => listing::claims(&config, args).await,
            Commands::Available => listing::available(&config).await,
            Commands::Simulate(args) => simulate::run(&config, args).await,
        }
    }
}

/// Opens the configured store. A memory store is empty at startup, so it
/// gets the demo fixture.
async fn open_context(config: &EngineConfig) -> Result<EngineContext, CliError> {
    let ctx = EngineContext::open(config).await?;
    if config.store.backend == StoreBackend::Memory {
        SeedData::demo().apply(ctx.store().as_ref()).await?;
    }
    Ok(ctx)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_global_overrides() {
        let cli = Cli::try_parse_from([
            "allot",
            "allocate",
            "--resource",
            "welcome",
            "--requester",
            "alice",
            "--strategy",
            "optimistic",
            "--store",
            "sqlite",
        ])
        .unwrap();

        assert_eq!(cli.strategy, Some(LockStrategy::Optimistic));
        assert!(matches!(cli.store, Some(BackendArg::Sqlite)));
        assert!(matches!(cli.command, Commands::Allocate(_)));
    }

    #[test]
    fn test_parse_order_lines() {
        let cli = Cli::try_parse_from([
            "allot", "order", "--requester", "alice", "--line", "lunch-set=2", "--line", "welcome=1",
        ])
        .unwrap();
        let Commands::Order(args) = cli.command else {
            panic!("expected order command");
        };
        assert_eq!(args.lines.len(), 2);

        assert!(Cli::try_parse_from(["allot", "order", "--requester", "alice"]).is_err());
        assert!(Cli::try_parse_from(["allot", "order", "--requester", "a", "--line", "x"]).is_err());
    }

    #[test]
    fn test_rejects_unknown_strategy() {
        let result = Cli::try_parse_from(["allot", "--strategy", "yolo", "available"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_command_tree_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
