//! # allot
//!
//! Command-line front end for bounded allocation and discount quoting.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  $ allot allocate --resource welcome --requester alice                  │
//! │  { "id": "…", "resource_id": "welcome", "requester_id": "alice", … }   │
//! │                                                                         │
//! │  $ allot quote --requester alice --amount 50000 \                       │
//! │        --claim welcome --rule welcome-3000                              │
//! │  { "original_amount": 50000, "total_discount": 3000, … }               │
//! │                                                                         │
//! │  $ allot --strategy optimistic simulate --requesters 1000 --limit 100   │
//! │  { "granted": 100, "exhausted": 900, "invariant_holds": true, … }      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Failures print `{ "code", "message", "retryable" }` and exit non-zero
//! (75 when retrying may help).

mod commands;
mod error;

use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::Cli;

#[tokio::main]
async fn main() {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(error) = cli.run().await {
        match serde_json::to_string_pretty(&error) {
            Ok(json) => println!("{json}"),
            Err(_) => eprintln!("{error}"),
        }
        process::exit(error.exit_code());
    }
}
