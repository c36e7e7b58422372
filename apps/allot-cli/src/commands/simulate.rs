//! Races `requesters` tasks for one quota of `limit` units on a fresh
//! memory store and reports the outcome tally.

use std::sync::Arc;
use std::time::{Duration, Instant};

use allot_core::{AllocationError, Resource};
use allot_db::{MemoryStore, ResourceStore};
use allot_engine::{EngineConfig, EngineContext, LockStrategy};
use clap::Args;
use serde::Serialize;
use tracing::info;

use super::print_json;
use crate::error::CliError;

const RESOURCE_ID: &str = "simulation";

#[derive(Debug, Args)]
pub(crate) struct SimulateArgs {
    /// Concurrent requesters, one task each
    #[arg(long, default_value_t = 1000)]
    requesters: usize,

    /// Units available
    #[arg(long, default_value_t = 100)]
    limit: i64,

    /// Simulated write latency in milliseconds; the config value when omitted
    #[arg(long)]
    latency_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SimulationReport {
    strategy: LockStrategy,
    requesters: usize,
    limit: i64,
    granted: usize,
    exhausted: usize,
    gave_up: usize,
    other_errors: usize,
    consumed: i64,
    elapsed_ms: u128,
    /// `consumed == granted <= limit`
    invariant_holds: bool,
}

pub(crate) async fn run(config: &EngineConfig, args: SimulateArgs) -> Result<(), CliError> {
    let latency = args
        .latency_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.store.io_latency());
    let report = simulate(config, args.requesters, args.limit, latency).await?;
    print_json(&report)
}

pub(crate) async fn simulate(
    config: &EngineConfig,
    requesters: usize,
    limit: i64,
    latency: Duration,
) -> Result<SimulationReport, CliError> {
    let store = Arc::new(MemoryStore::new().with_io_latency(latency));
    store
        .insert_resource(&Resource::quota("Simulation", limit).with_id(RESOURCE_ID))
        .await?;
    let ctx = EngineContext::with_store(store.clone(), config);

    info!(
        strategy = %config.strategy(),
        requesters,
        limit,
        latency_ms = latency.as_millis() as u64,
        "Starting simulation"
    );

    let started = Instant::now();
    let mut handles = Vec::with_capacity(requesters);
    for i in 0..requesters {
        let coordinator = ctx.coordinator().clone();
        handles.push(tokio::spawn(async move {
            coordinator
                .allocate(RESOURCE_ID, &format!("requester-{i}"))
                .await
        }));
    }

    let mut report = SimulationReport {
        strategy: config.strategy(),
        requesters,
        limit,
        granted: 0,
        exhausted: 0,
        gave_up: 0,
        other_errors: 0,
        consumed: 0,
        elapsed_ms: 0,
        invariant_holds: false,
    };

    for handle in handles {
        let outcome = handle
            .await
            .map_err(|e| CliError::internal(format!("Requester task failed: {}", e)))?;
        match outcome {
            Ok(_) => report.granted += 1,
            Err(AllocationError::Exhausted { .. }) => report.exhausted += 1,
            Err(AllocationError::AllocationFailed { .. }) => report.gave_up += 1,
            Err(_) => report.other_errors += 1,
        }
    }

    report.elapsed_ms = started.elapsed().as_millis();
    report.consumed = store.read_resource(RESOURCE_ID).await?.consumed;
    report.invariant_holds = report.consumed == report.granted as i64 && report.consumed <= limit;

    info!(
        granted = report.granted,
        exhausted = report.exhausted,
        gave_up = report.gave_up,
        elapsed_ms = report.elapsed_ms as u64,
        "Simulation finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pessimistic_simulation_is_exact() {
        let report = simulate(&EngineConfig::default(), 300, 30, Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(report.granted, 30);
        assert_eq!(report.exhausted, 270);
        assert!(report.invariant_holds);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_optimistic_simulation_keeps_invariant() {
        let mut config = EngineConfig::default();
        config.ledger.strategy = LockStrategy::Optimistic;
        config.retry.base_backoff_ms = 1;

        let report = simulate(&config, 300, 30, Duration::from_millis(1))
            .await
            .unwrap();

        assert!(report.granted <= 30);
        assert_eq!(report.other_errors, 0);
        assert_eq!(report.granted + report.exhausted + report.gave_up, 300);
        assert!(report.invariant_holds);
    }
}
