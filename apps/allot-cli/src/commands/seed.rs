use std::path::PathBuf;

use allot_engine::{EngineConfig, EngineContext, SeedData, StoreBackend};
use clap::Args;
use tracing::warn;

use super::print_json;
use crate::error::CliError;

#[derive(Debug, Args)]
pub(crate) struct SeedArgs {
    /// TOML fixture with [[resources]] and [[rules]]; the demo set when omitted
    #[arg(long)]
    file: Option<PathBuf>,
}

pub(crate) async fn run(config: &EngineConfig, args: SeedArgs) -> Result<(), CliError> {
    let data = match args.file {
        Some(path) => SeedData::from_toml_str(&std::fs::read_to_string(path)?)?,
        None => SeedData::demo(),
    };

    if config.store.backend == StoreBackend::Memory {
        warn!("Seeding the memory backend; the data is gone when this process exits");
    }

    let ctx = EngineContext::open(config).await?;
    let summary = data.apply(ctx.store().as_ref()).await?;
    print_json(&summary)
}
