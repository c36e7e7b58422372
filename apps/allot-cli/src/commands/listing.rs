use allot_engine::EngineConfig;
use clap::Args;

use super::{open_context, print_json};
use crate::error::CliError;

#[derive(Debug, Args)]
pub(crate) struct ClaimsArgs {
    #[arg(long)]
    requester: String,
}

pub(crate) async fn claims(config: &EngineConfig, args: ClaimsArgs) -> Result<(), CliError> {
    let ctx = open_context(config).await?;
    let claims = ctx.coordinator().requester_claims(&args.requester).await?;
    print_json(&claims)
}

pub(crate) async fn available(config: &EngineConfig) -> Result<(), CliError> {
    let ctx = open_context(config).await?;
    let resources = ctx.coordinator().available_resources().await?;
    print_json(&resources)
}
