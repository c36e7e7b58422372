use allot_core::{AllocationError, Money};
use allot_engine::EngineConfig;
use clap::Args;
use tracing::debug;

use super::{open_context, print_json};
use crate::error::CliError;

#[derive(Debug, Args)]
pub(crate) struct QuoteArgs {
    #[arg(long)]
    requester: String,

    /// Order amount in minor units
    #[arg(long, allow_negative_numbers = true)]
    amount: i64,

    /// Rule to apply; repeat for stacking, in application order
    #[arg(long = "rule")]
    rules: Vec<String>,

    /// Claim this resource for the requester first; repeatable
    #[arg(long = "claim")]
    claims: Vec<String>,
}

pub(crate) async fn run(config: &EngineConfig, args: QuoteArgs) -> Result<(), CliError> {
    let ctx = open_context(config).await?;

    for resource_id in &args.claims {
        match ctx.coordinator().allocate(resource_id, &args.requester).await {
            Ok(_) => {}
            // Holding the claim already is what we want
            Err(AllocationError::AlreadyClaimed { .. }) => {
                debug!(resource_id = %resource_id, requester_id = %args.requester, "Claim already held");
            }
            Err(err) => return Err(err.into()),
        }
    }

    let quote = ctx
        .quotes()
        .quote(&args.requester, Money::from_minor(args.amount), &args.rules)
        .await?;
    print_json(&quote)
}
