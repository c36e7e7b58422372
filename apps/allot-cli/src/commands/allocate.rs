use allot_core::OrderLine;
use allot_engine::EngineConfig;
use clap::Args;

use super::{open_context, print_json};
use crate::error::CliError;

#[derive(Debug, Args)]
pub(crate) struct AllocateArgs {
    /// Resource to claim from
    #[arg(long)]
    resource: String,

    /// Requester receiving the claim
    #[arg(long)]
    requester: String,

    /// Units to claim (stock resources only take more than one)
    #[arg(long, default_value_t = 1)]
    quantity: i64,
}

#[derive(Debug, Args)]
pub(crate) struct OrderArgs {
    #[arg(long)]
    requester: String,

    /// Order line as RESOURCE=QUANTITY (repeatable)
    #[arg(long = "line", required = true, value_parser = parse_line)]
    pub(crate) lines: Vec<OrderLine>,
}

fn parse_line(raw: &str) -> Result<OrderLine, String> {
    let (resource, quantity) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected RESOURCE=QUANTITY, got '{raw}'"))?;
    let quantity = quantity
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("bad quantity in '{raw}': {e}"))?;
    Ok(OrderLine::new(resource.trim(), quantity))
}

#[derive(Debug, Args)]
pub(crate) struct ReleaseArgs {
    #[arg(long)]
    resource: String,

    #[arg(long)]
    quantity: i64,
}

#[derive(Debug, Args)]
pub(crate) struct ConsumeArgs {
    /// Claim id printed by `allocate`
    #[arg(long)]
    claim: String,
}

pub(crate) async fn allocate(config: &EngineConfig, args: AllocateArgs) -> Result<(), CliError> {
    let ctx = open_context(config).await?;
    let claim = ctx
        .coordinator()
        .reserve(&args.resource, &args.requester, args.quantity)
        .await?;
    print_json(&claim)
}

/// Reserves every line or none.
pub(crate) async fn order(config: &EngineConfig, args: OrderArgs) -> Result<(), CliError> {
    let ctx = open_context(config).await?;
    let claims = ctx
        .coordinator()
        .reserve_many(&args.requester, &args.lines)
        .await?;
    print_json(&claims)
}

pub(crate) async fn release(config: &EngineConfig, args: ReleaseArgs) -> Result<(), CliError> {
    let ctx = open_context(config).await?;
    let resource = ctx
        .coordinator()
        .release(&args.resource, args.quantity)
        .await?;
    print_json(&resource)
}

pub(crate) async fn consume(config: &EngineConfig, args: ConsumeArgs) -> Result<(), CliError> {
    let ctx = open_context(config).await?;
    let claim = ctx.coordinator().consume_claim(&args.claim).await?;
    print_json(&claim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("lunch-set=3").unwrap(), OrderLine::new("lunch-set", 3));
        assert_eq!(parse_line(" stew = 1").unwrap(), OrderLine::new("stew", 1));
        assert!(parse_line("lunch-set").is_err());
        assert!(parse_line("lunch-set=many").is_err());
    }
}
