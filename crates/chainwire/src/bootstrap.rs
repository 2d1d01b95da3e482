//! Host-side helpers for bringing a channel up.

use anyhow::{Context, Result};
use chainwire_ledger::Factory;
use chainwire_msgproc::RuleSet;
use tracing::info;

use crate::genesis::GenesisFactory;
use crate::processor::{ChannelProcessor, ProcessorConfig};

/// Open `channel_id` from `factory`, writing a genesis block first if the
/// channel's ledger is empty.
pub async fn start_channel(
    factory: &dyn Factory,
    channel_id: &str,
    genesis: &GenesisFactory,
    rules: RuleSet,
    config: ProcessorConfig,
) -> Result<ChannelProcessor> {
    let ledger = factory
        .get_or_create(channel_id)
        .await
        .with_context(|| format!("failed to open ledger for channel '{channel_id}'"))?;

    if ledger.height() > 0 {
        return ChannelProcessor::open(ledger, rules, config)
            .await
            .with_context(|| format!("failed to resume channel '{channel_id}'"));
    }

    info!(channel = channel_id, "ledger empty, writing genesis block");
    let block = genesis
        .block(channel_id)
        .context("failed to create genesis block")?;
    ChannelProcessor::bootstrap(ledger, block, rules, config)
        .await
        .with_context(|| format!("failed to bootstrap channel '{channel_id}'"))
}
