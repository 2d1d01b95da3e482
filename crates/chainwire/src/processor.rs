//! The channel processor: validates envelopes and orders them into blocks.
//!
//! Each accepted envelope is cut into its own block. Block metadata records
//! the number of the most recent config block, which is the block itself
//! when it carries a config transaction.

use std::sync::Arc;

use chainwire_core::{
    block_header_hash, channel_header, envelope_to_config_update, extract_envelope,
    last_config_index, new_block, unmarshal_envelope_of_type, Block, ConfigEnvelope, ConfigGroup,
    ConfigUpdate, CoreError, Envelope, HeaderType, Message,
};
use chainwire_ledger::ReadWriter;
use chainwire_msgproc::{ChannelResources, OrdererSettings, RuleSet};
use tracing::{debug, error, info, warn};

use crate::error::{ProcessorError, Result};

/// Configuration for a [`ChannelProcessor`].
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Reject envelopes addressed to another channel.
    pub check_channel_id: bool,
    /// Order CONFIG_UPDATE envelopes after validating their body.
    pub accept_config_updates: bool,
    /// Refreshed from every committed config block.
    pub resources: Option<Arc<ChannelResources>>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            check_channel_id: true,
            accept_config_updates: true,
            resources: None,
        }
    }
}

/// Result of ordering one envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub block_number: u64,
    pub tx_id: String,
    /// Whether the block is now the channel's last config block.
    pub config: bool,
}

#[derive(Debug, Clone)]
struct ChainTip {
    height: u64,
    hash: Vec<u8>,
    last_config: u64,
}

/// Orders envelopes for one channel.
pub struct ChannelProcessor {
    channel_id: String,
    ledger: Arc<dyn ReadWriter>,
    rules: RuleSet,
    config: ProcessorConfig,
    // Held across append so block numbers are handed out in order.
    tip: tokio::sync::Mutex<ChainTip>,
}

impl std::fmt::Debug for ChannelProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelProcessor")
            .field("channel_id", &self.channel_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ChannelProcessor {
    /// Start a channel by appending `genesis` to an empty ledger.
    pub async fn bootstrap(
        ledger: Arc<dyn ReadWriter>,
        genesis: Block,
        rules: RuleSet,
        config: ProcessorConfig,
    ) -> Result<Self> {
        let envelope = extract_envelope(&genesis, 0)?;
        let channel_id = channel_header(Some(&envelope))?.channel_id;
        let channel_group = config_group(&envelope)?;

        ledger.append(genesis.clone()).await?;
        let tip = tip_after(&genesis)?;

        if let (Some(resources), Some(group)) = (&config.resources, &channel_group) {
            apply_config(resources, group);
        }

        info!(channel = %channel_id, "bootstrapped channel");
        Ok(Self::new(channel_id, ledger, rules, config, tip))
    }

    /// Resume a channel from the tip of an existing ledger.
    pub async fn open(
        ledger: Arc<dyn ReadWriter>,
        rules: RuleSet,
        config: ProcessorConfig,
    ) -> Result<Self> {
        let height = ledger.height();
        if height == 0 {
            return Err(ProcessorError::EmptyLedger);
        }

        let last = ledger.retrieve_block_by_number(height - 1).await?;
        let channel_id = channel_header(Some(&extract_envelope(&last, 0)?))?.channel_id;
        let tip = tip_after(&last)?;

        if let Some(resources) = &config.resources {
            match ledger.retrieve_block_by_number(tip.last_config).await {
                Ok(block) => {
                    if let Some(group) = config_group(&extract_envelope(&block, 0)?)? {
                        apply_config(resources, &group);
                    }
                }
                Err(err) => {
                    warn!(channel = %channel_id, error = %err, "last config block unavailable")
                }
            }
        }

        info!(channel = %channel_id, height, last_config = tip.last_config, "opened channel");
        Ok(Self::new(channel_id, ledger, rules, config, tip))
    }

    fn new(
        channel_id: String,
        ledger: Arc<dyn ReadWriter>,
        rules: RuleSet,
        config: ProcessorConfig,
        tip: ChainTip,
    ) -> Self {
        Self {
            channel_id,
            ledger,
            rules,
            config,
            tip: tokio::sync::Mutex::new(tip),
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn ledger(&self) -> &Arc<dyn ReadWriter> {
        &self.ledger
    }

    /// Number of the most recent config block.
    pub async fn last_config(&self) -> u64 {
        self.tip.lock().await.last_config
    }

    /// Validate `envelope` and append it to the ledger in its own block.
    pub async fn process(&self, envelope: Envelope) -> Result<ProcessOutcome> {
        let header = channel_header(Some(&envelope))?;
        if self.config.check_channel_id && header.channel_id != self.channel_id {
            return Err(ProcessorError::WrongChannel {
                expected: self.channel_id.clone(),
                got: header.channel_id,
            });
        }

        let kind = header
            .kind()
            .ok_or(ProcessorError::UnsupportedType(header.header_type))?;

        let mut channel_group = None;
        match kind {
            HeaderType::ConfigUpdate if !self.config.accept_config_updates => {
                return Err(ProcessorError::UnsupportedType(header.header_type));
            }
            HeaderType::ConfigUpdate => self.check_config_update(&envelope)?,
            HeaderType::Config => channel_group = config_group(&envelope)?,
            _ => {}
        }

        if let Err(err) = self.rules.apply(&envelope) {
            if err.is_fatal() {
                error!(channel = %self.channel_id, error = %err, "rule evaluation failed");
            }
            return Err(err.into());
        }

        let is_config = kind.is_config();
        let mut tip = self.tip.lock().await;
        let number = tip.height;
        let last_config = if is_config { number } else { tip.last_config };

        let block = cut_block(number, &tip.hash, envelope.encode(), last_config);
        let hash = block
            .header
            .as_ref()
            .map(block_header_hash)
            .unwrap_or_default();
        self.ledger.append(block).await?;

        *tip = ChainTip {
            height: number + 1,
            hash,
            last_config,
        };
        drop(tip);

        if let (Some(resources), Some(group)) = (&self.config.resources, &channel_group) {
            apply_config(resources, group);
        }

        debug!(
            channel = %self.channel_id,
            number,
            tx_id = %header.tx_id,
            config = is_config,
            "ordered envelope"
        );
        Ok(ProcessOutcome {
            block_number: number,
            tx_id: header.tx_id,
            config: is_config,
        })
    }

    fn check_config_update(&self, envelope: &Envelope) -> Result<()> {
        let update_envelope = envelope_to_config_update(Some(envelope))?;
        let update = ConfigUpdate::decode(&update_envelope.config_update)?;
        if self.config.check_channel_id
            && !update.channel_id.is_empty()
            && update.channel_id != self.channel_id
        {
            return Err(ProcessorError::WrongChannel {
                expected: self.channel_id.clone(),
                got: update.channel_id,
            });
        }
        Ok(())
    }
}

/// The channel group carried by a CONFIG envelope, checked to yield valid
/// orderer settings. Other envelope types yield `None`.
fn config_group(envelope: &Envelope) -> Result<Option<ConfigGroup>> {
    let header = channel_header(Some(envelope))?;
    if header.kind() != Some(HeaderType::Config) {
        return Ok(None);
    }

    let (_, config_envelope) =
        unmarshal_envelope_of_type::<ConfigEnvelope>(envelope, HeaderType::Config)?;
    let group = config_envelope
        .config
        .and_then(|config| config.channel_group)
        .ok_or_else(|| CoreError::MalformedMessage {
            kind: ConfigEnvelope::KIND,
            reason: "config has no channel group".to_string(),
        })?;
    OrdererSettings::from_channel_group(&group)?;
    Ok(Some(group))
}

fn apply_config(resources: &ChannelResources, group: &ConfigGroup) {
    if let Err(err) = resources.update(group) {
        warn!(error = %err, "keeping previous orderer config");
    }
}

fn tip_after(block: &Block) -> Result<ChainTip> {
    let header = block.header.as_ref().ok_or(CoreError::MissingHeader)?;
    Ok(ChainTip {
        height: header.number + 1,
        hash: block_header_hash(header),
        last_config: last_config_index(block)?,
    })
}

/// A block holding one encoded envelope, pointing at `last_config`.
fn cut_block(number: u64, previous_hash: &[u8], envelope: Vec<u8>, last_config: u64) -> Block {
    let mut block = new_block(number, previous_hash);
    block.set_data(vec![envelope]);
    block.set_last_config(last_config);
    block
}
