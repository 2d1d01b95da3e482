//! Genesis block construction.

use chainwire_core::{
    create_nonce, make_channel_header, make_payload_header, make_signature_header, new_block,
    set_tx_id, Block, BlockExtension, Config, ConfigEnvelope, ConfigGroup, Envelope, FatalError,
    HeaderType, Message, Payload,
};
use tracing::{error, info};

/// Message version stamped on the genesis channel header.
pub const GENESIS_MSG_VERSION: i32 = 1;

/// Epoch of the genesis transaction.
pub const GENESIS_EPOCH: u64 = 0;

/// Builds block zero of a channel from its initial configuration tree.
#[derive(Debug, Clone)]
pub struct GenesisFactory {
    channel_group: ConfigGroup,
}

impl GenesisFactory {
    pub fn new(channel_group: ConfigGroup) -> Self {
        Self { channel_group }
    }

    pub fn channel_group(&self) -> &ConfigGroup {
        &self.channel_group
    }

    /// The genesis block for `channel_id`.
    ///
    /// The block carries one unsigned CONFIG envelope with no creator. Its
    /// metadata points at itself as the last config block.
    ///
    /// Fails only when no nonce can be drawn from the OS entropy source,
    /// which is fatal to the host.
    pub fn block(&self, channel_id: &str) -> Result<Block, FatalError> {
        let mut channel_header =
            make_channel_header(HeaderType::Config, GENESIS_MSG_VERSION, channel_id, GENESIS_EPOCH);
        let nonce = create_nonce().map_err(|e| {
            error!(channel = channel_id, error = %e, "cannot create genesis nonce");
            FatalError::from(e)
        })?;
        let signature_header = make_signature_header(&[], &nonce);
        set_tx_id(&mut channel_header, &signature_header);

        let config_envelope = ConfigEnvelope {
            config: Some(Config {
                sequence: 0,
                channel_group: Some(self.channel_group.clone()),
            }),
            last_update: None,
        };
        let payload = Payload {
            header: Some(make_payload_header(&channel_header, &signature_header)),
            data: config_envelope.encode(),
        };
        let envelope = Envelope {
            payload: payload.encode(),
            signature: Vec::new(),
        }
        .encode();

        let mut block = new_block(0, &[]);
        block.set_data(vec![envelope.clone()]);
        // The envelope is repeated in the extension.
        block.extension = Some(BlockExtension {
            extension_data: vec![envelope],
        });
        block.set_last_config(0);

        info!(channel = channel_id, tx_id = %channel_header.tx_id, "created genesis block");
        Ok(block)
    }
}
