//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: a signing identity bound to a
//! channel, envelope builders, config trees and stub collaborators.

use std::sync::Arc;
use std::time::SystemTime;

use chainwire_core::{
    block_header_hash, make_channel_header, make_payload_header, new_block, new_signature_header,
    set_tx_id, BatchSize, Block, BlockData, Capabilities, Config, ConfigEnvelope, ConfigGroup,
    ConfigUpdate, ConfigUpdateEnvelope, ConfigValue, Envelope, HeaderType, IdentityExpiry,
    Keypair, LocalSigner, Message, Payload, Signer,
};
use chainwire_msgproc::{
    CapabilityFlags, ChannelResources, OrdererConfig, OrdererSettings, DEFAULT_ABSOLUTE_MAX_BYTES,
};

/// A signing identity and the channel it submits to.
pub struct TestFixture {
    pub signer: LocalSigner,
    pub channel_id: String,
}

impl TestFixture {
    /// Create a new fixture with a random keypair on `mychannel`.
    pub fn new() -> Self {
        Self {
            signer: LocalSigner::new("Org1MSP", Keypair::generate()),
            channel_id: "mychannel".to_string(),
        }
    }

    /// Create with a deterministic keypair from seed.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self {
            signer: LocalSigner::new("Org1MSP", Keypair::from_seed(&seed)),
            channel_id: "mychannel".to_string(),
        }
    }

    pub fn on_channel(mut self, channel_id: &str) -> Self {
        self.channel_id = channel_id.to_string();
        self
    }

    /// Stamp an expiry (Unix seconds) into the fixture's identity.
    pub fn expiring_at(mut self, not_after: i64) -> Self {
        self.signer = self.signer.with_expiry(not_after);
        self
    }

    /// A signed envelope of `kind` carrying raw `data`.
    pub fn make_envelope(&self, kind: HeaderType, data: &[u8]) -> Envelope {
        let mut channel_header = make_channel_header(kind, 0, &self.channel_id, 0);
        let signature_header = new_signature_header(&self.signer).expect("nonce");
        set_tx_id(&mut channel_header, &signature_header);

        let payload = Payload {
            header: Some(make_payload_header(&channel_header, &signature_header)),
            data: data.to_vec(),
        }
        .encode();
        let signature = self.signer.sign(&payload).expect("sign");
        Envelope { payload, signature }
    }

    /// An endorser transaction carrying `data`.
    pub fn make_transaction(&self, data: &[u8]) -> Envelope {
        self.make_envelope(HeaderType::EndorserTransaction, data)
    }

    /// A CONFIG envelope replacing the channel config with `channel_group`.
    pub fn make_config(&self, sequence: u64, channel_group: ConfigGroup) -> Envelope {
        let config_envelope = ConfigEnvelope {
            config: Some(Config {
                sequence,
                channel_group: Some(channel_group),
            }),
            last_update: None,
        };
        self.make_envelope(HeaderType::Config, &config_envelope.encode())
    }

    /// A CONFIG_UPDATE envelope for this fixture's channel.
    pub fn make_config_update(&self, write_set: ConfigGroup) -> Envelope {
        let update = ConfigUpdate {
            channel_id: self.channel_id.clone(),
            read_set: None,
            write_set: Some(write_set),
            ..Default::default()
        };
        let update_envelope = ConfigUpdateEnvelope {
            config_update: update.encode(),
            signatures: Vec::new(),
        };
        self.make_envelope(HeaderType::ConfigUpdate, &update_envelope.encode())
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Create multiple fixtures with distinct deterministic keys.
pub fn multi_party_fixtures(count: usize) -> Vec<TestFixture> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = i as u8;
            TestFixture::with_seed(seed)
        })
        .collect()
}

/// A channel group whose orderer group enables `capabilities` and, when
/// given, caps envelope payloads at `absolute_max_bytes`.
pub fn orderer_channel_group(capabilities: &[&str], absolute_max_bytes: Option<u32>) -> ConfigGroup {
    let mut orderer = ConfigGroup {
        mod_policy: "Admins".to_string(),
        ..Default::default()
    };
    orderer.values.insert(
        "Capabilities".to_string(),
        ConfigValue {
            value: Capabilities::new(capabilities.iter().copied()).encode(),
            mod_policy: "Admins".to_string(),
            ..Default::default()
        },
    );
    if let Some(absolute_max_bytes) = absolute_max_bytes {
        orderer.values.insert(
            "BatchSize".to_string(),
            ConfigValue {
                value: BatchSize {
                    max_message_count: 10,
                    absolute_max_bytes,
                    preferred_max_bytes: absolute_max_bytes / 2,
                }
                .encode(),
                mod_policy: "Admins".to_string(),
                ..Default::default()
            },
        );
    }

    let mut channel = ConfigGroup {
        mod_policy: "Admins".to_string(),
        ..Default::default()
    };
    channel.groups.insert("Orderer".to_string(), orderer);
    channel
}

/// Resources with fixed orderer settings.
pub fn static_resources(expiration_check: bool, absolute_max_bytes: Option<u32>) -> Arc<ChannelResources> {
    let settings = OrdererSettings {
        capabilities: CapabilityFlags { expiration_check },
        absolute_max_bytes: absolute_max_bytes.unwrap_or(DEFAULT_ABSOLUTE_MAX_BYTES),
    };
    Arc::new(ChannelResources::new(Some(
        Arc::new(settings) as Arc<dyn OrdererConfig>
    )))
}

/// Identity expiry that reports the same time for every identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedExpiry(pub Option<SystemTime>);

impl IdentityExpiry for FixedExpiry {
    fn expires_at(&self, _identity: &[u8]) -> Option<SystemTime> {
        self.0
    }
}

/// `len` correctly chained blocks, each carrying one small data entry.
pub fn chained_blocks(len: u64) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut previous_hash = Vec::new();
    for number in 0..len {
        let mut block = new_block(number, &previous_hash);
        block.data = Some(BlockData {
            data: vec![format!("tx-{number}").into_bytes()],
        });
        if let Some(header) = block.header.as_ref() {
            previous_hash = block_header_hash(header);
        }
        blocks.push(block);
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainwire_core::{
        channel_header, envelope_as_signed_data, envelope_to_config_update, verify_signed_data,
    };
    use chainwire_msgproc::Resources;

    #[test]
    fn test_fixture_envelope_is_signed() {
        let fixture = TestFixture::new();
        let envelope = fixture.make_transaction(b"hello");

        let header = channel_header(Some(&envelope)).unwrap();
        assert_eq!(header.channel_id, "mychannel");
        assert_eq!(header.kind(), Some(HeaderType::EndorserTransaction));

        let signed = envelope_as_signed_data(&envelope).unwrap();
        assert!(verify_signed_data(&signed[0]).is_ok());
    }

    #[test]
    fn test_config_update_roundtrip() {
        let fixture = TestFixture::with_seed([1; 32]).on_channel("other");
        let envelope = fixture.make_config_update(ConfigGroup::default());
        let update_envelope = envelope_to_config_update(Some(&envelope)).unwrap();
        let update = ConfigUpdate::decode(&update_envelope.config_update).unwrap();
        assert_eq!(update.channel_id, "other");
    }

    #[test]
    fn test_orderer_channel_group_resources() {
        let group = orderer_channel_group(&["V2_0"], Some(2048));
        let resources = ChannelResources::from_channel_group(&group).unwrap();
        let orderer = resources.orderer_config().unwrap();
        assert!(orderer.capabilities().expiration_check());
        assert_eq!(orderer.absolute_max_bytes(), 2048);
    }

    #[test]
    fn test_stub_collaborators_drive_expiration() {
        use chainwire_msgproc::{ExpirationRejectRule, Rule, RuleError};
        use std::time::Duration;

        let envelope = TestFixture::new().make_transaction(b"tx");
        let past = SystemTime::now() - Duration::from_secs(60);

        let rule = ExpirationRejectRule::new(
            static_resources(true, None),
            Arc::new(FixedExpiry(Some(past))),
        );
        assert_eq!(rule.apply(&envelope), Err(RuleError::IdentityExpired));

        let rule = ExpirationRejectRule::new(
            static_resources(false, None),
            Arc::new(FixedExpiry(Some(past))),
        );
        assert_eq!(rule.apply(&envelope), Ok(()));
    }

    #[test]
    fn test_chained_blocks_link() {
        let blocks = chained_blocks(3);
        for pair in blocks.windows(2) {
            let prev = pair[0].header.as_ref().unwrap();
            assert_eq!(pair[1].header.as_ref().unwrap().previous_hash, block_header_hash(prev));
        }
    }

    #[test]
    fn test_multi_party() {
        let parties = multi_party_fixtures(3);
        let creators: Vec<_> = parties.iter().map(|p| p.signer.serialize()).collect();
        assert_ne!(creators[0], creators[1]);
        assert_ne!(creators[1], creators[2]);
        assert_ne!(creators[0], creators[2]);
    }
}
