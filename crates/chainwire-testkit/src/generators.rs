//! Proptest generators for property-based testing.

use std::collections::BTreeMap;

use proptest::option;
use proptest::prelude::*;

use chainwire_core::{
    make_channel_header, make_payload_header, make_signature_header, set_tx_id, Block,
    BlockData, BlockExtension, BlockHeader, BlockMetadata, BlockMetadataIndex, ChannelHeader,
    Config, ConfigEnvelope, ConfigGroup, ConfigPolicy, ConfigSignature, ConfigUpdate,
    ConfigUpdateEnvelope, ConfigValue, Envelope, HeaderType, Keypair, LocalSigner, Message,
    Payload, SignatureHeader, Signer, Timestamp, NONCE_SIZE,
};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a signer with a random key and membership provider id.
pub fn signer() -> impl Strategy<Value = LocalSigner> {
    (keypair(), "[A-Z][a-z]{2,8}MSP").prop_map(|(keypair, msp_id)| LocalSigner::new(msp_id, keypair))
}

/// Generate a known header type.
pub fn header_type() -> impl Strategy<Value = HeaderType> {
    prop_oneof![
        Just(HeaderType::Message),
        Just(HeaderType::Config),
        Just(HeaderType::ConfigUpdate),
        Just(HeaderType::EndorserTransaction),
        Just(HeaderType::OrdererTransaction),
        Just(HeaderType::DeliverSeekInfo),
        Just(HeaderType::ChaincodePackage),
        Just(HeaderType::PeerAdminOperation),
    ]
}

/// Generate a channel name.
pub fn channel_id() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9.-]{0,29}".prop_map(String::from)
}

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a config map key or mod policy name, possibly empty.
pub fn config_name() -> impl Strategy<Value = String> {
    "([A-Za-z][A-Za-z0-9]{0,11})?".prop_map(String::from)
}

pub fn timestamp() -> impl Strategy<Value = Timestamp> {
    (any::<i64>(), any::<i32>()).prop_map(|(seconds, nanos)| Timestamp { seconds, nanos })
}

/// Channel headers with arbitrary, including unknown, type tags.
pub fn channel_headers() -> impl Strategy<Value = ChannelHeader> {
    (
        any::<i32>(),
        any::<i32>(),
        option::of(timestamp()),
        channel_id(),
        "[0-9a-f]{0,64}",
        any::<u64>(),
        payload(32),
    )
        .prop_map(
            |(header_type, version, timestamp, channel_id, tx_id, epoch, extension)| ChannelHeader {
                header_type,
                version,
                timestamp,
                channel_id,
                tx_id,
                epoch,
                extension,
            },
        )
}

pub fn signature_headers() -> impl Strategy<Value = SignatureHeader> {
    (payload(96), any::<[u8; NONCE_SIZE]>()).prop_map(|(creator, nonce)| SignatureHeader {
        creator,
        nonce: nonce.to_vec(),
    })
}

/// Envelopes with opaque payload and signature bytes.
pub fn envelopes() -> impl Strategy<Value = Envelope> {
    (payload(128), payload(64)).prop_map(|(payload, signature)| Envelope { payload, signature })
}

/// Blocks with any subset of their sections present. Empty data entries
/// and metadata slots are included.
pub fn blocks() -> impl Strategy<Value = Block> {
    let header = (any::<u64>(), payload(32), payload(32)).prop_map(
        |(number, previous_hash, data_hash)| BlockHeader {
            number,
            previous_hash,
            data_hash,
        },
    );
    let data = prop::collection::vec(payload(64), 0..4).prop_map(|data| BlockData { data });
    let metadata = prop::collection::vec(payload(16), 0..=BlockMetadataIndex::COUNT)
        .prop_map(|metadata| BlockMetadata { metadata });
    let extension = prop::collection::vec(payload(32), 0..3)
        .prop_map(|extension_data| BlockExtension { extension_data });

    (
        option::of(header),
        option::of(data),
        option::of(metadata),
        option::of(extension),
    )
        .prop_map(|(header, data, metadata, extension)| Block {
            header,
            data,
            metadata,
            extension,
        })
}

fn config_value() -> impl Strategy<Value = ConfigValue> {
    (any::<u64>(), payload(32), config_name()).prop_map(|(version, value, mod_policy)| {
        ConfigValue {
            version,
            value,
            mod_policy,
        }
    })
}

fn config_policy() -> impl Strategy<Value = ConfigPolicy> {
    (any::<u64>(), payload(32), config_name()).prop_map(|(version, policy, mod_policy)| {
        ConfigPolicy {
            version,
            policy,
            mod_policy,
        }
    })
}

/// Config trees up to three groups deep.
pub fn config_groups() -> impl Strategy<Value = ConfigGroup> {
    let leaf = (
        any::<u64>(),
        prop::collection::btree_map(config_name(), config_value(), 0..3),
        prop::collection::btree_map(config_name(), config_policy(), 0..3),
        config_name(),
    )
        .prop_map(|(version, values, policies, mod_policy)| ConfigGroup {
            version,
            groups: BTreeMap::new(),
            values,
            policies,
            mod_policy,
        });

    leaf.prop_recursive(3, 16, 3, |inner| {
        (
            any::<u64>(),
            prop::collection::btree_map(config_name(), inner, 0..3),
            prop::collection::btree_map(config_name(), config_value(), 0..2),
            config_name(),
        )
            .prop_map(|(version, groups, values, mod_policy)| ConfigGroup {
                version,
                groups,
                values,
                policies: BTreeMap::new(),
                mod_policy,
            })
    })
}

pub fn config_envelopes() -> impl Strategy<Value = ConfigEnvelope> {
    let config = (any::<u64>(), option::of(config_groups())).prop_map(|(sequence, channel_group)| {
        Config {
            sequence,
            channel_group,
        }
    });
    (option::of(config), option::of(envelopes())).prop_map(|(config, last_update)| {
        ConfigEnvelope {
            config,
            last_update,
        }
    })
}

pub fn config_updates() -> impl Strategy<Value = ConfigUpdate> {
    (
        channel_id(),
        option::of(config_groups()),
        option::of(config_groups()),
        prop::collection::btree_map(config_name(), payload(32), 0..3),
    )
        .prop_map(|(channel_id, read_set, write_set, isolated_data)| ConfigUpdate {
            channel_id,
            read_set,
            write_set,
            isolated_data,
        })
}

pub fn config_update_envelopes() -> impl Strategy<Value = ConfigUpdateEnvelope> {
    let signature = (payload(64), payload(64)).prop_map(|(signature_header, signature)| {
        ConfigSignature {
            signature_header,
            signature,
        }
    });
    (payload(256), prop::collection::vec(signature, 0..3)).prop_map(
        |(config_update, signatures)| ConfigUpdateEnvelope {
            config_update,
            signatures,
        },
    )
}

/// Parameters for generating an envelope.
#[derive(Debug, Clone)]
pub struct EnvelopeParams {
    pub signer: LocalSigner,
    pub header_type: HeaderType,
    pub channel_id: String,
    pub nonce: [u8; NONCE_SIZE],
    pub epoch: u64,
    pub data: Vec<u8>,
}

impl Arbitrary for EnvelopeParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            signer(),
            header_type(),
            channel_id(),
            any::<[u8; NONCE_SIZE]>(),
            any::<u64>(),
            payload(512),
        )
            .prop_map(|(signer, header_type, channel_id, nonce, epoch, data)| EnvelopeParams {
                signer,
                header_type,
                channel_id,
                nonce,
                epoch,
                data,
            })
            .boxed()
    }
}

/// Build a signed envelope from parameters, using the given nonce.
pub fn envelope_from_params(params: &EnvelopeParams) -> Envelope {
    let mut channel_header =
        make_channel_header(params.header_type, 0, &params.channel_id, params.epoch);
    let signature_header = make_signature_header(&params.signer.serialize(), &params.nonce);
    set_tx_id(&mut channel_header, &signature_header);

    let payload = Payload {
        header: Some(make_payload_header(&channel_header, &signature_header)),
        data: params.data.clone(),
    }
    .encode();
    let signature = params.signer.sign(&payload).expect("local signing");
    Envelope { payload, signature }
}
