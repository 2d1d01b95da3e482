//! # chainwire core
//!
//! The transaction envelope protocol of a permissioned ledger ordering
//! service: message types, their canonical wire codec, header extraction,
//! transaction ids and nonces.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Envelope`] - Signed wrapper around every transaction
//! - [`ChannelHeader`] / [`SignatureHeader`] - Routing and creator data
//! - [`Block`] - Ordered batch of encoded envelopes plus metadata
//! - [`ConfigGroup`] - Node of the channel configuration tree
//!
//! ## Wire Format
//!
//! All messages are encoded as deterministic CBOR. See [`canonical`].

pub mod block;
pub mod canonical;
pub mod config;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod extract;
pub mod identity;
pub mod nonce;
pub mod signed_data;
pub mod types;

pub use block::{
    block_data_hash, block_header_hash, is_config_block, last_config_index, new_block, Block,
    BlockData, BlockExtension, BlockHeader, BlockMetadata, LastConfig, Metadata,
    MetadataSignature, OrdererBlockMetadata,
};
pub use canonical::Message;
pub use config::{
    config_update_from_payload, BatchSize, Capabilities, Config, ConfigEnvelope, ConfigGroup,
    ConfigPolicy, ConfigSignature, ConfigUpdate, ConfigUpdateEnvelope, ConfigValue,
};
pub use crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
pub use envelope::{
    compute_tx_id, create_signed_envelope, make_channel_header, make_payload_header,
    make_signature_header, new_signature_header, set_tx_id, ChannelHeader, Envelope, Header,
    Payload, SignatureHeader,
};
pub use error::{CoreError, FatalError, Result};
pub use extract::{
    channel_header, channel_id, envelope_to_config_update, extract_envelope,
    unmarshal_envelope_of_type,
};
pub use identity::{IdentityExpiry, LocalSigner, SerializedIdentity, SerializedIdentityExpiry, Signer};
pub use nonce::{create_nonce, NONCE_SIZE};
pub use signed_data::{envelope_as_signed_data, verify_signed_data, SignedData};
pub use types::{BlockMetadataIndex, HeaderType, Status, Timestamp};
