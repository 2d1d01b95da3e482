//! Blocks, block metadata and the config classifier.

use ciborium::value::Value;

use crate::canonical::{FieldMap, Fields, Message};
use crate::crypto::Blake3Hash;
use crate::envelope::{ChannelHeader, Payload};
use crate::error::CoreError;
use crate::extract::extract_envelope;
use crate::types::{BlockMetadataIndex, HeaderType};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Block {
    pub header: Option<BlockHeader>,
    pub data: Option<BlockData>,
    pub metadata: Option<BlockMetadata>,
    pub extension: Option<BlockExtension>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockHeader {
    pub number: u64,
    pub previous_hash: Vec<u8>,
    pub data_hash: Vec<u8>,
}

/// Ordered, encoded envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockData {
    pub data: Vec<Vec<u8>>,
}

/// Metadata slots, indexed by [`BlockMetadataIndex`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockMetadata {
    pub metadata: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockExtension {
    pub extension_data: Vec<Vec<u8>>,
}

/// A metadata slot's content.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Metadata {
    pub value: Vec<u8>,
    pub signatures: Vec<MetadataSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetadataSignature {
    pub signature_header: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Points at the most recent config block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LastConfig {
    pub index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrdererBlockMetadata {
    pub last_config: Option<LastConfig>,
    pub consenter_metadata: Vec<u8>,
}

mod keys {
    pub mod block {
        pub const HEADER: u64 = 1;
        pub const DATA: u64 = 2;
        pub const METADATA: u64 = 3;
        pub const EXTENSION: u64 = 4;
    }
    pub mod header {
        pub const NUMBER: u64 = 1;
        pub const PREVIOUS_HASH: u64 = 2;
        pub const DATA_HASH: u64 = 3;
    }
    pub const DATA: u64 = 1;
    pub const METADATA: u64 = 1;
    pub const EXTENSION_DATA: u64 = 1;
    pub mod metadata {
        pub const VALUE: u64 = 1;
        pub const SIGNATURES: u64 = 2;
    }
    pub mod signature {
        pub const SIGNATURE_HEADER: u64 = 1;
        pub const SIGNATURE: u64 = 2;
    }
    pub const LAST_CONFIG_INDEX: u64 = 1;
    pub mod orderer {
        pub const LAST_CONFIG: u64 = 1;
        pub const CONSENTER_METADATA: u64 = 2;
    }
}

impl Message for Block {
    const KIND: &'static str = "Block";

    fn to_value(&self) -> Value {
        FieldMap::new()
            .message(keys::block::HEADER, self.header.as_ref())
            .message(keys::block::DATA, self.data.as_ref())
            .message(keys::block::METADATA, self.metadata.as_ref())
            .message(keys::block::EXTENSION, self.extension.as_ref())
            .build()
    }

    fn from_value(value: &Value) -> Result<Self, CoreError> {
        let f = Fields::of(Self::KIND, value)?;
        Ok(Self {
            header: f.message(keys::block::HEADER, "header")?,
            data: f.message(keys::block::DATA, "data")?,
            metadata: f.message(keys::block::METADATA, "metadata")?,
            extension: f.message(keys::block::EXTENSION, "extension")?,
        })
    }
}

impl Message for BlockHeader {
    const KIND: &'static str = "BlockHeader";

    fn to_value(&self) -> Value {
        FieldMap::new()
            .uint(keys::header::NUMBER, self.number)
            .bytes(keys::header::PREVIOUS_HASH, &self.previous_hash)
            .bytes(keys::header::DATA_HASH, &self.data_hash)
            .build()
    }

    fn from_value(value: &Value) -> Result<Self, CoreError> {
        let f = Fields::of(Self::KIND, value)?;
        Ok(Self {
            number: f.uint(keys::header::NUMBER, "number")?,
            previous_hash: f.bytes(keys::header::PREVIOUS_HASH, "previous_hash")?,
            data_hash: f.bytes(keys::header::DATA_HASH, "data_hash")?,
        })
    }
}

impl Message for BlockData {
    const KIND: &'static str = "BlockData";

    fn to_value(&self) -> Value {
        FieldMap::new().bytes_list(keys::DATA, &self.data).build()
    }

    fn from_value(value: &Value) -> Result<Self, CoreError> {
        let f = Fields::of(Self::KIND, value)?;
        Ok(Self {
            data: f.bytes_list(keys::DATA, "data")?,
        })
    }
}

impl Message for BlockMetadata {
    const KIND: &'static str = "BlockMetadata";

    fn to_value(&self) -> Value {
        FieldMap::new().bytes_list(keys::METADATA, &self.metadata).build()
    }

    fn from_value(value: &Value) -> Result<Self, CoreError> {
        let f = Fields::of(Self::KIND, value)?;
        Ok(Self {
            metadata: f.bytes_list(keys::METADATA, "metadata")?,
        })
    }
}

impl Message for BlockExtension {
    const KIND: &'static str = "BlockExtension";

    fn to_value(&self) -> Value {
        FieldMap::new()
            .bytes_list(keys::EXTENSION_DATA, &self.extension_data)
            .build()
    }

    fn from_value(value: &Value) -> Result<Self, CoreError> {
        let f = Fields::of(Self::KIND, value)?;
        Ok(Self {
            extension_data: f.bytes_list(keys::EXTENSION_DATA, "extension_data")?,
        })
    }
}

impl Message for Metadata {
    const KIND: &'static str = "Metadata";

    fn to_value(&self) -> Value {
        FieldMap::new()
            .bytes(keys::metadata::VALUE, &self.value)
            .messages(keys::metadata::SIGNATURES, &self.signatures)
            .build()
    }

    fn from_value(value: &Value) -> Result<Self, CoreError> {
        let f = Fields::of(Self::KIND, value)?;
        Ok(Self {
            value: f.bytes(keys::metadata::VALUE, "value")?,
            signatures: f.messages(keys::metadata::SIGNATURES, "signatures")?,
        })
    }
}

impl Message for MetadataSignature {
    const KIND: &'static str = "MetadataSignature";

    fn to_value(&self) -> Value {
        FieldMap::new()
            .bytes(keys::signature::SIGNATURE_HEADER, &self.signature_header)
            .bytes(keys::signature::SIGNATURE, &self.signature)
            .build()
    }

    fn from_value(value: &Value) -> Result<Self, CoreError> {
        let f = Fields::of(Self::KIND, value)?;
        Ok(Self {
            signature_header: f.bytes(keys::signature::SIGNATURE_HEADER, "signature_header")?,
            signature: f.bytes(keys::signature::SIGNATURE, "signature")?,
        })
    }
}

impl Message for LastConfig {
    const KIND: &'static str = "LastConfig";

    fn to_value(&self) -> Value {
        FieldMap::new().uint(keys::LAST_CONFIG_INDEX, self.index).build()
    }

    fn from_value(value: &Value) -> Result<Self, CoreError> {
        let f = Fields::of(Self::KIND, value)?;
        Ok(Self {
            index: f.uint(keys::LAST_CONFIG_INDEX, "index")?,
        })
    }
}

impl Message for OrdererBlockMetadata {
    const KIND: &'static str = "OrdererBlockMetadata";

    fn to_value(&self) -> Value {
        FieldMap::new()
            .message(keys::orderer::LAST_CONFIG, self.last_config.as_ref())
            .bytes(keys::orderer::CONSENTER_METADATA, &self.consenter_metadata)
            .build()
    }

    fn from_value(value: &Value) -> Result<Self, CoreError> {
        let f = Fields::of(Self::KIND, value)?;
        Ok(Self {
            last_config: f.message(keys::orderer::LAST_CONFIG, "last_config")?,
            consenter_metadata: f.bytes(keys::orderer::CONSENTER_METADATA, "consenter_metadata")?,
        })
    }
}

impl Block {
    /// Block number, or zero if the header is missing.
    pub fn number(&self) -> u64 {
        self.header.as_ref().map_or(0, |h| h.number)
    }

    /// Write a metadata slot, materializing the slot table if needed.
    pub fn set_metadata(&mut self, index: BlockMetadataIndex, value: Vec<u8>) {
        let metadata = self.metadata.get_or_insert_with(BlockMetadata::default);
        if metadata.metadata.len() < BlockMetadataIndex::COUNT {
            metadata.metadata.resize(BlockMetadataIndex::COUNT, Vec::new());
        }
        metadata.metadata[index.as_usize()] = value;
    }

    /// Raw bytes of a metadata slot; empty if absent.
    pub fn metadata_slot(&self, index: BlockMetadataIndex) -> &[u8] {
        self.metadata
            .as_ref()
            .and_then(|m| m.metadata.get(index.as_usize()))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
    /// Replace the data entries and stamp their hash into the header.
    pub fn set_data(&mut self, entries: Vec<Vec<u8>>) {
        let data = BlockData { data: entries };
        if let Some(header) = self.header.as_mut() {
            header.data_hash = block_data_hash(&data);
        }
        self.data = Some(data);
    }

    /// Point both the LAST_CONFIG slot and the orderer metadata in the
    /// SIGNATURES slot at config block `index`.
    pub fn set_last_config(&mut self, index: u64) {
        let last_config = LastConfig { index };
        self.set_metadata(
            BlockMetadataIndex::LastConfig,
            Metadata {
                value: last_config.encode(),
                signatures: Vec::new(),
            }
            .encode(),
        );
        self.set_metadata(
            BlockMetadataIndex::Signatures,
            Metadata {
                value: OrdererBlockMetadata {
                    last_config: Some(last_config),
                    consenter_metadata: Vec::new(),
                }
                .encode(),
                signatures: Vec::new(),
            }
            .encode(),
        );
    }
}

/// A block with empty data and one empty metadata slot per index.
pub fn new_block(number: u64, previous_hash: &[u8]) -> Block {
    Block {
        header: Some(BlockHeader {
            number,
            previous_hash: previous_hash.to_vec(),
            data_hash: Vec::new(),
        }),
        data: Some(BlockData::default()),
        metadata: Some(BlockMetadata {
            metadata: vec![Vec::new(); BlockMetadataIndex::COUNT],
        }),
        extension: None,
    }
}

/// BLAKE3 over the concatenation of the data entries.
pub fn block_data_hash(data: &BlockData) -> Vec<u8> {
    let parts: Vec<&[u8]> = data.data.iter().map(Vec::as_slice).collect();
    Blake3Hash::hash_concat(&parts).to_vec()
}

/// BLAKE3 of the encoded header; the next block's `previous_hash`.
pub fn block_header_hash(header: &BlockHeader) -> Vec<u8> {
    Blake3Hash::hash(&header.encode()).to_vec()
}

/// Whether the block's first transaction carries channel configuration.
///
/// Fails closed: any decode problem or missing piece yields `false`.
pub fn is_config_block(block: &Block) -> bool {
    let Ok(envelope) = extract_envelope(block, 0) else {
        return false;
    };
    let Ok(payload) = Payload::decode(&envelope.payload) else {
        return false;
    };
    let Some(header) = payload.header else {
        return false;
    };
    let Ok(channel_header) = ChannelHeader::decode(&header.channel_header) else {
        return false;
    };

    channel_header.kind().is_some_and(HeaderType::is_config)
}

/// Index of the config block this block points at.
///
/// Prefers the orderer metadata carried in the SIGNATURES slot and falls
/// back to the LAST_CONFIG slot written by older orderers.
pub fn last_config_index(block: &Block) -> Result<u64, CoreError> {
    let signatures = Metadata::decode(block.metadata_slot(BlockMetadataIndex::Signatures))?;
    if !signatures.value.is_empty() {
        let orderer = OrdererBlockMetadata::decode(&signatures.value)?;
        if let Some(last_config) = orderer.last_config {
            return Ok(last_config.index);
        }
    }

    let legacy = Metadata::decode(block.metadata_slot(BlockMetadataIndex::LastConfig))?;
    if legacy.value.is_empty() {
        return Err(CoreError::malformed(
            Block::KIND,
            "no last config index in metadata",
        ));
    }
    Ok(LastConfig::decode(&legacy.value)?.index)
}
