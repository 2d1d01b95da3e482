//! Typed extraction of headers and bodies from envelopes and blocks.

use crate::block::Block;
use crate::canonical::Message;
use crate::config::ConfigUpdateEnvelope;
use crate::envelope::{ChannelHeader, Envelope, Payload};
use crate::error::CoreError;
use crate::types::HeaderType;

/// Decode an envelope whose channel header must declare `expected`, along
/// with its body.
///
/// Checks run in a fixed order: payload, header presence, channel header,
/// type, body. The first failure is reported.
pub fn unmarshal_envelope_of_type<M: Message>(
    envelope: &Envelope,
    expected: HeaderType,
) -> Result<(ChannelHeader, M), CoreError> {
    let payload = Payload::decode(&envelope.payload)?;
    let header = payload.header.ok_or(CoreError::MissingHeader)?;
    let channel_header = ChannelHeader::decode(&header.channel_header)?;

    if channel_header.header_type != expected.to_i32() {
        return Err(CoreError::TypeMismatch {
            actual: channel_header.header_type,
            expected,
        });
    }

    let body = M::decode(&payload.data)?;
    Ok((channel_header, body))
}

/// The channel header of an envelope.
pub fn channel_header(envelope: Option<&Envelope>) -> Result<ChannelHeader, CoreError> {
    let envelope = envelope.ok_or(CoreError::NilEnvelope)?;
    let payload = Payload::decode(&envelope.payload)?;
    let header = payload.header.ok_or(CoreError::MissingHeader)?;

    if header.channel_header.is_empty() {
        return Err(CoreError::MissingChannelHeader);
    }

    ChannelHeader::decode(&header.channel_header)
        .map_err(|e| CoreError::MalformedChannelHeader(e.to_string()))
}

/// The channel id an envelope is addressed to.
pub fn channel_id(envelope: Option<&Envelope>) -> Result<String, CoreError> {
    Ok(channel_header(envelope)?.channel_id)
}

/// Decode the body of a CONFIG_UPDATE envelope.
pub fn envelope_to_config_update(
    envelope: Option<&Envelope>,
) -> Result<ConfigUpdateEnvelope, CoreError> {
    let envelope = envelope.ok_or(CoreError::NilEnvelope)?;
    let (_, update) = unmarshal_envelope_of_type(envelope, HeaderType::ConfigUpdate)?;
    Ok(update)
}

/// Decode the envelope at `index` of a block's data.
pub fn extract_envelope(block: &Block, index: usize) -> Result<Envelope, CoreError> {
    let data = block.data.as_ref().ok_or(CoreError::NilBlockData)?;
    let raw = data
        .data
        .get(index)
        .ok_or(CoreError::EnvelopeIndexOutOfBounds {
            index,
            count: data.data.len(),
        })?;
    Envelope::decode(raw)
}
