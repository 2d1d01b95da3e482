//! The (data, identity, signature) triple that signature checks consume.

use crate::canonical::Message;
use crate::envelope::{Envelope, Payload, SignatureHeader};
use crate::error::CoreError;
use crate::identity::SerializedIdentity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedData {
    pub data: Vec<u8>,
    pub identity: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Split an envelope into the data its creator signed.
///
/// Yields a single entry: the raw payload bytes, the creator from the
/// signature header, and the envelope signature.
pub fn envelope_as_signed_data(envelope: &Envelope) -> Result<Vec<SignedData>, CoreError> {
    let payload = Payload::decode(&envelope.payload)?;
    let header = payload.header.ok_or(CoreError::MissingHeader)?;
    let signature_header = SignatureHeader::decode(&header.signature_header)?;

    Ok(vec![SignedData {
        data: envelope.payload.clone(),
        identity: signature_header.creator,
        signature: envelope.signature.clone(),
    }])
}

/// Check a signature against the public key in its serialized identity.
pub fn verify_signed_data(signed: &SignedData) -> Result<(), CoreError> {
    let identity = SerializedIdentity::decode(&signed.identity)?;
    identity.public_key.verify(&signed.data, &signed.signature)
}
