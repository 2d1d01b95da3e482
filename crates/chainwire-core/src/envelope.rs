//! Envelope framing: the wrapper around every submitted transaction.
//!
//! ```text
//! Envelope { payload: bytes(Payload), signature }
//!   Payload { header: Header, data }
//!     Header { channel_header: bytes(ChannelHeader),
//!              signature_header: bytes(SignatureHeader) }
//! ```
//!
//! The two sub-headers stay encoded inside `Header` so that each can be
//! decoded lazily and independently of the other.

use ciborium::value::Value;

use crate::canonical::{FieldMap, Fields, Message};
use crate::crypto::Blake3Hash;
use crate::error::CoreError;
use crate::identity::Signer;
use crate::nonce::create_nonce;
use crate::types::{HeaderType, Timestamp};

/// Signed, serialized payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Payload {
    pub header: Option<Header>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    pub channel_header: Vec<u8>,
    pub signature_header: Vec<u8>,
}

/// Routing and identification data for a transaction.
///
/// `header_type` keeps the raw wire tag so unknown types survive decoding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelHeader {
    pub header_type: i32,
    pub version: i32,
    pub timestamp: Option<Timestamp>,
    pub channel_id: String,
    pub tx_id: String,
    pub epoch: u64,
    pub extension: Vec<u8>,
}

impl ChannelHeader {
    /// The declared type, if the tag is known.
    pub fn kind(&self) -> Option<HeaderType> {
        HeaderType::from_i32(self.header_type)
    }
}

/// Who created the transaction, plus a replay-protection nonce.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignatureHeader {
    pub creator: Vec<u8>,
    pub nonce: Vec<u8>,
}

mod keys {
    pub mod envelope {
        pub const PAYLOAD: u64 = 1;
        pub const SIGNATURE: u64 = 2;
    }
    pub mod payload {
        pub const HEADER: u64 = 1;
        pub const DATA: u64 = 2;
    }
    pub mod header {
        pub const CHANNEL_HEADER: u64 = 1;
        pub const SIGNATURE_HEADER: u64 = 2;
    }
    pub mod channel_header {
        pub const TYPE: u64 = 1;
        pub const VERSION: u64 = 2;
        pub const TIMESTAMP: u64 = 3;
        pub const CHANNEL_ID: u64 = 4;
        pub const TX_ID: u64 = 5;
        pub const EPOCH: u64 = 6;
        pub const EXTENSION: u64 = 7;
    }
    pub mod signature_header {
        pub const CREATOR: u64 = 1;
        pub const NONCE: u64 = 2;
    }
}

impl Message for Envelope {
    const KIND: &'static str = "Envelope";

    fn to_value(&self) -> Value {
        FieldMap::new()
            .bytes(keys::envelope::PAYLOAD, &self.payload)
            .bytes(keys::envelope::SIGNATURE, &self.signature)
            .build()
    }

    fn from_value(value: &Value) -> Result<Self, CoreError> {
        let f = Fields::of(Self::KIND, value)?;
        Ok(Self {
            payload: f.bytes(keys::envelope::PAYLOAD, "payload")?,
            signature: f.bytes(keys::envelope::SIGNATURE, "signature")?,
        })
    }
}

impl Message for Payload {
    const KIND: &'static str = "Payload";

    fn to_value(&self) -> Value {
        FieldMap::new()
            .message(keys::payload::HEADER, self.header.as_ref())
            .bytes(keys::payload::DATA, &self.data)
            .build()
    }

    fn from_value(value: &Value) -> Result<Self, CoreError> {
        let f = Fields::of(Self::KIND, value)?;
        Ok(Self {
            header: f.message(keys::payload::HEADER, "header")?,
            data: f.bytes(keys::payload::DATA, "data")?,
        })
    }
}

impl Message for Header {
    const KIND: &'static str = "Header";

    fn to_value(&self) -> Value {
        FieldMap::new()
            .bytes(keys::header::CHANNEL_HEADER, &self.channel_header)
            .bytes(keys::header::SIGNATURE_HEADER, &self.signature_header)
            .build()
    }

    fn from_value(value: &Value) -> Result<Self, CoreError> {
        let f = Fields::of(Self::KIND, value)?;
        Ok(Self {
            channel_header: f.bytes(keys::header::CHANNEL_HEADER, "channel_header")?,
            signature_header: f.bytes(keys::header::SIGNATURE_HEADER, "signature_header")?,
        })
    }
}

impl Message for ChannelHeader {
    const KIND: &'static str = "ChannelHeader";

    fn to_value(&self) -> Value {
        use keys::channel_header as k;
        FieldMap::new()
            .int(k::TYPE, self.header_type.into())
            .int(k::VERSION, self.version.into())
            .message(k::TIMESTAMP, self.timestamp.as_ref())
            .text(k::CHANNEL_ID, &self.channel_id)
            .text(k::TX_ID, &self.tx_id)
            .uint(k::EPOCH, self.epoch)
            .bytes(k::EXTENSION, &self.extension)
            .build()
    }

    fn from_value(value: &Value) -> Result<Self, CoreError> {
        use keys::channel_header as k;
        let f = Fields::of(Self::KIND, value)?;
        Ok(Self {
            header_type: f.i32(k::TYPE, "type")?,
            version: f.i32(k::VERSION, "version")?,
            timestamp: f.message(k::TIMESTAMP, "timestamp")?,
            channel_id: f.text(k::CHANNEL_ID, "channel_id")?,
            tx_id: f.text(k::TX_ID, "tx_id")?,
            epoch: f.uint(k::EPOCH, "epoch")?,
            extension: f.bytes(k::EXTENSION, "extension")?,
        })
    }
}

impl Message for SignatureHeader {
    const KIND: &'static str = "SignatureHeader";

    fn to_value(&self) -> Value {
        FieldMap::new()
            .bytes(keys::signature_header::CREATOR, &self.creator)
            .bytes(keys::signature_header::NONCE, &self.nonce)
            .build()
    }

    fn from_value(value: &Value) -> Result<Self, CoreError> {
        let f = Fields::of(Self::KIND, value)?;
        Ok(Self {
            creator: f.bytes(keys::signature_header::CREATOR, "creator")?,
            nonce: f.bytes(keys::signature_header::NONCE, "nonce")?,
        })
    }
}

/// Derive a transaction id: lowercase hex of BLAKE3(nonce || creator).
pub fn compute_tx_id(nonce: &[u8], creator: &[u8]) -> String {
    Blake3Hash::hash_concat(&[nonce, creator]).to_hex()
}

/// Set the channel header's tx id from its paired signature header.
pub fn set_tx_id(channel_header: &mut ChannelHeader, signature_header: &SignatureHeader) {
    channel_header.tx_id = compute_tx_id(&signature_header.nonce, &signature_header.creator);
}

/// Build a channel header stamped with the current time in whole seconds.
pub fn make_channel_header(
    header_type: HeaderType,
    version: i32,
    channel_id: &str,
    epoch: u64,
) -> ChannelHeader {
    ChannelHeader {
        header_type: header_type.to_i32(),
        version,
        timestamp: Some(Timestamp::now()),
        channel_id: channel_id.to_string(),
        epoch,
        ..Default::default()
    }
}

pub fn make_signature_header(creator: &[u8], nonce: &[u8]) -> SignatureHeader {
    SignatureHeader {
        creator: creator.to_vec(),
        nonce: nonce.to_vec(),
    }
}

/// Pair two sub-headers into an envelope header, encoding each.
pub fn make_payload_header(
    channel_header: &ChannelHeader,
    signature_header: &SignatureHeader,
) -> Header {
    Header {
        channel_header: channel_header.encode(),
        signature_header: signature_header.encode(),
    }
}

/// A signature header naming the signer as creator, with a fresh nonce.
pub fn new_signature_header(signer: &dyn Signer) -> Result<SignatureHeader, CoreError> {
    let nonce = create_nonce()?;
    Ok(make_signature_header(&signer.serialize(), &nonce))
}

/// Wrap a message in a complete envelope of the given type.
///
/// With a signer, the creator and nonce are filled in, the tx id is
/// derived, and the encoded payload is signed. Without one the headers
/// carry no creator and the envelope is unsigned.
pub fn create_signed_envelope<M: Message>(
    header_type: HeaderType,
    channel_id: &str,
    signer: Option<&dyn Signer>,
    data: &M,
    version: i32,
    epoch: u64,
) -> Result<Envelope, CoreError> {
    let mut channel_header = make_channel_header(header_type, version, channel_id, epoch);

    let signature_header = match signer {
        Some(signer) => {
            let signature_header = new_signature_header(signer)?;
            set_tx_id(&mut channel_header, &signature_header);
            signature_header
        }
        None => SignatureHeader::default(),
    };

    let payload = Payload {
        header: Some(make_payload_header(&channel_header, &signature_header)),
        data: data.encode(),
    }
    .encode();

    let signature = match signer {
        Some(signer) => signer.sign(&payload)?,
        None => Vec::new(),
    };

    Ok(Envelope { payload, signature })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::identity::{LocalSigner, SerializedIdentity};
    use proptest::prelude::*;

    #[test]
    fn test_tx_id_deterministic() {
        let a = compute_tx_id(b"nonce", b"creator");
        let b = compute_tx_id(b"nonce", b"creator");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        assert_ne!(a, compute_tx_id(b"nonce2", b"creator"));
        assert_ne!(a, compute_tx_id(b"nonce", b"creator2"));
    }

    proptest! {
        #[test]
        fn prop_tx_id_is_stable_hex(
            nonce in prop::collection::vec(any::<u8>(), 0..48),
            creator in prop::collection::vec(any::<u8>(), 0..128),
        ) {
            let id = compute_tx_id(&nonce, &creator);
            prop_assert_eq!(id.len(), 64);
            prop_assert_eq!(&id, &compute_tx_id(&nonce, &creator));
        }

        #[test]
        fn prop_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
            let _ = Envelope::decode(&bytes);
            let _ = Payload::decode(&bytes);
            let _ = ChannelHeader::decode(&bytes);
        }
    }

    #[test]
    fn test_tx_id_of_empty_creator() {
        let nonce = [0x11u8; 24];
        assert_eq!(compute_tx_id(&nonce, &[]), Blake3Hash::hash(&nonce).to_hex());
    }

    #[test]
    fn test_set_tx_id() {
        let mut ch = make_channel_header(HeaderType::Message, 1, "mychannel", 0);
        assert!(ch.tx_id.is_empty());

        let sh = make_signature_header(b"creator", b"nonce");
        set_tx_id(&mut ch, &sh);
        assert_eq!(ch.tx_id, compute_tx_id(b"nonce", b"creator"));
    }

    #[test]
    fn test_make_channel_header() {
        let ch = make_channel_header(HeaderType::EndorserTransaction, 3, "mychannel", 7);
        assert_eq!(ch.kind(), Some(HeaderType::EndorserTransaction));
        assert_eq!(ch.version, 3);
        assert_eq!(ch.channel_id, "mychannel");
        assert_eq!(ch.epoch, 7);
        let ts = ch.timestamp.unwrap();
        assert_eq!(ts.nanos, 0);
        assert!(ts.seconds > 0);
    }

    #[test]
    fn test_envelope_roundtrip() {
        let ch = make_channel_header(HeaderType::Config, 1, "mychannel", 0);
        let sh = make_signature_header(b"creator", &[3u8; 24]);
        let payload = Payload {
            header: Some(make_payload_header(&ch, &sh)),
            data: b"body".to_vec(),
        };
        let env = Envelope {
            payload: payload.encode(),
            signature: vec![1, 2, 3],
        };

        let decoded = Envelope::decode(&env.encode()).unwrap();
        assert_eq!(decoded, env);

        let payload2 = Payload::decode(&decoded.payload).unwrap();
        assert_eq!(payload2, payload);
        let header = payload2.header.unwrap();
        assert_eq!(ChannelHeader::decode(&header.channel_header).unwrap(), ch);
        assert_eq!(SignatureHeader::decode(&header.signature_header).unwrap(), sh);
    }

    #[test]
    fn test_unknown_header_type_survives_decoding() {
        let ch = ChannelHeader {
            header_type: 42,
            ..Default::default()
        };
        let decoded = ChannelHeader::decode(&ch.encode()).unwrap();
        assert_eq!(decoded.header_type, 42);
        assert_eq!(decoded.kind(), None);
    }

    #[test]
    fn test_create_signed_envelope() {
        let signer = LocalSigner::new("Org1MSP", Keypair::from_seed(&[5; 32]));
        let body = SignatureHeader {
            creator: b"inner".to_vec(),
            nonce: Vec::new(),
        };
        let env = create_signed_envelope(
            HeaderType::EndorserTransaction,
            "mychannel",
            Some(&signer as &dyn Signer),
            &body,
            0,
            0,
        )
        .unwrap();

        let payload = Payload::decode(&env.payload).unwrap();
        let header = payload.header.unwrap();
        let ch = ChannelHeader::decode(&header.channel_header).unwrap();
        let sh = SignatureHeader::decode(&header.signature_header).unwrap();

        assert_eq!(sh.creator, signer.serialize());
        assert_eq!(sh.nonce.len(), crate::nonce::NONCE_SIZE);
        assert_eq!(ch.tx_id, compute_tx_id(&sh.nonce, &sh.creator));
        assert_eq!(SignatureHeader::decode(&payload.data).unwrap(), body);

        let identity = SerializedIdentity::decode(&sh.creator).unwrap();
        identity.public_key.verify(&env.payload, &env.signature).unwrap();
    }

    #[test]
    fn test_create_unsigned_envelope() {
        let env = create_signed_envelope(
            HeaderType::Message,
            "mychannel",
            None,
            &Envelope::default(),
            0,
            0,
        )
        .unwrap();
        assert!(env.signature.is_empty());

        let payload = Payload::decode(&env.payload).unwrap();
        let header = payload.header.unwrap();
        let ch = ChannelHeader::decode(&header.channel_header).unwrap();
        assert!(ch.tx_id.is_empty());
        assert_eq!(
            SignatureHeader::decode(&header.signature_header).unwrap(),
            SignatureHeader::default()
        );
    }
}
