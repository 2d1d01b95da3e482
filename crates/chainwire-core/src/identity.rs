//! Signing identities.
//!
//! A creator is carried on the wire as an opaque serialized identity. This
//! crate supplies one concrete encoding ([`SerializedIdentity`]) backed by
//! Ed25519, and the two seams the rest of the system depends on: producing
//! signatures ([`Signer`]) and learning when an identity stops being valid
//! ([`IdentityExpiry`]).

use ciborium::value::Value;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::canonical::{FieldMap, Fields, Message};
use crate::crypto::{Ed25519PublicKey, Keypair};
use crate::error::CoreError;

/// Something that can sign on behalf of an identity.
pub trait Signer: Send + Sync {
    /// The serialized identity placed in signature headers as the creator.
    fn serialize(&self) -> Vec<u8>;

    /// Sign a message.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CoreError>;
}

/// Resolves the expiration time of a serialized identity.
pub trait IdentityExpiry: Send + Sync {
    /// `None` means the identity has no known expiration, which includes
    /// identities that cannot be parsed. Those never count as expired.
    fn expires_at(&self, identity: &[u8]) -> Option<SystemTime>;
}

mod keys {
    pub const MSP_ID: u64 = 1;
    pub const PUBLIC_KEY: u64 = 2;
    pub const NOT_AFTER: u64 = 3;
}

/// Wire form of an identity: membership provider id, public key and an
/// expiry in Unix seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedIdentity {
    pub msp_id: String,
    pub public_key: Ed25519PublicKey,
    /// Zero means the identity never expires.
    pub not_after: i64,
}

impl SerializedIdentity {
    /// Expiry as a wall-clock time.
    pub fn expires_at(&self) -> Option<SystemTime> {
        let secs = self.not_after;
        if secs == 0 {
            None
        } else if secs > 0 {
            UNIX_EPOCH.checked_add(Duration::from_secs(secs as u64))
        } else {
            UNIX_EPOCH.checked_sub(Duration::from_secs(secs.unsigned_abs()))
        }
    }
}

impl Message for SerializedIdentity {
    const KIND: &'static str = "SerializedIdentity";

    fn to_value(&self) -> Value {
        FieldMap::new()
            .text(keys::MSP_ID, &self.msp_id)
            .bytes(keys::PUBLIC_KEY, self.public_key.as_bytes())
            .int(keys::NOT_AFTER, self.not_after)
            .build()
    }

    fn from_value(value: &Value) -> Result<Self, CoreError> {
        let fields = Fields::of(Self::KIND, value)?;
        let key_bytes = fields.bytes(keys::PUBLIC_KEY, "public_key")?;
        let public_key = Ed25519PublicKey::from_slice(&key_bytes)
            .map_err(|_| CoreError::malformed(Self::KIND, "invalid public_key"))?;
        Ok(Self {
            msp_id: fields.text(keys::MSP_ID, "msp_id")?,
            public_key,
            not_after: fields.int(keys::NOT_AFTER, "not_after")?,
        })
    }
}

/// An in-process Ed25519 signer.
#[derive(Debug, Clone)]
pub struct LocalSigner {
    msp_id: String,
    keypair: Keypair,
    not_after: i64,
}

impl LocalSigner {
    pub fn new(msp_id: impl Into<String>, keypair: Keypair) -> Self {
        Self {
            msp_id: msp_id.into(),
            keypair,
            not_after: 0,
        }
    }

    /// Stamp an expiry (Unix seconds) into the serialized identity. Zero
    /// clears it.
    pub fn with_expiry(mut self, not_after: i64) -> Self {
        self.not_after = not_after;
        self
    }

    pub fn identity(&self) -> SerializedIdentity {
        SerializedIdentity {
            msp_id: self.msp_id.clone(),
            public_key: self.keypair.public_key(),
            not_after: self.not_after,
        }
    }
}

impl Signer for LocalSigner {
    fn serialize(&self) -> Vec<u8> {
        self.identity().encode()
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CoreError> {
        Ok(self.keypair.sign(message).to_vec())
    }
}

/// Reads expiry straight out of a [`SerializedIdentity`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SerializedIdentityExpiry;

impl IdentityExpiry for SerializedIdentityExpiry {
    fn expires_at(&self, identity: &[u8]) -> Option<SystemTime> {
        SerializedIdentity::decode(identity).ok()?.expires_at()
    }
}
