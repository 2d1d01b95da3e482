//! Shared enumerations and small value types of the envelope protocol.
//!
//! Numeric tags cross process and network boundaries, so they must match
//! the shared schema exactly.

use ciborium::value::Value;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::canonical::{FieldMap, Fields, Message};
use crate::error::CoreError;

/// The declared type of an envelope, carried in its channel header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum HeaderType {
    /// Opaque application message.
    Message = 0,
    /// Full channel configuration.
    Config = 1,
    /// Incremental configuration change request.
    ConfigUpdate = 2,
    /// Endorsed application transaction.
    EndorserTransaction = 3,
    /// Orderer management transaction.
    OrdererTransaction = 4,
    /// Delivery seek request.
    DeliverSeekInfo = 5,
    /// Chaincode install package.
    ChaincodePackage = 6,
    /// Peer administrative operation.
    PeerAdminOperation = 8,
}

impl HeaderType {
    /// Convert to the wire tag.
    pub fn to_i32(self) -> i32 {
        self as i32
    }

    /// Try to parse a wire tag.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Message),
            1 => Some(Self::Config),
            2 => Some(Self::ConfigUpdate),
            3 => Some(Self::EndorserTransaction),
            4 => Some(Self::OrdererTransaction),
            5 => Some(Self::DeliverSeekInfo),
            6 => Some(Self::ChaincodePackage),
            8 => Some(Self::PeerAdminOperation),
            _ => None,
        }
    }

    /// Schema name of the type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "MESSAGE",
            Self::Config => "CONFIG",
            Self::ConfigUpdate => "CONFIG_UPDATE",
            Self::EndorserTransaction => "ENDORSER_TRANSACTION",
            Self::OrdererTransaction => "ORDERER_TRANSACTION",
            Self::DeliverSeekInfo => "DELIVER_SEEK_INFO",
            Self::ChaincodePackage => "CHAINCODE_PACKAGE",
            Self::PeerAdminOperation => "PEER_ADMIN_OPERATION",
        }
    }

    /// Render a raw tag, falling back to the number for unknown tags.
    pub fn describe(tag: i32) -> String {
        match Self::from_i32(tag) {
            Some(kind) => kind.as_str().to_string(),
            None => tag.to_string(),
        }
    }

    /// Whether envelopes of this type carry channel configuration.
    pub fn is_config(self) -> bool {
        matches!(self, Self::Config | Self::OrdererTransaction)
    }
}

impl fmt::Display for HeaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed positions within a block's metadata sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum BlockMetadataIndex {
    Signatures = 0,
    LastConfig = 1,
    TransactionsFilter = 2,
    Orderer = 3,
    CommitHash = 4,
}

impl BlockMetadataIndex {
    /// Number of metadata slots every block carries.
    pub const COUNT: usize = 5;

    /// Position in the metadata sequence.
    pub fn as_usize(self) -> usize {
        self as usize
    }
}

/// Response status codes shared with the delivery and broadcast services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Status {
    Success = 200,
    BadRequest = 400,
    Forbidden = 403,
    NotFound = 404,
    RequestEntityTooLarge = 413,
    InternalServerError = 500,
    ServiceUnavailable = 503,
}

impl Status {
    /// Numeric code.
    pub fn code(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Success => "SUCCESS",
            Status::BadRequest => "BAD_REQUEST",
            Status::Forbidden => "FORBIDDEN",
            Status::NotFound => "NOT_FOUND",
            Status::RequestEntityTooLarge => "REQUEST_ENTITY_TOO_LARGE",
            Status::InternalServerError => "INTERNAL_SERVER_ERROR",
            Status::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        };
        write!(f, "{} ({})", name, self.code())
    }
}

/// Wall-clock time as whole seconds plus nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i32,
}

impl Timestamp {
    /// The current time, truncated to whole seconds.
    pub fn now() -> Self {
        let seconds = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_secs() as i64,
            Err(before) => -(before.duration().as_secs() as i64),
        };
        Self { seconds, nanos: 0 }
    }
}

mod keys {
    pub const SECONDS: u64 = 1;
    pub const NANOS: u64 = 2;
}

impl Message for Timestamp {
    const KIND: &'static str = "Timestamp";

    fn to_value(&self) -> Value {
        FieldMap::new()
            .int(keys::SECONDS, self.seconds)
            .int(keys::NANOS, self.nanos.into())
            .build()
    }

    fn from_value(value: &Value) -> Result<Self, CoreError> {
        let fields = Fields::of(Self::KIND, value)?;
        Ok(Self {
            seconds: fields.int(keys::SECONDS, "seconds")?,
            nanos: fields.i32(keys::NANOS, "nanos")?,
        })
    }
}
