//! Channel configuration tree and config transaction bodies.

use ciborium::value::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::canonical::{FieldMap, Fields, Message};
use crate::envelope::Payload;
use crate::error::CoreError;
use crate::extract::envelope_to_config_update;

/// A node of the hierarchical channel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigGroup {
    pub version: u64,
    pub groups: BTreeMap<String, ConfigGroup>,
    pub values: BTreeMap<String, ConfigValue>,
    pub policies: BTreeMap<String, ConfigPolicy>,
    pub mod_policy: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigValue {
    pub version: u64,
    pub value: Vec<u8>,
    pub mod_policy: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigPolicy {
    pub version: u64,
    pub policy: Vec<u8>,
    pub mod_policy: String,
}

/// A full channel configuration at a given sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Config {
    pub sequence: u64,
    pub channel_group: Option<ConfigGroup>,
}

/// Body of a CONFIG envelope: the new config plus the update that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigEnvelope {
    pub config: Option<Config>,
    pub last_update: Option<crate::envelope::Envelope>,
}

/// A requested change to a channel's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigUpdate {
    pub channel_id: String,
    pub read_set: Option<ConfigGroup>,
    pub write_set: Option<ConfigGroup>,
    pub isolated_data: BTreeMap<String, Vec<u8>>,
}

/// Body of a CONFIG_UPDATE envelope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigUpdateEnvelope {
    pub config_update: Vec<u8>,
    pub signatures: Vec<ConfigSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigSignature {
    pub signature_header: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Capability names enabled for a config subtree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub capabilities: BTreeSet<String>,
}

impl Capabilities {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            capabilities: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains(name)
    }
}

/// Block cutting limits for the orderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSize {
    pub max_message_count: u32,
    pub absolute_max_bytes: u32,
    pub preferred_max_bytes: u32,
}

mod keys {
    pub mod group {
        pub const VERSION: u64 = 1;
        pub const GROUPS: u64 = 2;
        pub const VALUES: u64 = 3;
        pub const POLICIES: u64 = 4;
        pub const MOD_POLICY: u64 = 5;
    }
    pub mod item {
        pub const VERSION: u64 = 1;
        pub const CONTENT: u64 = 2;
        pub const MOD_POLICY: u64 = 3;
    }
    pub mod config {
        pub const SEQUENCE: u64 = 1;
        pub const CHANNEL_GROUP: u64 = 2;
    }
    pub mod config_envelope {
        pub const CONFIG: u64 = 1;
        pub const LAST_UPDATE: u64 = 2;
    }
    pub mod update {
        pub const CHANNEL_ID: u64 = 1;
        pub const READ_SET: u64 = 2;
        pub const WRITE_SET: u64 = 3;
        pub const ISOLATED_DATA: u64 = 5;
    }
    pub mod update_envelope {
        pub const CONFIG_UPDATE: u64 = 1;
        pub const SIGNATURES: u64 = 2;
    }
    pub mod signature {
        pub const SIGNATURE_HEADER: u64 = 1;
        pub const SIGNATURE: u64 = 2;
    }
    pub const CAPABILITIES: u64 = 1;
    pub mod batch_size {
        pub const MAX_MESSAGE_COUNT: u64 = 1;
        pub const ABSOLUTE_MAX_BYTES: u64 = 2;
        pub const PREFERRED_MAX_BYTES: u64 = 3;
    }
}

impl Message for ConfigGroup {
    const KIND: &'static str = "ConfigGroup";

    fn to_value(&self) -> Value {
        use keys::group as k;
        FieldMap::new()
            .uint(k::VERSION, self.version)
            .message_map(k::GROUPS, &self.groups)
            .message_map(k::VALUES, &self.values)
            .message_map(k::POLICIES, &self.policies)
            .text(k::MOD_POLICY, &self.mod_policy)
            .build()
    }

    fn from_value(value: &Value) -> Result<Self, CoreError> {
        use keys::group as k;
        let f = Fields::of(Self::KIND, value)?;
        Ok(Self {
            version: f.uint(k::VERSION, "version")?,
            groups: f.message_map(k::GROUPS, "groups")?,
            values: f.message_map(k::VALUES, "values")?,
            policies: f.message_map(k::POLICIES, "policies")?,
            mod_policy: f.text(k::MOD_POLICY, "mod_policy")?,
        })
    }
}

impl Message for ConfigValue {
    const KIND: &'static str = "ConfigValue";

    fn to_value(&self) -> Value {
        use keys::item as k;
        FieldMap::new()
            .uint(k::VERSION, self.version)
            .bytes(k::CONTENT, &self.value)
            .text(k::MOD_POLICY, &self.mod_policy)
            .build()
    }

    fn from_value(value: &Value) -> Result<Self, CoreError> {
        use keys::item as k;
        let f = Fields::of(Self::KIND, value)?;
        Ok(Self {
            version: f.uint(k::VERSION, "version")?,
            value: f.bytes(k::CONTENT, "value")?,
            mod_policy: f.text(k::MOD_POLICY, "mod_policy")?,
        })
    }
}

impl Message for ConfigPolicy {
    const KIND: &'static str = "ConfigPolicy";

    fn to_value(&self) -> Value {
        use keys::item as k;
        FieldMap::new()
            .uint(k::VERSION, self.version)
            .bytes(k::CONTENT, &self.policy)
            .text(k::MOD_POLICY, &self.mod_policy)
            .build()
    }

    fn from_value(value: &Value) -> Result<Self, CoreError> {
        use keys::item as k;
        let f = Fields::of(Self::KIND, value)?;
        Ok(Self {
            version: f.uint(k::VERSION, "version")?,
            policy: f.bytes(k::CONTENT, "policy")?,
            mod_policy: f.text(k::MOD_POLICY, "mod_policy")?,
        })
    }
}

impl Message for Config {
    const KIND: &'static str = "Config";

    fn to_value(&self) -> Value {
        FieldMap::new()
            .uint(keys::config::SEQUENCE, self.sequence)
            .message(keys::config::CHANNEL_GROUP, self.channel_group.as_ref())
            .build()
    }

    fn from_value(value: &Value) -> Result<Self, CoreError> {
        let f = Fields::of(Self::KIND, value)?;
        Ok(Self {
            sequence: f.uint(keys::config::SEQUENCE, "sequence")?,
            channel_group: f.message(keys::config::CHANNEL_GROUP, "channel_group")?,
        })
    }
}

impl Message for ConfigEnvelope {
    const KIND: &'static str = "ConfigEnvelope";

    fn to_value(&self) -> Value {
        FieldMap::new()
            .message(keys::config_envelope::CONFIG, self.config.as_ref())
            .message(keys::config_envelope::LAST_UPDATE, self.last_update.as_ref())
            .build()
    }

    fn from_value(value: &Value) -> Result<Self, CoreError> {
        let f = Fields::of(Self::KIND, value)?;
        Ok(Self {
            config: f.message(keys::config_envelope::CONFIG, "config")?,
            last_update: f.message(keys::config_envelope::LAST_UPDATE, "last_update")?,
        })
    }
}

impl Message for ConfigUpdate {
    const KIND: &'static str = "ConfigUpdate";

    fn to_value(&self) -> Value {
        use keys::update as k;
        FieldMap::new()
            .text(k::CHANNEL_ID, &self.channel_id)
            .message(k::READ_SET, self.read_set.as_ref())
            .message(k::WRITE_SET, self.write_set.as_ref())
            .bytes_map(k::ISOLATED_DATA, &self.isolated_data)
            .build()
    }

    fn from_value(value: &Value) -> Result<Self, CoreError> {
        use keys::update as k;
        let f = Fields::of(Self::KIND, value)?;
        Ok(Self {
            channel_id: f.text(k::CHANNEL_ID, "channel_id")?,
            read_set: f.message(k::READ_SET, "read_set")?,
            write_set: f.message(k::WRITE_SET, "write_set")?,
            isolated_data: f.bytes_map(k::ISOLATED_DATA, "isolated_data")?,
        })
    }
}

impl Message for ConfigUpdateEnvelope {
    const KIND: &'static str = "ConfigUpdateEnvelope";

    fn to_value(&self) -> Value {
        FieldMap::new()
            .bytes(keys::update_envelope::CONFIG_UPDATE, &self.config_update)
            .messages(keys::update_envelope::SIGNATURES, &self.signatures)
            .build()
    }

    fn from_value(value: &Value) -> Result<Self, CoreError> {
        let f = Fields::of(Self::KIND, value)?;
        Ok(Self {
            config_update: f.bytes(keys::update_envelope::CONFIG_UPDATE, "config_update")?,
            signatures: f.messages(keys::update_envelope::SIGNATURES, "signatures")?,
        })
    }
}

impl Message for ConfigSignature {
    const KIND: &'static str = "ConfigSignature";

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

impl Message for Capabilities {
    const KIND: &'static str = "Capabilities";

    fn to_value(&self) -> Value {
        FieldMap::new()
            .text_set(keys::CAPABILITIES, &self.capabilities)
            .build()
    }

    fn from_value(value: &Value) -> Result<Self, CoreError> {
        let f = Fields::of(Self::KIND, value)?;
        Ok(Self {
            capabilities: f.text_set(keys::CAPABILITIES, "capabilities")?,
        })
    }
}

impl Message for BatchSize {
    const KIND: &'static str = "BatchSize";

    fn to_value(&self) -> Value {
        use keys::batch_size as k;
        FieldMap::new()
            .uint(k::MAX_MESSAGE_COUNT, self.max_message_count.into())
            .uint(k::ABSOLUTE_MAX_BYTES, self.absolute_max_bytes.into())
            .uint(k::PREFERRED_MAX_BYTES, self.preferred_max_bytes.into())
            .build()
    }

    fn from_value(value: &Value) -> Result<Self, CoreError> {
        use keys::batch_size as k;
        let f = Fields::of(Self::KIND, value)?;
        let narrow = |key: u64, name: &str| -> Result<u32, CoreError> {
            let n = f.uint(key, name)?;
            u32::try_from(n)
                .map_err(|_| CoreError::malformed(Self::KIND, format!("invalid {}", name)))
        };
        Ok(Self {
            max_message_count: narrow(k::MAX_MESSAGE_COUNT, "max_message_count")?,
            absolute_max_bytes: narrow(k::ABSOLUTE_MAX_BYTES, "absolute_max_bytes")?,
            preferred_max_bytes: narrow(k::PREFERRED_MAX_BYTES, "preferred_max_bytes")?,
        })
    }
}

/// Recover the config update that produced a CONFIG payload.
///
/// Walks ConfigEnvelope → last_update envelope → ConfigUpdateEnvelope →
/// ConfigUpdate.
pub fn config_update_from_payload(payload: &Payload) -> Result<ConfigUpdate, CoreError> {
    let config_envelope = ConfigEnvelope::decode(&payload.data)?;
    let update_envelope = envelope_to_config_update(config_envelope.last_update.as_ref())?;
    ConfigUpdate::decode(&update_envelope.config_update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{make_channel_header, make_payload_header, Envelope, SignatureHeader};
    use crate::types::HeaderType;

    fn sample_group() -> ConfigGroup {
        let mut orderer = ConfigGroup {
            mod_policy: "Admins".into(),
            ..Default::default()
        };
        orderer.values.insert(
            "Capabilities".into(),
            ConfigValue {
                version: 0,
                value: Capabilities::new(["V1_1"]).encode(),
                mod_policy: "Admins".into(),
            },
        );
        orderer.policies.insert(
            "Writers".into(),
            ConfigPolicy {
                version: 2,
                policy: b"any".to_vec(),
                mod_policy: "Admins".into(),
            },
        );

        let mut root = ConfigGroup::default();
        root.groups.insert("Orderer".into(), orderer);
        root
    }

    #[test]
    fn test_config_group_roundtrip() {
        let group = sample_group();
        let decoded = ConfigGroup::decode(&group.encode()).unwrap();
        assert_eq!(decoded, group);

        let caps = &decoded.groups["Orderer"].values["Capabilities"];
        assert!(Capabilities::decode(&caps.value).unwrap().contains("V1_1"));
    }

    #[test]
    fn test_config_envelope_roundtrip() {
        let env = ConfigEnvelope {
            config: Some(Config {
                sequence: 3,
                channel_group: Some(sample_group()),
            }),
            last_update: Some(Envelope {
                payload: b"p".to_vec(),
                signature: b"s".to_vec(),
            }),
        };
        assert_eq!(ConfigEnvelope::decode(&env.encode()).unwrap(), env);
    }

    #[test]
    fn test_batch_size_rejects_overflow() {
        let value = FieldMap::new().uint(2, u64::from(u32::MAX) + 1).build();
        let bytes = crate::canonical::encode_canonical(&value);
        assert!(BatchSize::decode(&bytes).is_err());
    }

    #[test]
    fn test_config_update_from_payload() {
        let mut isolated_data = BTreeMap::new();
        isolated_data.insert("note".to_string(), b"hi".to_vec());
        let update = ConfigUpdate {
            channel_id: "mychannel".into(),
            read_set: Some(ConfigGroup::default()),
            write_set: Some(sample_group()),
            isolated_data,
        };
        let update_envelope = ConfigUpdateEnvelope {
            config_update: update.encode(),
            signatures: vec![ConfigSignature {
                signature_header: b"sh".to_vec(),
                signature: b"sig".to_vec(),
            }],
        };

        let ch = make_channel_header(HeaderType::ConfigUpdate, 0, "mychannel", 0);
        let last_update = Envelope {
            payload: Payload {
                header: Some(make_payload_header(&ch, &SignatureHeader::default())),
                data: update_envelope.encode(),
            }
            .encode(),
            signature: Vec::new(),
        };

        let payload = Payload {
            header: None,
            data: ConfigEnvelope {
                config: None,
                last_update: Some(last_update),
            }
            .encode(),
        };

        assert_eq!(config_update_from_payload(&payload).unwrap(), update);
    }

    #[test]
    fn test_config_update_from_payload_without_last_update() {
        let payload = Payload {
            header: None,
            data: ConfigEnvelope::default().encode(),
        };
        assert_eq!(
            config_update_from_payload(&payload),
            Err(CoreError::NilEnvelope)
        );
    }
}
