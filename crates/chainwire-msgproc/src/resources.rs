//! Capability providers consulted by the rules.
//!
//! Rules receive their channel configuration through these traits at
//! construction time. [`ChannelResources`] is the stock provider, built from
//! the channel's config tree and refreshed whenever a config block lands.

use std::sync::{Arc, RwLock};

use chainwire_core::{BatchSize, Capabilities, ConfigGroup, CoreError, Message};

/// Name of the orderer group under the channel group.
pub const ORDERER_GROUP_KEY: &str = "Orderer";
/// Value key holding an encoded [`Capabilities`].
pub const CAPABILITIES_KEY: &str = "Capabilities";
/// Value key holding an encoded [`BatchSize`].
pub const BATCH_SIZE_KEY: &str = "BatchSize";

/// Orderer capabilities that turn on identity expiration checks.
pub const EXPIRATION_CAPABILITIES: [&str; 3] = ["V1_1", "V1_4_2", "V2_0"];

/// Used when the orderer group carries no `BatchSize`.
pub const DEFAULT_ABSOLUTE_MAX_BYTES: u32 = 10 * 1024 * 1024;

pub trait OrdererCapabilities: Send + Sync {
    /// Whether envelopes from expired identities are rejected.
    fn expiration_check(&self) -> bool;
}

pub trait OrdererConfig: Send + Sync {
    fn capabilities(&self) -> &dyn OrdererCapabilities;

    /// Largest envelope payload accepted, in bytes.
    fn absolute_max_bytes(&self) -> u32;
}

pub trait Resources: Send + Sync {
    /// The channel's orderer configuration, if the channel has one.
    fn orderer_config(&self) -> Option<Arc<dyn OrdererConfig>>;
}

/// Orderer capability flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilityFlags {
    pub expiration_check: bool,
}

impl CapabilityFlags {
    pub fn from_capabilities(capabilities: &Capabilities) -> Self {
        Self {
            expiration_check: EXPIRATION_CAPABILITIES
                .iter()
                .any(|name| capabilities.contains(name)),
        }
    }
}

impl OrdererCapabilities for CapabilityFlags {
    fn expiration_check(&self) -> bool {
        self.expiration_check
    }
}

/// Orderer settings read from a channel config tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrdererSettings {
    pub capabilities: CapabilityFlags,
    pub absolute_max_bytes: u32,
}

impl Default for OrdererSettings {
    fn default() -> Self {
        Self {
            capabilities: CapabilityFlags::default(),
            absolute_max_bytes: DEFAULT_ABSOLUTE_MAX_BYTES,
        }
    }
}

impl OrdererSettings {
    /// Read the orderer group of `channel_group`.
    ///
    /// Returns `Ok(None)` when there is no orderer group, and an error when
    /// one of its values does not decode.
    pub fn from_channel_group(channel_group: &ConfigGroup) -> Result<Option<Self>, CoreError> {
        let Some(orderer) = channel_group.groups.get(ORDERER_GROUP_KEY) else {
            return Ok(None);
        };

        let mut settings = Self::default();
        if let Some(value) = orderer.values.get(CAPABILITIES_KEY) {
            let capabilities = Capabilities::decode(&value.value)?;
            settings.capabilities = CapabilityFlags::from_capabilities(&capabilities);
        }
        if let Some(value) = orderer.values.get(BATCH_SIZE_KEY) {
            settings.absolute_max_bytes = BatchSize::decode(&value.value)?.absolute_max_bytes;
        }
        Ok(Some(settings))
    }
}

impl OrdererConfig for OrdererSettings {
    fn capabilities(&self) -> &dyn OrdererCapabilities {
        &self.capabilities
    }

    fn absolute_max_bytes(&self) -> u32 {
        self.absolute_max_bytes
    }
}

/// A channel's current orderer configuration.
#[derive(Default)]
pub struct ChannelResources {
    orderer: RwLock<Option<Arc<dyn OrdererConfig>>>,
}

impl ChannelResources {
    pub fn new(orderer: Option<Arc<dyn OrdererConfig>>) -> Self {
        Self {
            orderer: RwLock::new(orderer),
        }
    }

    pub fn from_channel_group(channel_group: &ConfigGroup) -> Result<Self, CoreError> {
        let resources = Self::default();
        resources.update(channel_group)?;
        Ok(resources)
    }

    /// Replace the orderer configuration with the one in `channel_group`.
    ///
    /// On error the previous configuration stays in place.
    pub fn update(&self, channel_group: &ConfigGroup) -> Result<(), CoreError> {
        let settings = OrdererSettings::from_channel_group(channel_group)?;
        let mut orderer = match self.orderer.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *orderer = settings.map(|s| Arc::new(s) as Arc<dyn OrdererConfig>);
        Ok(())
    }
}

impl std::fmt::Debug for ChannelResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let orderer = self.orderer_config();
        f.debug_struct("ChannelResources")
            .field(
                "expiration_check",
                &orderer.as_ref().map(|o| o.capabilities().expiration_check()),
            )
            .field(
                "absolute_max_bytes",
                &orderer.as_ref().map(|o| o.absolute_max_bytes()),
            )
            .finish()
    }
}

impl Resources for ChannelResources {
    fn orderer_config(&self) -> Option<Arc<dyn OrdererConfig>> {
        match self.orderer.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
