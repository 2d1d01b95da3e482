//! # chainwire message processing
//!
//! Rules an envelope must pass before it is ordered into a block.
//!
//! ## Overview
//!
//! Each [`Rule`] inspects one envelope and either accepts it or returns a
//! [`RuleError`]. A [`RuleSet`] applies its rules in order and stops at the
//! first failure. Rules that depend on channel configuration read it
//! through the [`Resources`] provider they were built with.
//!
//! ## Errors
//!
//! A rejection maps to a response [`Status`](chainwire_core::Status) via
//! [`RuleError::status`]. A [`RuleError::Fatal`] is different: it means the
//! process is misconfigured and must be surfaced to the host, never sent
//! back to the client as a rejection.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chainwire_core::{ConfigGroup, SerializedIdentityExpiry};
//! use chainwire_msgproc::{
//!     ChannelResources, EmptyRejectRule, ExpirationRejectRule, RuleSet, SizeFilter,
//! };
//!
//! let group = ConfigGroup::default();
//! let resources = Arc::new(ChannelResources::from_channel_group(&group).unwrap());
//! let rules = RuleSet::new()
//!     .with(EmptyRejectRule)
//!     .with(SizeFilter::new(resources.clone()))
//!     .with(ExpirationRejectRule::new(resources, Arc::new(SerializedIdentityExpiry)));
//! ```

pub mod error;
pub mod expiration;
pub mod filters;
pub mod resources;
pub mod rule;

pub use error::{Result, RuleError};
pub use expiration::ExpirationRejectRule;
pub use filters::{EmptyRejectRule, SignatureRule, SizeFilter};
pub use resources::{
    CapabilityFlags, ChannelResources, OrdererCapabilities, OrdererConfig, OrdererSettings,
    Resources, DEFAULT_ABSOLUTE_MAX_BYTES,
};
pub use rule::{Rule, RuleSet};
