//! # chainwire
//!
//! Ordering pipeline for a permissioned ledger channel: genesis block
//! creation, envelope validation and block cutting on top of a pluggable
//! ledger.
//!
//! ## Overview
//!
//! - [`GenesisFactory`] builds block zero from the channel's config tree
//! - [`ChannelProcessor`] checks each envelope, runs the channel's rules and
//!   appends it to the ledger in its own block
//! - [`start_channel`] opens or bootstraps a channel from a ledger factory
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chainwire::{start_channel, GenesisFactory, ProcessorConfig};
//! use chainwire::core::{ConfigGroup, Envelope};
//! use chainwire::ledger::SqliteFactory;
//! use chainwire::msgproc::{ChannelResources, EmptyRejectRule, RuleSet, SizeFilter};
//!
//! async fn example(channel_group: ConfigGroup, envelope: Envelope) -> anyhow::Result<()> {
//!     let factory = SqliteFactory::open("ledger.db")?;
//!     let resources = Arc::new(ChannelResources::from_channel_group(&channel_group)?);
//!     let rules = RuleSet::new()
//!         .with(EmptyRejectRule)
//!         .with(SizeFilter::new(resources.clone()));
//!     let config = ProcessorConfig {
//!         resources: Some(resources),
//!         ..Default::default()
//!     };
//!
//!     let genesis = GenesisFactory::new(channel_group);
//!     let channel = start_channel(&factory, "mychannel", &genesis, rules, config).await?;
//!
//!     match channel.process(envelope).await {
//!         Ok(outcome) => println!("ordered into block {}", outcome.block_number),
//!         Err(err) if err.is_fatal() => return Err(err.into()),
//!         Err(err) => println!("rejected with {}", err.status()),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `chainwire::core` - Envelope protocol types and codec
//! - `chainwire::ledger` - Ledger traits, SQLite and in-memory ledgers
//! - `chainwire::msgproc` - Validation rules

pub mod bootstrap;
pub mod error;
pub mod genesis;
pub mod processor;

pub use chainwire_core as core;
pub use chainwire_ledger as ledger;
pub use chainwire_msgproc as msgproc;

pub use bootstrap::start_channel;
pub use error::{ProcessorError, Result};
pub use genesis::GenesisFactory;
pub use processor::{ChannelProcessor, ProcessOutcome, ProcessorConfig};
