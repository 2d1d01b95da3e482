//! # chainwire testkit
//!
//! Testing utilities for chainwire.
//!
//! ## Overview
//!
//! - **Fixtures**: a signing identity bound to a channel, with builders for
//!   transaction, config and config update envelopes
//! - **Generators**: proptest strategies for identities, header types, every
//!   wire message kind and whole signed envelopes
//! - **Stubs**: fixed identity expiry and orderer resources
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use chainwire_testkit::generators::{envelope_from_params, EnvelopeParams};
//!
//! proptest! {
//!     #[test]
//!     fn channel_id_survives(params: EnvelopeParams) {
//!         let envelope = envelope_from_params(&params);
//!         let header = chainwire_core::channel_header(Some(&envelope)).unwrap();
//!         prop_assert_eq!(header.channel_id, params.channel_id);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use chainwire_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::new();
//! let envelope = fixture.make_transaction(b"hello");
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    chained_blocks, multi_party_fixtures, orderer_channel_group, static_resources, FixedExpiry,
    TestFixture,
};
pub use generators::{envelope_from_params, EnvelopeParams};
