//! # chainwire ledger
//!
//! Append-only, per-channel block storage for the ordering pipeline.
//!
//! ## Key Types
//!
//! - [`Factory`] - Creates and tracks one ledger per channel
//! - [`Reader`] / [`Writer`] - Retrieve, follow and append blocks
//! - [`BlockIterator`] - Cursor that waits for the next block
//! - [`SqliteFactory`] - SQLite-backed ledgers
//! - [`MemoryFactory`] - In-memory ledgers with optional retention
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chainwire_ledger::{Factory, SeekPosition, SqliteFactory};
//!
//! async fn example() {
//!     let factory = SqliteFactory::open("ledger.db").unwrap();
//!     let ledger = factory.get_or_create("mychannel").await.unwrap();
//!
//!     let (iter, _start) = ledger.iterator(SeekPosition::Oldest);
//!     while let Ok(block) = iter.next().await {
//!         println!("block {}", block.number());
//!     }
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Strict chaining**: appends must carry the next number and the
//!   header hash of the current tip
//! - **Blocking iterators**: `next` parks at the tip until an append or close
//! - **Close**: closing a factory fails every pending and future `next`
//!   with `SERVICE_UNAVAILABLE`

mod chain;
mod iterator;

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{LedgerError, Result};
pub use memory::{MemoryFactory, MemoryLedger, MemoryLedgerConfig};
pub use sqlite::{SqliteFactory, SqliteLedger};
pub use traits::{BlockIterator, Factory, ReadWriter, Reader, SeekPosition, Writer};
