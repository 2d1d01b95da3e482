//! Ledger contracts consumed by the ordering pipeline.
//!
//! A [`Factory`] hands out one [`ReadWriter`] per channel. Writers append
//! blocks in strict height order; readers retrieve blocks by number or
//! follow the chain with a [`BlockIterator`] that waits for new blocks.

use std::sync::Arc;

use async_trait::async_trait;
use chainwire_core::{Block, Status};

use crate::error::Result;

/// Where an iterator starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekPosition {
    /// The oldest block still retained.
    Oldest,
    /// The current tip.
    Newest,
    /// A specific block number.
    Specified(u64),
}

/// A cursor over a channel's blocks.
#[async_trait]
pub trait BlockIterator: Send + Sync {
    /// The next block, waiting until it exists.
    ///
    /// Returns `Status::NotFound` if the position is no longer retained and
    /// `Status::ServiceUnavailable` once the iterator or its ledger closes.
    async fn next(&self) -> std::result::Result<Block, Status>;

    /// Release the iterator, waking any pending `next`.
    fn close(&self);
}

#[async_trait]
pub trait Reader: Send + Sync {
    /// An iterator positioned at `start`, and the block number it starts at.
    fn iterator(&self, start: SeekPosition) -> (Box<dyn BlockIterator>, u64);

    /// Number of blocks appended so far (the next block number).
    fn height(&self) -> u64;

    async fn retrieve_block_by_number(&self, number: u64) -> Result<Block>;
}

#[async_trait]
pub trait Writer: Send + Sync {
    /// Append a block that extends the current tip.
    async fn append(&self, block: Block) -> Result<()>;
}

/// A channel ledger that can be both read and written.
pub trait ReadWriter: Reader + Writer {}

impl<T: Reader + Writer + ?Sized> ReadWriter for T {}

/// Creates and tracks per-channel ledgers.
#[async_trait]
pub trait Factory: Send + Sync {
    /// The ledger for a channel, creating it if needed.
    async fn get_or_create(&self, channel_id: &str) -> Result<Arc<dyn ReadWriter>>;

    /// Channels known to this factory.
    fn channel_ids(&self) -> Vec<String>;

    /// Close every ledger and wake every iterator. Idempotent.
    fn close(&self);
}
