//! Blocking block iterators shared by the ledger backends.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chainwire_core::{Block, Status};
use tokio::sync::Notify;

use crate::traits::BlockIterator;

/// Outcome of looking up a block for an iterator.
pub(crate) enum Lookup {
    Found(Block),
    /// Not appended yet.
    Pending,
    /// Dropped by retention.
    Truncated,
}

/// Backend access used by [`CursorIterator`].
#[async_trait]
pub(crate) trait BlockSource: Send + Sync + 'static {
    async fn lookup(&self, number: u64) -> Result<Lookup, Status>;
}

/// Per-channel wake-up signal for appends and shutdown.
#[derive(Debug, Default)]
pub(crate) struct ChannelSignal {
    notify: Notify,
    closed: AtomicBool,
}

impl ChannelSignal {
    pub fn appended(&self) {
        self.notify.notify_waiters();
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Iterator that walks block numbers upward, parking on the channel signal
/// whenever it reaches the tip.
pub(crate) struct CursorIterator<S> {
    source: Arc<S>,
    signal: Arc<ChannelSignal>,
    position: AtomicU64,
    closed: AtomicBool,
    wake: Notify,
}

impl<S: BlockSource> CursorIterator<S> {
    pub fn new(source: Arc<S>, signal: Arc<ChannelSignal>, start: u64) -> Self {
        Self {
            source,
            signal,
            position: AtomicU64::new(start),
            closed: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }
}

#[async_trait]
impl<S: BlockSource> BlockIterator for CursorIterator<S> {
    async fn next(&self) -> Result<Block, Status> {
        loop {
            // Register for wake-ups before looking, so an append or close
            // that lands between the lookup and the wait is not missed.
            let appended = self.signal.notify.notified();
            let closed = self.wake.notified();

            if self.closed.load(Ordering::SeqCst) || self.signal.is_closed() {
                return Err(Status::ServiceUnavailable);
            }

            let number = self.position.load(Ordering::SeqCst);
            match self.source.lookup(number).await? {
                Lookup::Found(block) => {
                    self.position.store(number + 1, Ordering::SeqCst);
                    return Ok(block);
                }
                Lookup::Truncated => return Err(Status::NotFound),
                Lookup::Pending => {}
            }

            tokio::select! {
                _ = appended => {}
                _ = closed => {}
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
    }
}

/// Iterator for a start position that can never be served.
pub(crate) struct NotFoundIterator;

#[async_trait]
impl BlockIterator for NotFoundIterator {
    async fn next(&self) -> Result<Block, Status> {
        Err(Status::NotFound)
    }

    fn close(&self) {}
}
