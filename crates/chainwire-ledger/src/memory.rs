//! In-memory ledger.
//!
//! Same semantics as the SQLite ledger but nothing is persisted. An
//! optional retention bound drops the oldest blocks, which makes iterators
//! positioned before the retained window fail with `NOT_FOUND`.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chainwire_core::{Block, Status};
use tracing::{debug, info};

use crate::chain::Tip;
use crate::error::{LedgerError, Result};
use crate::iterator::{BlockSource, ChannelSignal, CursorIterator, Lookup, NotFoundIterator};
use crate::traits::{BlockIterator, Factory, ReadWriter, Reader, SeekPosition, Writer};

/// Configuration for in-memory ledgers.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerConfig {
    /// Keep at most this many blocks per channel. `None` keeps everything.
    pub max_blocks: Option<usize>,
}

/// Hands out one [`MemoryLedger`] per channel.
pub struct MemoryFactory {
    config: MemoryLedgerConfig,
    ledgers: Mutex<BTreeMap<String, Arc<MemoryLedger>>>,
    closed: AtomicBool,
}

impl MemoryFactory {
    pub fn new(config: MemoryLedgerConfig) -> Self {
        Self {
            config,
            ledgers: Mutex::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
        }
    }
}

impl Default for MemoryFactory {
    fn default() -> Self {
        Self::new(MemoryLedgerConfig::default())
    }
}

#[async_trait]
impl Factory for MemoryFactory {
    async fn get_or_create(&self, channel_id: &str) -> Result<Arc<dyn ReadWriter>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LedgerError::Closed);
        }

        let mut ledgers = self
            .ledgers
            .lock()
            .map_err(|e| LedgerError::Poisoned(e.to_string()))?;
        let ledger = ledgers
            .entry(channel_id.to_string())
            .or_insert_with(|| {
                info!(channel = channel_id, "created in-memory ledger");
                Arc::new(MemoryLedger::new(self.config.clone()))
            })
            .clone();
        Ok(ledger)
    }

    fn channel_ids(&self) -> Vec<String> {
        match self.ledgers.lock() {
            Ok(ledgers) => ledgers.keys().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().keys().cloned().collect(),
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let ledgers = match self.ledgers.lock() {
            Ok(ledgers) => ledgers,
            Err(poisoned) => poisoned.into_inner(),
        };
        for ledger in ledgers.values() {
            ledger.state.signal.close();
        }
    }
}

/// A single channel's blocks, held in memory.
pub struct MemoryLedger {
    state: Arc<MemoryState>,
    // Serializes appends; also holds the chain tip.
    tip: tokio::sync::Mutex<Tip>,
}

struct MemoryState {
    max_blocks: Option<usize>,
    blocks: RwLock<Window>,
    signal: Arc<ChannelSignal>,
}

#[derive(Default)]
struct Window {
    /// Number of `blocks.front()`.
    first: u64,
    blocks: VecDeque<Block>,
}

impl Window {
    fn height(&self) -> u64 {
        self.first + self.blocks.len() as u64
    }
}

impl MemoryLedger {
    pub fn new(config: MemoryLedgerConfig) -> Self {
        Self {
            state: Arc::new(MemoryState {
                max_blocks: config.max_blocks,
                blocks: RwLock::new(Window::default()),
                signal: Arc::new(ChannelSignal::default()),
            }),
            tip: tokio::sync::Mutex::new(Tip::default()),
        }
    }
}

impl MemoryState {
    fn window(&self) -> std::sync::RwLockReadGuard<'_, Window> {
        match self.blocks.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl BlockSource for MemoryState {
    async fn lookup(&self, number: u64) -> std::result::Result<Lookup, Status> {
        let window = self.window();
        if number < window.first {
            return Ok(Lookup::Truncated);
        }
        match window.blocks.get((number - window.first) as usize) {
            Some(block) => Ok(Lookup::Found(block.clone())),
            None => Ok(Lookup::Pending),
        }
    }
}

#[async_trait]
impl Reader for MemoryLedger {
    fn iterator(&self, start: SeekPosition) -> (Box<dyn BlockIterator>, u64) {
        let (first, height) = {
            let window = self.state.window();
            (window.first, window.height())
        };

        let number = match start {
            SeekPosition::Oldest => first,
            SeekPosition::Newest => height.saturating_sub(1).max(first),
            SeekPosition::Specified(n) if n > height => return (Box::new(NotFoundIterator), n),
            SeekPosition::Specified(n) => n,
        };

        let iterator = CursorIterator::new(
            Arc::clone(&self.state),
            Arc::clone(&self.state.signal),
            number,
        );
        (Box::new(iterator), number)
    }

    fn height(&self) -> u64 {
        self.state.window().height()
    }

    async fn retrieve_block_by_number(&self, number: u64) -> Result<Block> {
        match self.state.lookup(number).await {
            Ok(Lookup::Found(block)) => Ok(block),
            _ => Err(LedgerError::NotFound(number)),
        }
    }
}

#[async_trait]
impl Writer for MemoryLedger {
    async fn append(&self, block: Block) -> Result<()> {
        if self.state.signal.is_closed() {
            return Err(LedgerError::Closed);
        }

        let mut tip = self.tip.lock().await;
        let next = tip.extend(&block)?;
        let number = tip.height;

        {
            let mut window = self
                .state
                .blocks
                .write()
                .map_err(|e| LedgerError::Poisoned(e.to_string()))?;
            window.blocks.push_back(block);
            if let Some(max) = self.state.max_blocks {
                while window.blocks.len() > max.max(1) {
                    window.blocks.pop_front();
                    window.first += 1;
                }
            }
        }

        *tip = next;
        debug!(number, "appended block");
        self.state.signal.appended();
        Ok(())
    }
}
