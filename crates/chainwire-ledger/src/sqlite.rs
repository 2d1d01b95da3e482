//! SQLite ledger.
//!
//! All channels share one connection. Blocks are stored in their canonical
//! encoding together with their header hash, so a reopened ledger can
//! resume chaining without decoding the tip. Every query runs on the
//! blocking pool via `tokio::task::spawn_blocking`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chainwire_core::{Block, Message, Status};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::chain::Tip;
use crate::error::{LedgerError, Result};
use crate::iterator::{BlockSource, ChannelSignal, CursorIterator, Lookup, NotFoundIterator};
use crate::migration::{self, now_millis};
use crate::traits::{BlockIterator, Factory, ReadWriter, Reader, SeekPosition, Writer};

type SharedConnection = Arc<Mutex<Connection>>;

/// Run `f` against the connection on the blocking pool.
async fn blocking<F, T>(conn: &SharedConnection, f: F) -> Result<T>
where
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let conn = Arc::clone(conn);
    tokio::task::spawn_blocking(move || {
        let mut conn = conn
            .lock()
            .map_err(|e| LedgerError::Poisoned(e.to_string()))?;
        f(&mut conn)
    })
    .await
    .map_err(|e| LedgerError::Task(e.to_string()))?
}

/// Hands out one [`SqliteLedger`] per channel, all backed by one database.
pub struct SqliteFactory {
    conn: SharedConnection,
    ledgers: Mutex<BTreeMap<String, Arc<SqliteLedger>>>,
    /// Channels recorded in the database, opened or not.
    known: Mutex<BTreeSet<String>>,
    closed: AtomicBool,
}

impl SqliteFactory {
    /// Open (or create) a ledger database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        migration::migrate(&mut conn)?;

        let known = conn
            .prepare("SELECT channel_id FROM channels ORDER BY channel_id")?
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<BTreeSet<_>, _>>()?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            ledgers: Mutex::new(BTreeMap::new()),
            known: Mutex::new(known),
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Factory for SqliteFactory {
    async fn get_or_create(&self, channel_id: &str) -> Result<Arc<dyn ReadWriter>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LedgerError::Closed);
        }

        {
            let ledgers = self
                .ledgers
                .lock()
                .map_err(|e| LedgerError::Poisoned(e.to_string()))?;
            if let Some(ledger) = ledgers.get(channel_id) {
                return Ok(Arc::clone(ledger) as Arc<dyn ReadWriter>);
            }
        }

        let channel = channel_id.to_string();
        let tip = blocking(&self.conn, move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO channels (channel_id, created_at) VALUES (?1, ?2)",
                params![channel, now_millis()],
            )?;
            let last: Option<(i64, Vec<u8>)> = conn
                .query_row(
                    "SELECT number, header_hash FROM blocks
                     WHERE channel_id = ?1 ORDER BY number DESC LIMIT 1",
                    params![channel],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            Ok(match last {
                Some((number, hash)) => Tip {
                    height: number as u64 + 1,
                    hash: Some(hash),
                },
                None => Tip::default(),
            })
        })
        .await?;

        let mut ledgers = self
            .ledgers
            .lock()
            .map_err(|e| LedgerError::Poisoned(e.to_string()))?;
        let ledger = ledgers
            .entry(channel_id.to_string())
            .or_insert_with(|| {
                info!(channel = channel_id, height = tip.height, "opened sqlite ledger");
                Arc::new(SqliteLedger::new(
                    Arc::clone(&self.conn),
                    channel_id.to_string(),
                    tip,
                ))
            })
            .clone();

        if let Ok(mut known) = self.known.lock() {
            known.insert(channel_id.to_string());
        }
        Ok(ledger)
    }

    fn channel_ids(&self) -> Vec<String> {
        match self.known.lock() {
            Ok(known) => known.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
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

/// A single channel's blocks in the shared database.
pub struct SqliteLedger {
    state: Arc<SqliteChannel>,
    // Serializes appends; also holds the chain tip.
    tip: tokio::sync::Mutex<Tip>,
}

struct SqliteChannel {
    conn: SharedConnection,
    channel_id: String,
    /// Mirrors `tip.height` for lock-free reads.
    height: AtomicU64,
    signal: Arc<ChannelSignal>,
}

impl SqliteLedger {
    fn new(conn: SharedConnection, channel_id: String, tip: Tip) -> Self {
        Self {
            state: Arc::new(SqliteChannel {
                conn,
                channel_id,
                height: AtomicU64::new(tip.height),
                signal: Arc::new(ChannelSignal::default()),
            }),
            tip: tokio::sync::Mutex::new(tip),
        }
    }
}

impl SqliteChannel {
    fn height(&self) -> u64 {
        self.height.load(Ordering::SeqCst)
    }

    async fn fetch(&self, number: u64) -> Result<Option<Block>> {
        let channel = self.channel_id.clone();
        blocking(&self.conn, move |conn| {
            let bytes: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT block FROM blocks WHERE channel_id = ?1 AND number = ?2",
                    params![channel, number as i64],
                    |row| row.get(0),
                )
                .optional()?;
            bytes
                .map(|bytes| {
                    Block::decode(&bytes).map_err(|source| LedgerError::Corrupted { number, source })
                })
                .transpose()
        })
        .await
    }
}

#[async_trait]
impl BlockSource for SqliteChannel {
    async fn lookup(&self, number: u64) -> std::result::Result<Lookup, Status> {
        if number >= self.height() {
            return Ok(Lookup::Pending);
        }
        match self.fetch(number).await {
            Ok(Some(block)) => Ok(Lookup::Found(block)),
            Ok(None) => Ok(Lookup::Truncated),
            Err(err) => {
                warn!(channel = %self.channel_id, number, error = %err, "block lookup failed");
                Err(Status::InternalServerError)
            }
        }
    }
}

#[async_trait]
impl Reader for SqliteLedger {
    fn iterator(&self, start: SeekPosition) -> (Box<dyn BlockIterator>, u64) {
        let height = self.state.height();
        let number = match start {
            SeekPosition::Oldest => 0,
            SeekPosition::Newest => height.saturating_sub(1),
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
        self.state.height()
    }

    async fn retrieve_block_by_number(&self, number: u64) -> Result<Block> {
        if number >= self.state.height() {
            return Err(LedgerError::NotFound(number));
        }
        self.state
            .fetch(number)
            .await?
            .ok_or(LedgerError::NotFound(number))
    }
}

#[async_trait]
impl Writer for SqliteLedger {
    async fn append(&self, block: Block) -> Result<()> {
        if self.state.signal.is_closed() {
            return Err(LedgerError::Closed);
        }

        let mut tip = self.tip.lock().await;
        let next = tip.extend(&block)?;
        let number = tip.height;

        let channel = self.state.channel_id.clone();
        let hash = next.hash.clone().unwrap_or_default();
        let encoded = block.encode();
        blocking(&self.state.conn, move |conn| {
            conn.execute(
                "INSERT INTO blocks (channel_id, number, header_hash, block, appended_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![channel, number as i64, hash, encoded, now_millis()],
            )?;
            Ok(())
        })
        .await?;

        self.state.height.store(next.height, Ordering::SeqCst);
        *tip = next;
        debug!(channel = %self.state.channel_id, number, "appended block");
        self.state.signal.appended();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainwire_core::{block_header_hash, new_block, BlockData};
    use std::time::Duration;

    fn chain(len: u64) -> Vec<Block> {
        let mut blocks = Vec::new();
        let mut prev = Vec::new();
        for number in 0..len {
            let mut block = new_block(number, &prev);
            block.data = Some(BlockData {
                data: vec![format!("tx-{number}").into_bytes()],
            });
            prev = block_header_hash(block.header.as_ref().unwrap());
            blocks.push(block);
        }
        blocks
    }

    #[tokio::test]
    async fn test_append_and_retrieve() {
        let factory = SqliteFactory::open_memory().unwrap();
        let ledger = factory.get_or_create("mychannel").await.unwrap();
        let blocks = chain(3);
        for block in blocks.clone() {
            ledger.append(block).await.unwrap();
        }

        assert_eq!(ledger.height(), 3);
        assert_eq!(ledger.retrieve_block_by_number(2).await.unwrap(), blocks[2]);
        assert!(matches!(
            ledger.retrieve_block_by_number(3).await,
            Err(LedgerError::NotFound(3))
        ));
    }

    #[tokio::test]
    async fn test_append_rejects_bad_chain() {
        let factory = SqliteFactory::open_memory().unwrap();
        let ledger = factory.get_or_create("mychannel").await.unwrap();
        let blocks = chain(2);

        assert!(matches!(
            ledger.append(blocks[1].clone()).await,
            Err(LedgerError::InvalidBlockNumber { expected: 0, got: 1 })
        ));
        ledger.append(blocks[0].clone()).await.unwrap();
        assert!(matches!(
            ledger.append(new_block(1, b"elsewhere")).await,
            Err(LedgerError::PreviousHashMismatch { number: 1 })
        ));
        assert_eq!(ledger.height(), 1);
    }

    #[tokio::test]
    async fn test_reopen_resumes_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let blocks = chain(3);

        {
            let factory = SqliteFactory::open(&path).unwrap();
            let ledger = factory.get_or_create("mychannel").await.unwrap();
            ledger.append(blocks[0].clone()).await.unwrap();
            ledger.append(blocks[1].clone()).await.unwrap();
            factory.get_or_create("empty").await.unwrap();
            factory.close();
        }

        let factory = SqliteFactory::open(&path).unwrap();
        assert_eq!(
            factory.channel_ids(),
            vec!["empty".to_string(), "mychannel".to_string()]
        );

        let ledger = factory.get_or_create("mychannel").await.unwrap();
        assert_eq!(ledger.height(), 2);
        assert_eq!(ledger.retrieve_block_by_number(1).await.unwrap(), blocks[1]);

        // The stored header hash lets the next block chain on.
        ledger.append(blocks[2].clone()).await.unwrap();
        assert!(matches!(
            ledger.append(new_block(3, b"elsewhere")).await,
            Err(LedgerError::PreviousHashMismatch { number: 3 })
        ));
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let factory = SqliteFactory::open_memory().unwrap();
        let a = factory.get_or_create("a").await.unwrap();
        let b = factory.get_or_create("b").await.unwrap();

        a.append(chain(1).remove(0)).await.unwrap();
        assert_eq!(a.height(), 1);
        assert_eq!(b.height(), 0);
        assert!(b.retrieve_block_by_number(0).await.is_err());
    }

    #[tokio::test]
    async fn test_iterator_follows_appends() {
        let factory = SqliteFactory::open_memory().unwrap();
        let ledger = factory.get_or_create("mychannel").await.unwrap();
        let blocks = chain(3);
        ledger.append(blocks[0].clone()).await.unwrap();

        let (iter, start) = ledger.iterator(SeekPosition::Oldest);
        assert_eq!(start, 0);
        assert_eq!(iter.next().await.unwrap(), blocks[0]);

        let writer = Arc::clone(&ledger);
        let rest = blocks[1..].to_vec();
        tokio::spawn(async move {
            for block in rest {
                tokio::time::sleep(Duration::from_millis(10)).await;
                writer.append(block).await.unwrap();
            }
        });

        for expected in &blocks[1..] {
            let block = tokio::time::timeout(Duration::from_secs(5), iter.next())
                .await
                .expect("iterator should wake on append")
                .unwrap();
            assert_eq!(&block, expected);
        }
    }

    #[tokio::test]
    async fn test_close_unblocks_iterators() {
        let factory = SqliteFactory::open_memory().unwrap();
        let ledger = factory.get_or_create("mychannel").await.unwrap();
        let (iter, _) = ledger.iterator(SeekPosition::Newest);
        let iter: Arc<dyn BlockIterator> = Arc::from(iter);

        let waiter = Arc::clone(&iter);
        let pending = tokio::spawn(async move { waiter.next().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        factory.close();

        let result = tokio::time::timeout(Duration::from_secs(5), pending)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.unwrap_err(), Status::ServiceUnavailable);
        assert!(matches!(
            factory.get_or_create("mychannel").await,
            Err(LedgerError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_specified_past_height_is_not_found() {
        let factory = SqliteFactory::open_memory().unwrap();
        let ledger = factory.get_or_create("mychannel").await.unwrap();
        let (iter, start) = ledger.iterator(SeekPosition::Specified(1));
        assert_eq!(start, 1);
        assert_eq!(iter.next().await.unwrap_err(), Status::NotFound);
    }
}
