pub mod migrations;
pub mod models;
pub mod queries;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::info;

const READER_POOL_SIZE: usize = 4;

/// How often a queued write re-checks the writer lock.
const WRITER_POLL: Duration = Duration::from_millis(1);

/// A write that could not start: the writer stayed busy past its window,
/// or the caller gave up. Nothing was written.
#[derive(Debug, Error)]
#[error("database writer unavailable, write not started")]
pub struct WriterBusy;

/// Period in which a queued write may still start. Once a write holds the
/// writer it runs to completion regardless of the window.
#[derive(Debug, Clone)]
pub struct WriteWindow {
    deadline: Instant,
    abandoned: Arc<AtomicBool>,
}

impl WriteWindow {
    pub fn new(wait: Duration) -> Self {
        Self {
            deadline: Instant::now() + wait,
            abandoned: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Close the window early. A write still waiting for the writer will
    /// not start; one already running is unaffected.
    pub fn abandon(&self) {
        self.abandoned.store(true, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        !self.abandoned.load(Ordering::Acquire) && Instant::now() < self.deadline
    }
}

/// Chat database: one writer connection plus a round-robin pool of
/// read-only connections. All writes are serialized on the writer.
pub struct Database {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    reader_idx: AtomicUsize,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let mut writer = Connection::open(path)?;

        // WAL mode for concurrent reads
        writer.pragma_update(None, "journal_mode", "WAL")?;
        writer.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&mut writer)?;

        let mut readers = Vec::with_capacity(READER_POOL_SIZE);
        for _ in 0..READER_POOL_SIZE {
            let conn = Connection::open_with_flags(
                path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            readers.push(Mutex::new(conn));
        }

        info!(
            "Database opened at {} (1 writer + {} readers)",
            path.display(),
            READER_POOL_SIZE
        );
        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            reader_idx: AtomicUsize::new(0),
        })
    }

    /// Private in-memory database. Reads go through the writer because
    /// separate connections would each see their own empty database.
    pub fn open_in_memory() -> Result<Self> {
        let mut writer = Connection::open_in_memory()?;
        writer.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&mut writer)?;

        Ok(Self {
            writer: Mutex::new(writer),
            readers: Vec::new(),
            reader_idx: AtomicUsize::new(0),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        if self.readers.is_empty() {
            let conn = self
                .writer
                .lock()
                .map_err(|e| anyhow::anyhow!("Writer lock poisoned: {}", e))?;
            return f(&conn);
        }

        let idx = self.reader_idx.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[idx]
            .lock()
            .map_err(|e| anyhow::anyhow!("Reader lock poisoned: {}", e))?;
        f(&conn)
    }

    /// Run `f` on the writer if it can be acquired while `window` is open.
    /// Otherwise fails with `WriterBusy` and `f` never runs.
    pub fn with_conn_mut<F, T>(&self, window: &WriteWindow, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = loop {
            if !window.is_open() {
                return Err(WriterBusy.into());
            }
            match self.writer.try_lock() {
                Ok(guard) => break guard,
                Err(TryLockError::Poisoned(e)) => {
                    return Err(anyhow::anyhow!("Writer lock poisoned: {}", e));
                }
                Err(TryLockError::WouldBlock) => std::thread::sleep(WRITER_POLL),
            }
        };
        f(&mut conn)
    }

    pub fn ping(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
    }
}
