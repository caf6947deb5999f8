//! SQLite storage layer.
//!
//! A single `data` table of (id, input, output). The store never commits on
//! its own, except for [`WorkStore::remove_duplicates`]: every other write
//! stays pending until the caller runs [`WorkStore::commit`], and is lost if
//! the store is closed or dropped first.
//!
//! Concurrent writers in other processes rely on SQLite's own file locking.
//! There is no extra locking or retry layer here.

mod export;
mod incomplete;

pub use incomplete::Incomplete;

use std::cell::{Cell, RefCell};
use std::path::Path;
use std::time::Duration;

use opentelemetry::KeyValue;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::codec::{Codec, JsonCodec, ensure_finite};
use crate::error::{Error, Result};
use crate::model::{Record, RecordId};
use crate::progress::{LogProgress, Progress, ProgressSession};
use crate::telemetry::metrics;

/// Options applied when opening a store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// How long to wait on a lock held by another connection.
    pub busy_timeout: Duration,
    /// Label handed to progress sessions.
    pub progress_label: String,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(5000),
            progress_label: "Processing records".to_string(),
        }
    }
}

/// Persistent work-item store. Owns the SQLite connection.
pub struct WorkStore {
    conn: Option<Connection>,
    location: String,
    codec: Box<dyn Codec>,
    progress: Box<dyn Progress>,
    progress_label: String,
    /// Active session, tagged with the iteration that opened it.
    session: RefCell<Option<(u64, Box<dyn ProgressSession>)>>,
    session_seq: Cell<u64>,
}

impl WorkStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, StoreOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.busy_timeout(options.busy_timeout)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(path = %path.display(), journal_mode = %mode, "opened store");

        let store = Self::from_connection(conn, path.display().to_string(), options);
        store.ensure_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self::from_connection(conn, ":memory:".to_string(), StoreOptions::default());
        store.ensure_schema()?;
        Ok(store)
    }

    fn from_connection(conn: Connection, location: String, options: StoreOptions) -> Self {
        Self {
            conn: Some(conn),
            location,
            codec: Box::new(JsonCodec),
            progress: Box::new(LogProgress::new()),
            progress_label: options.progress_label,
            session: RefCell::new(None),
            session_seq: Cell::new(0),
        }
    }

    /// Replace the payload codec.
    pub fn with_codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codec = Box::new(codec);
        self
    }

    /// Replace the progress reporter used by [`WorkStore::incomplete`].
    pub fn with_progress(mut self, progress: impl Progress + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    /// File path of the store, or `:memory:`.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Create the table and index if absent. Safe to run repeatedly.
    ///
    /// Names match case-insensitively with stores whose table was created as
    /// `Data(ID, Input, Output)`. Such a store gains the partial index
    /// `idx_data_incomplete` the first time it is opened here; the table
    /// itself is not altered.
    pub fn ensure_schema(&self) -> Result<()> {
        self.conn()?.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS data (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                input   TEXT,
                output  TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_data_incomplete ON data(id)
                WHERE output IS NULL;
            ",
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(Error::Closed)
    }

    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    /// Whether writes are pending on this store.
    pub fn in_transaction(&self) -> bool {
        self.conn.as_ref().is_some_and(|conn| !conn.is_autocommit())
    }

    /// Begin a transaction explicitly.
    ///
    /// Writes open one implicitly, so this fails after any uncommitted write.
    pub fn begin(&self) -> Result<()> {
        let conn = self.conn()?;
        if !conn.is_autocommit() {
            return Err(Error::Transaction(
                "cannot start a transaction within a transaction".to_string(),
            ));
        }
        conn.execute_batch("BEGIN")?;
        metrics::transactions().add(1, &[KeyValue::new("operation", "begin")]);
        Ok(())
    }

    /// Commit pending writes. No-op if nothing is pending.
    pub fn commit(&self) -> Result<()> {
        let conn = self.conn()?;
        if conn.is_autocommit() {
            return Ok(());
        }
        conn.execute_batch("COMMIT")?;
        metrics::transactions().add(1, &[KeyValue::new("operation", "commit")]);
        Ok(())
    }

    /// Discard pending writes. No-op if nothing is pending.
    pub fn rollback(&self) -> Result<()> {
        let conn = self.conn()?;
        if conn.is_autocommit() {
            return Ok(());
        }
        conn.execute_batch("ROLLBACK")?;
        metrics::transactions().add(1, &[KeyValue::new("operation", "rollback")]);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Records
    // -----------------------------------------------------------------------

    /// Insert an input with no output. Returns the assigned id. Does not commit.
    pub fn add<T: Serialize + ?Sized>(&self, input: &T) -> Result<RecordId> {
        let conn = self.conn()?;
        let text = self.encode(input)?;
        let id = insert_input_on(conn, &text)?;
        metrics::records_added().add(1, &[]);
        Ok(id)
    }

    /// Set the output of a record. Does not commit.
    ///
    /// An unknown id is not an error: nothing changes and `false` is
    /// returned. The active progress session advances either way.
    pub fn update<T: Serialize + ?Sized>(&self, id: RecordId, output: &T) -> Result<bool> {
        let conn = self.conn()?;
        let text = self.encode(output)?;
        let changed = set_output_on(conn, id, &text)?;
        metrics::records_updated().add(1, &[]);
        self.advance_session();
        Ok(changed)
    }

    /// Get a decoded copy of a record.
    pub fn get(&self, id: RecordId) -> Result<Option<Record>> {
        let row: Option<(Option<String>, Option<String>)> = self
            .conn()?
            .query_row(
                "SELECT input, output FROM data WHERE id = ?1",
                params![id.0],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((input, output)) = row else {
            return Ok(None);
        };
        Ok(Some(Record {
            id,
            input: self.decode_column(input)?,
            output: output.map(|text| self.codec.decode(&text)).transpose()?,
        }))
    }

    /// Keep the lowest-id record for each distinct input and delete the rest.
    ///
    /// Commits immediately, including any writes already pending. Returns
    /// the number of records deleted.
    pub fn remove_duplicates(&self) -> Result<usize> {
        let conn = self.conn()?;
        ensure_transaction_on(conn)?;
        let removed = conn.execute(
            "DELETE FROM data
             WHERE id NOT IN (
                 SELECT MIN(id) FROM data GROUP BY input
             )",
            [],
        )?;
        conn.execute_batch("COMMIT")?;

        metrics::records_deduplicated().add(removed as u64, &[]);
        metrics::transactions().add(1, &[KeyValue::new("operation", "commit")]);
        info!(store = %self.location, removed, "removed duplicate records");
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Counts
    // -----------------------------------------------------------------------

    /// Number of records, pending writes included.
    pub fn total_size(&self) -> Result<u64> {
        count_on(self.conn()?, "SELECT COUNT(*) FROM data")
    }

    /// Number of records whose output is set.
    pub fn completed_size(&self) -> Result<u64> {
        count_on(self.conn()?, "SELECT COUNT(*) FROM data WHERE output IS NOT NULL")
    }

    /// Number of records still waiting for an output.
    pub fn incomplete_size(&self) -> Result<u64> {
        count_on(self.conn()?, "SELECT COUNT(*) FROM data WHERE output IS NULL")
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Close the progress session and the connection. Pending writes are
    /// discarded. Calling again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        self.close_any_session();
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        if !conn.is_autocommit() {
            warn!(store = %self.location, "closing with uncommitted writes, discarding them");
        }
        conn.close().map_err(|(_, e)| Error::StorageUnavailable(e))?;
        debug!(store = %self.location, "closed store");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Payloads and progress
    // -----------------------------------------------------------------------

    /// NaN and infinities are rejected rather than stored as null.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        ensure_finite(value)?;
        let value = serde_json::to_value(value)?;
        self.codec.encode(&value)
    }

    /// NULL columns (never written by this store) decode as JSON null.
    fn decode_column(&self, text: Option<String>) -> Result<Value> {
        match text {
            Some(text) => self.codec.decode(&text),
            None => Ok(Value::Null),
        }
    }

    fn open_session(&self, total: u64, initial: u64) -> u64 {
        let generation = self.session_seq.get() + 1;
        self.session_seq.set(generation);
        let session = self.progress.start(total, initial, &self.progress_label);
        if let Some((_, mut previous)) = self.session.replace(Some((generation, session))) {
            previous.close();
        }
        generation
    }

    /// Close the session only if `generation` still owns it.
    fn close_session(&self, generation: u64) {
        let mut slot = self.session.borrow_mut();
        if !slot.as_ref().is_some_and(|(owner, _)| *owner == generation) {
            return;
        }
        if let Some((_, mut session)) = slot.take() {
            session.close();
        }
    }

    fn close_any_session(&self) {
        if let Some((_, mut session)) = self.session.take() {
            session.close();
        }
    }

    fn advance_session(&self) {
        if let Some((_, session)) = self.session.borrow_mut().as_mut() {
            session.advance(1);
        }
    }
}

impl Drop for WorkStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(store = %self.location, error = %e, "failed to close store");
        }
    }
}

// ---------------------------------------------------------------------------
// Inner functions
// ---------------------------------------------------------------------------

/// Open a deferred transaction unless one is already active, so writes stay
/// pending until an explicit commit.
fn ensure_transaction_on(conn: &Connection) -> Result<()> {
    if conn.is_autocommit() {
        conn.execute_batch("BEGIN DEFERRED")?;
    }
    Ok(())
}

fn insert_input_on(conn: &Connection, input: &str) -> Result<RecordId> {
    ensure_transaction_on(conn)?;
    conn.execute("INSERT INTO data (input) VALUES (?1)", params![input])?;
    Ok(RecordId(conn.last_insert_rowid()))
}

fn set_output_on(conn: &Connection, id: RecordId, output: &str) -> Result<bool> {
    ensure_transaction_on(conn)?;
    let changed = conn.execute(
        "UPDATE data SET output = ?1 WHERE id = ?2",
        params![output, id.0],
    )?;
    Ok(changed > 0)
}

fn count_on(conn: &Connection, sql: &str) -> Result<u64> {
    let count: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(count as u64)
}
