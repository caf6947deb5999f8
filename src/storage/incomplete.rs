//! Iteration over records that still need an output.

use std::collections::VecDeque;

use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use tracing::debug;

use super::WorkStore;
use crate::error::Result;
use crate::model::RecordId;

impl WorkStore {
    /// Iterate over incomplete records in ascending id order.
    ///
    /// The set of ids is fixed when this is called: records added later are
    /// not yielded, and records completed later are still yielded. Records
    /// deleted later are skipped. Inputs are decoded one at a time as the
    /// iterator advances.
    ///
    /// Opens a progress session (total = all records, initial = completed
    /// records) that every [`WorkStore::update`] advances. The session is
    /// closed when the iterator is exhausted, stopped, or dropped.
    pub fn incomplete(&self) -> Result<Incomplete<'_>> {
        let total = self.total_size()?;
        let done = self.completed_size()?;
        let pending = incomplete_ids_on(self.conn()?)?;

        debug!(store = %self.location, total, done, pending = pending.len(), "iterating incomplete records");
        let generation = self.open_session(total, done);

        Ok(Incomplete {
            store: self,
            pending,
            generation,
            finished: false,
        })
    }

    fn load_input(&self, id: RecordId) -> Result<Option<Value>> {
        let text: Option<Option<String>> = self
            .conn()?
            .prepare_cached("SELECT input FROM data WHERE id = ?1")?
            .query_row(params![id.0], |row| row.get(0))
            .optional()?;

        text.map(|text| self.decode_column(text)).transpose()
    }
}

/// Forward-only pass over the incomplete records snapshotted by
/// [`WorkStore::incomplete`].
pub struct Incomplete<'a> {
    store: &'a WorkStore,
    pending: VecDeque<RecordId>,
    generation: u64,
    finished: bool,
}

impl Incomplete<'_> {
    /// Snapshotted records not yet yielded.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// End the iteration early and close its progress session.
    pub fn stop(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.pending.clear();
        self.store.close_session(self.generation);
    }
}

impl Iterator for Incomplete<'_> {
    type Item = Result<(RecordId, Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        while let Some(id) = self.pending.pop_front() {
            match self.store.load_input(id) {
                Ok(Some(input)) => return Some(Ok((id, input))),
                // Deleted since the snapshot
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        self.finish();
        None
    }
}

impl Drop for Incomplete<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}

fn incomplete_ids_on(conn: &Connection) -> Result<VecDeque<RecordId>> {
    let mut stmt = conn.prepare("SELECT id FROM data WHERE output IS NULL ORDER BY id ASC")?;
    let ids = stmt
        .query_map([], |row| row.get(0).map(RecordId))?
        .collect::<std::result::Result<VecDeque<_>, _>>()?;
    Ok(ids)
}
