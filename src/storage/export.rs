//! JSONL export of completed records and import of inputs.

use std::io::{BufRead, Write};
use std::path::Path;

use rusqlite::{Connection, params};
use serde::Serialize;
use tracing::info;

use super::WorkStore;
use crate::error::{Error, Result};
use crate::jsonl::{JsonlReader, JsonlWriter};
use crate::model::{ExportRecord, RecordId};
use crate::telemetry::metrics;
use crate::telemetry::store::start_store_span;

/// A completed row as stored: id plus raw input and output text.
type RawRow = (RecordId, String, String);

impl WorkStore {
    /// Write every record with both input and output set to `sink`, passing
    /// each through `transform(id, raw_input, raw_output)`.
    ///
    /// Rows are read `batch_size` at a time in ascending id order. Read-only:
    /// pending writes are visible but nothing is committed or rolled back.
    /// Returns the number of lines written.
    pub fn export_to<W, T, F>(
        &self,
        sink: &mut JsonlWriter<W>,
        batch_size: usize,
        mut transform: F,
    ) -> Result<u64>
    where
        W: Write,
        T: Serialize,
        F: FnMut(RecordId, &str, &str) -> Result<T>,
    {
        validate_batch_size(batch_size)?;
        let conn = self.conn()?;
        let span = start_store_span("export", &self.location);
        let _enter = span.enter();

        let mut after = i64::MIN;
        let mut exported = 0u64;
        loop {
            let batch = completed_batch_on(conn, after, batch_size)?;
            let Some((last_id, _, _)) = batch.last() else {
                break;
            };
            after = last_id.0;

            for (id, input, output) in &batch {
                let record = transform(*id, input, output)?;
                sink.write(&record)?;
                exported += 1;
            }
            if batch.len() < batch_size {
                break;
            }
        }

        metrics::records_exported().add(exported, &[]);
        info!(exported, batch_size, "exported completed records");
        Ok(exported)
    }

    /// Export completed records as `{"id", "input", "output"}` lines.
    pub fn export<W: Write>(&self, sink: &mut JsonlWriter<W>, batch_size: usize) -> Result<u64> {
        self.export_to(sink, batch_size, |id, input, output| {
            Ok(ExportRecord {
                id,
                input: self.codec.decode(input)?,
                output: self.codec.decode(output)?,
            })
        })
    }

    /// Export completed records to a JSONL file, replacing it.
    ///
    /// The file is left untouched when `batch_size` is zero or the store is
    /// closed.
    pub fn write_jsonl(&self, path: impl AsRef<Path>, batch_size: usize) -> Result<u64> {
        validate_batch_size(batch_size)?;
        self.conn()?;
        let mut sink = JsonlWriter::create(path)?;
        let exported = self.export(&mut sink, batch_size)?;
        sink.finish()?;
        Ok(exported)
    }

    /// Export completed records to a JSONL file using a custom line shape.
    pub fn write_jsonl_with<T, F>(
        &self,
        path: impl AsRef<Path>,
        batch_size: usize,
        transform: F,
    ) -> Result<u64>
    where
        T: Serialize,
        F: FnMut(RecordId, &str, &str) -> Result<T>,
    {
        validate_batch_size(batch_size)?;
        self.conn()?;
        let mut sink = JsonlWriter::create(path)?;
        let exported = self.export_to(&mut sink, batch_size, transform)?;
        sink.finish()?;
        Ok(exported)
    }

    /// Add one record per JSONL line. Does not commit.
    ///
    /// Stops at the first malformed line; lines added before it stay pending.
    pub fn import_jsonl<R: BufRead>(&self, reader: R) -> Result<u64> {
        let span = start_store_span("import", &self.location);
        let _enter = span.enter();

        let mut added = 0u64;
        for value in JsonlReader::new(reader) {
            self.add(&value?)?;
            added += 1;
        }
        info!(added, "imported inputs");
        Ok(added)
    }
}

fn validate_batch_size(batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(Error::InvalidBatchSize(batch_size));
    }
    Ok(())
}

fn completed_batch_on(conn: &Connection, after: i64, limit: usize) -> Result<Vec<RawRow>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, input, output FROM data
         WHERE input IS NOT NULL AND output IS NOT NULL AND id > ?1
         ORDER BY id ASC
         LIMIT ?2",
    )?;
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);

    let rows = stmt
        .query_map(params![after, limit], |row| {
            Ok((RecordId(row.get(0)?), row.get(1)?, row.get(2)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
