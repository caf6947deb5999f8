//! Line-delimited JSON sources and sinks.
//!
//! One JSON value per line, UTF-8, newline-terminated. Writers stream:
//! nothing is buffered beyond the underlying writer's own buffer.

use std::fs::File;
use std::io::{BufRead, BufWriter, Lines, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// Writes one serialized value per line.
pub struct JsonlWriter<W: Write> {
    inner: W,
    written: u64,
}

impl JsonlWriter<BufWriter<File>> {
    /// Create (or truncate) a JSONL file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> JsonlWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    pub fn write<T: Serialize + ?Sized>(&mut self, record: &T) -> Result<()> {
        serde_json::to_writer(&mut self.inner, record)?;
        self.inner.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    /// Number of lines written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Reads one JSON value per line. Blank lines are skipped.
pub struct JsonlReader<R: BufRead> {
    lines: Lines<R>,
}

impl<R: BufRead> JsonlReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }
}

impl<R: BufRead> Iterator for JsonlReader<R> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(serde_json::from_str(&line).map_err(Into::into));
        }
    }
}
