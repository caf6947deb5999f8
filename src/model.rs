//! Core data model.
//!
//! A record is one unit of work: an input handed in by the caller and an
//! output filled in later by whoever processes it. A record is complete
//! once its output is set.

use serde::{Deserialize, Serialize};

/// Store-assigned record identifier.
///
/// Assigned in insertion order and never reused, even after deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A decoded copy of a stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub input: serde_json::Value,
    /// `None` until a producer supplies an output.
    pub output: Option<serde_json::Value>,
}

impl Record {
    pub fn is_complete(&self) -> bool {
        self.output.is_some()
    }
}

/// Default line shape written by export: `{"id", "input", "output"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub id: RecordId,
    pub input: serde_json::Value,
    pub output: serde_json::Value,
}
