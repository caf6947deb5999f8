//! # workdb
//!
//! SQLite-backed work-item store for batch jobs.
//!
//! Inputs go in with [`WorkStore::add`], a worker walks
//! [`WorkStore::incomplete`] and records results with [`WorkStore::update`],
//! and finished work is exported as JSONL. Nothing becomes durable until the
//! caller commits.

pub mod codec;
pub mod config;
pub mod error;
pub mod jsonl;
pub mod model;
pub mod progress;
pub mod storage;
pub mod telemetry;

pub use error::{Error, Result};
pub use model::{ExportRecord, Record, RecordId};
pub use storage::{Incomplete, StoreOptions, WorkStore};
