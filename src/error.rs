//! Error types for workdb.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The storage engine failed to open, query, or close the store.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] rusqlite::Error),

    /// Transaction boundary misuse, e.g. `begin` inside an open transaction.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// A value could not be encoded, or stored text could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store is closed")]
    Closed,

    #[error("invalid batch size: {0}")]
    InvalidBatchSize(usize),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
