//! Metric instruments for store operations.
//!
//! Created from the global `"workdb"` meter. Without an installed meter
//! provider they record nothing.

use opentelemetry::metrics::{Counter, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("workdb")
}

/// Counter: inputs added (pending or committed).
pub fn records_added() -> Counter<u64> {
    meter()
        .u64_counter("workdb.records.added")
        .with_description("Number of inputs added")
        .build()
}

/// Counter: `update` calls, including ones that matched no record.
pub fn records_updated() -> Counter<u64> {
    meter()
        .u64_counter("workdb.records.updated")
        .with_description("Number of output updates")
        .build()
}

/// Counter: records deleted by dedup.
pub fn records_deduplicated() -> Counter<u64> {
    meter()
        .u64_counter("workdb.records.deduplicated")
        .with_description("Number of duplicate records removed")
        .build()
}

/// Counter: lines written by export.
pub fn records_exported() -> Counter<u64> {
    meter()
        .u64_counter("workdb.records.exported")
        .with_description("Number of completed records exported")
        .build()
}

/// Counter: transaction boundaries.
/// Labels: `operation` ("begin" | "commit" | "rollback").
pub fn transactions() -> Counter<u64> {
    meter()
        .u64_counter("workdb.transactions")
        .with_description("Number of explicit transaction operations")
        .build()
}
