//! Span helpers for store operations and progress sessions.

use tracing::Span;

/// Start a span for a bulk store operation (export, import).
pub fn start_store_span(operation: &str, location: &str) -> Span {
    tracing::info_span!(
        "workdb.store",
        "store.operation" = operation,
        "store.location" = location,
    )
}

/// Start a span for one progress session.
///
/// `progress.done` is declared empty and filled in by [`record_progress`].
pub fn start_progress_span(label: &str, total: u64, initial: u64) -> Span {
    tracing::info_span!(
        "workdb.progress",
        "progress.label" = label,
        "progress.total" = total,
        "progress.initial" = initial,
        "progress.done" = tracing::field::Empty,
    )
}

/// Record the current position of a progress session and emit an event.
pub fn record_progress(span: &Span, done: u64, total: u64) {
    span.record("progress.done", done);
    span.in_scope(|| {
        tracing::info!(done, total, "progress");
    });
}
