//! Progress reporting for incomplete-record iteration.
//!
//! The store opens a session when `incomplete()` starts, advances it once per
//! `update()`, and closes it when iteration ends. Reporting never affects
//! what the store reads or writes, so [`NoProgress`] can replace any
//! reporter.

use tracing::Span;

use crate::telemetry::store::{record_progress, start_progress_span};

/// Factory for progress sessions.
pub trait Progress {
    /// Start a session tracking `total` units, `initial` of which are done.
    fn start(&self, total: u64, initial: u64, label: &str) -> Box<dyn ProgressSession>;
}

/// A live progress tracker.
pub trait ProgressSession {
    fn advance(&mut self, n: u64);
    /// Flush and release the session. Must tolerate repeated calls.
    fn close(&mut self);
}

/// Reports nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn start(&self, _total: u64, _initial: u64, _label: &str) -> Box<dyn ProgressSession> {
        Box::new(NoSession)
    }
}

struct NoSession;

impl ProgressSession for NoSession {
    fn advance(&mut self, _n: u64) {}
    fn close(&mut self) {}
}

/// Reports progress as tracing events on a per-session span.
#[derive(Debug, Clone, Copy)]
pub struct LogProgress {
    report_every: u64,
}

impl LogProgress {
    pub fn new() -> Self {
        Self { report_every: 1000 }
    }

    /// Emit a progress event every `n` advanced units (minimum 1).
    pub fn every(n: u64) -> Self {
        Self {
            report_every: n.max(1),
        }
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress for LogProgress {
    fn start(&self, total: u64, initial: u64, label: &str) -> Box<dyn ProgressSession> {
        let span = start_progress_span(label, total, initial);
        Box::new(LogSession {
            span,
            total,
            done: initial,
            last_reported: initial,
            report_every: self.report_every,
            closed: false,
        })
    }
}

struct LogSession {
    span: Span,
    total: u64,
    done: u64,
    last_reported: u64,
    report_every: u64,
    closed: bool,
}

impl ProgressSession for LogSession {
    fn advance(&mut self, n: u64) {
        if self.closed {
            return;
        }
        self.done = self.done.saturating_add(n);
        if self.done - self.last_reported >= self.report_every {
            record_progress(&self.span, self.done, self.total);
            self.last_reported = self.done;
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        record_progress(&self.span, self.done, self.total);
    }
}
