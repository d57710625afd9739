//! Operator-visible logging for conditions that are observed but never
//! surfaced as errors: slow lock acquisitions, suppressed auxiliary-output
//! failures (Markdown, git probe, directory fsync, receipt signing).
//!
//! This crate does not depend on `tracing`; callers that want those
//! messages routed into their own telemetry implement [`Sink`].

use std::sync::{Arc, Mutex};

pub trait Sink: Send + Sync {
    fn info(&self, msg: &str);
    fn warn(&self, msg: &str);
    fn error(&self, msg: &str);
}

/// Discards everything. The default when no sink is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl Sink for NullSink {
    fn info(&self, _msg: &str) {}
    fn warn(&self, _msg: &str) {}
    fn error(&self, _msg: &str) {}
}

/// Writes to stderr, prefixed by level. Intended for examples and tests,
/// not production use.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl Sink for StderrSink {
    fn info(&self, msg: &str) {
        eprintln!("[info] {msg}");
    }
    fn warn(&self, msg: &str) {
        eprintln!("[warn] {msg}");
    }
    fn error(&self, msg: &str) {
        eprintln!("[error] {msg}");
    }
}

/// Records messages in-memory; used by tests asserting a suppressed
/// failure was actually logged.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    lines: Arc<Mutex<Vec<(&'static str, String)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(&'static str, String)> {
        self.lines.lock().expect("recording sink mutex poisoned").clone()
    }
}

impl Sink for RecordingSink {
    fn info(&self, msg: &str) {
        self.lines.lock().expect("recording sink mutex poisoned").push(("info", msg.to_string()));
    }
    fn warn(&self, msg: &str) {
        self.lines.lock().expect("recording sink mutex poisoned").push(("warn", msg.to_string()));
    }
    fn error(&self, msg: &str) {
        self.lines.lock().expect("recording sink mutex poisoned").push(("error", msg.to_string()));
    }
}

pub type SharedSink = Arc<dyn Sink>;

pub fn null_sink() -> SharedSink {
    Arc::new(NullSink)
}
