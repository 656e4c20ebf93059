//! Log sinks: the minimal logging capability the watchdog needs.
//!
//! The watchdog never touches a process-wide logger. It holds an
//! `Arc<dyn LogSink>` handed to it at construction and calls [`LogSink::log`]
//! from whichever thread the event happens on (caller, signal thread, or
//! monitor thread). Implementations must therefore be `Send + Sync` and must
//! not panic.

use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::logger::entry::{LogEntry, Severity, WatchdogEvent};

/// Destination for watchdog log entries.
pub trait LogSink: Send + Sync {
    /// Record one entry. Must not block for long and must not panic.
    fn log(&self, entry: &LogEntry);

    /// Flush any buffered output. Called once the shutdown sequence completes.
    fn flush(&self) {}
}

/// Human-readable lines on stderr, prefixed with `[WDG]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl LogSink for StderrSink {
    fn log(&self, entry: &LogEntry) {
        let level = match entry.severity {
            Severity::Info => "INFO",
            Severity::Warning => "WARN",
            Severity::Error => "ERROR",
        };
        let _ = writeln!(io::stderr(), "[WDG] {} {level} {}", entry.ts, entry.render());
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _entry: &LogEntry) {}
}

/// Keeps every entry in memory. Useful for tests and for embedding
/// applications that forward watchdog events elsewhere.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of everything logged so far.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Entries of one event type, in logging order.
    pub fn events(&self, event: WatchdogEvent) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.event == event)
            .cloned()
            .collect()
    }

    pub fn count(&self, event: WatchdogEvent) -> usize {
        self.entries.lock().iter().filter(|e| e.event == event).count()
    }
}

impl LogSink for MemorySink {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().push(entry.clone());
    }
}

/// Writes every entry to each inner sink in order.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn LogSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn LogSink>>) -> Self {
        Self { sinks }
    }
}

impl LogSink for FanoutSink {
    fn log(&self, entry: &LogEntry) {
        for sink in &self.sinks {
            sink.log(entry);
        }
    }

    fn flush(&self) {
        for sink in &self.sinks {
            sink.flush();
        }
    }
}
