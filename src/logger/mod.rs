//! Logging: a minimal sink trait plus stderr, JSONL, and channel-backed sinks.

pub mod channel;
pub mod entry;
pub mod jsonl;
pub mod sink;

pub use entry::{LogEntry, Severity, WatchdogEvent};
pub use sink::LogSink;
