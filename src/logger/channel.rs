//! Non-blocking channel sink: a dedicated logger thread owns the real sink.
//!
//! Architecture: the watchdog's signal and monitor threads send `LogEntry`
//! values through a bounded crossbeam channel. `try_send()` ensures neither
//! the shutdown trigger nor a probe round is ever blocked by slow log I/O.
//! The `wdg-logger` thread drains the channel into the inner sink.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::Mutex;

use crate::core::errors::{Result, WdgError};
use crate::logger::entry::{LogEntry, Severity, WatchdogEvent};
use crate::logger::sink::LogSink;

/// Default bounded channel capacity for log entries.
pub const CHANNEL_CAPACITY: usize = 256;

/// Upper bound on how long `flush()` waits for the logger thread to drain.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

enum LoggerMessage {
    Entry(LogEntry),
    /// Drain everything queued before this message, then acknowledge.
    Flush(Sender<()>),
    /// Sentinel to request graceful shutdown of the logger thread.
    Shutdown,
}

/// Forwards entries to a background logger thread.
pub struct ChannelSink {
    tx: Sender<LoggerMessage>,
    dropped_events: Arc<AtomicU64>,
    join: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ChannelSink {
    /// Spawn the logger thread in front of `inner`.
    pub fn spawn(inner: Arc<dyn LogSink>, capacity: usize) -> Result<Self> {
        let (tx, rx) = bounded::<LoggerMessage>(capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        let dropped_clone = Arc::clone(&dropped);

        let join = thread::Builder::new()
            .name("wdg-logger".to_string())
            .spawn(move || {
                logger_thread_main(&rx, inner.as_ref(), &dropped_clone);
            })
            .map_err(|e| WdgError::Runtime {
                details: format!("failed to spawn logger thread: {e}"),
            })?;

        Ok(Self {
            tx,
            dropped_events: dropped,
            join: Mutex::new(Some(join)),
        })
    }

    /// Number of entries dropped due to channel back-pressure.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Stop the logger thread after it drains the queue. Idempotent.
    pub fn shutdown(&self) {
        let Some(join) = self.join.lock().take() else {
            return;
        };
        let _ = self.tx.send(LoggerMessage::Shutdown);
        let _ = join.join();
    }
}

impl LogSink for ChannelSink {
    fn log(&self, entry: &LogEntry) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(LoggerMessage::Entry(entry.clone())) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
        // Disconnected is fine after shutdown.
    }

    fn flush(&self) {
        let (ack_tx, ack_rx) = bounded::<()>(1);
        if self
            .tx
            .send_timeout(LoggerMessage::Flush(ack_tx), FLUSH_TIMEOUT)
            .is_ok()
        {
            let _ = ack_rx.recv_timeout(FLUSH_TIMEOUT);
        }
    }
}

impl Drop for ChannelSink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ──────────────────── logger thread ────────────────────

fn logger_thread_main(rx: &Receiver<LoggerMessage>, inner: &dyn LogSink, dropped: &AtomicU64) {
    while let Ok(message) = rx.recv() {
        let d = dropped.swap(0, Ordering::Relaxed);
        if d > 0 {
            inner.log(
                &LogEntry::new(WatchdogEvent::LogEventsDropped, Severity::Warning)
                    .with_details(format!("{d} log events dropped due to back-pressure")),
            );
        }

        match message {
            LoggerMessage::Entry(entry) => inner.log(&entry),
            LoggerMessage::Flush(ack) => {
                inner.flush();
                let _ = ack.send(());
            }
            LoggerMessage::Shutdown => break,
        }
    }

    inner.flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::sink::MemorySink;

    #[test]
    fn entries_reach_inner_sink_after_flush() {
        let memory = MemorySink::new();
        let sink = ChannelSink::spawn(memory.clone(), 16).unwrap();

        sink.log(&LogEntry::new(WatchdogEvent::SignalCaught, Severity::Warning));
        sink.log(&LogEntry::new(WatchdogEvent::ShutdownComplete, Severity::Info));
        sink.flush();

        assert_eq!(memory.entries().len(), 2);
        assert_eq!(sink.dropped_events(), 0);
    }

    #[test]
    fn shutdown_drains_and_is_idempotent() {
        let memory = MemorySink::new();
        let sink = ChannelSink::spawn(memory.clone(), 16).unwrap();
        for _ in 0..5 {
            sink.log(&LogEntry::new(WatchdogEvent::ProbeFault, Severity::Error));
        }
        sink.shutdown();
        sink.shutdown();

        assert_eq!(memory.count(WatchdogEvent::ProbeFault), 5);

        // Logging after shutdown is silently ignored.
        sink.log(&LogEntry::new(WatchdogEvent::ProbeFault, Severity::Error));
        sink.flush();
        assert_eq!(memory.count(WatchdogEvent::ProbeFault), 5);
    }

    #[test]
    fn sink_is_shareable_across_threads() {
        let memory = MemorySink::new();
        let sink: Arc<dyn LogSink> = Arc::new(ChannelSink::spawn(memory.clone(), 64).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let sink = Arc::clone(&sink);
                thread::spawn(move || {
                    for _ in 0..10 {
                        sink.log(&LogEntry::new(WatchdogEvent::ProbeFault, Severity::Error));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        sink.flush();

        assert_eq!(memory.count(WatchdogEvent::ProbeFault), 40);
    }
}
