//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use process_watchdog::prelude::*;
//! ```

// Core
pub use crate::core::config::{DEFAULT_MONITOR_INTERVAL, DEFAULT_START_DELAY, WatchdogConfig};
pub use crate::core::errors::{CallbackError, Result, WdgError};
pub use crate::core::signum::{parse_signal, signal_name};

// Logging
pub use crate::logger::channel::ChannelSink;
pub use crate::logger::jsonl::{JsonlOptions, JsonlSink};
pub use crate::logger::sink::{FanoutSink, MemorySink, NullSink, StderrSink};
pub use crate::logger::{LogEntry, LogSink, Severity, WatchdogEvent};

// Watchdog
pub use crate::watchdog::callbacks::{
    ActionRef, HealthProbe, ProbeRef, TeardownAction, action, flag_probe, probe, simple_action,
};
pub use crate::watchdog::trigger::ShutdownCause;
pub use crate::watchdog::{Phase, ShutdownHandle, Watchdog, WatchdogOptions};
