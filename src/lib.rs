#![deny(unsafe_code)]

//! process_watchdog: an in-process supervisor tying OS termination signals,
//! periodic health probes, and graceful-teardown callbacks into one
//! exactly-once shutdown sequence.
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use process_watchdog::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use process_watchdog::core::config::WatchdogConfig;
//! use process_watchdog::watchdog::{Watchdog, WatchdogOptions};
//! ```

pub mod prelude;

pub mod core;
pub mod logger;
pub mod watchdog;
