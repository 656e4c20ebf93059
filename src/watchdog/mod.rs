//! The watchdog: periodic health probes plus an exactly-once shutdown sequence.
//!
//! A [`Watchdog`] ties three things together:
//! - OS termination signals, forwarded by [`signals::SignalRegistry`];
//! - a `wdg-monitor` thread running [`monitor::MonitorLoop`];
//! - the shutdown trigger in [`trigger::ShutdownCoordinator`], which runs the
//!   shutdown actions once, on whichever thread fires first.
//!
//! Lifecycle: `Idle` → [`Watchdog::start`] → `Started` → [`Watchdog::join`] →
//! `Joined`. Join actions run only after the monitor thread has exited and the
//! shutdown actions have finished.
//!
//! ```rust,no_run
//! use process_watchdog::prelude::{
//!     DEFAULT_START_DELAY, Watchdog, WatchdogOptions, flag_probe, simple_action,
//! };
//!
//! let watchdog = Watchdog::new(WatchdogOptions::default())?;
//! watchdog.register_monitor_probes([flag_probe("always-up", || true)]);
//! watchdog.register_shutdown_actions([simple_action("flush", || {})]);
//! watchdog.start(DEFAULT_START_DELAY)?;
//! watchdog.join()?;
//! # Ok::<(), process_watchdog::core::errors::WdgError>(())
//! ```

pub mod callbacks;
pub mod monitor;
pub mod signals;
pub mod trigger;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::core::config::{DEFAULT_MONITOR_INTERVAL, WatchdogConfig};
use crate::core::errors::{Result, WdgError};
use crate::logger::channel::ChannelSink;
use crate::logger::jsonl::{JsonlOptions, JsonlSink};
use crate::logger::sink::{FanoutSink, NullSink, StderrSink};
use crate::logger::{LogEntry, LogSink, Severity, WatchdogEvent};

use self::callbacks::{ActionRef, ProbeRef, execute_action};
use self::monitor::MonitorLoop;
use self::signals::SignalRegistry;
use self::trigger::{ShutdownCause, ShutdownCoordinator};

pub use crate::core::config::DEFAULT_START_DELAY;

/// Construction-time options.
pub struct WatchdogOptions {
    /// Health probes, evaluated in order each round.
    pub probes: Vec<ProbeRef>,
    /// Run once when the trigger fires.
    pub shutdown_actions: Vec<ActionRef>,
    /// Run by [`Watchdog::join`] after the monitor thread exits.
    pub join_actions: Vec<ActionRef>,
    /// Signal numbers treated as termination requests.
    pub signals: Vec<i32>,
    /// Pause between probe rounds.
    pub monitor_interval: Duration,
    /// Receives every watchdog event, from whichever thread it happens on.
    pub sink: Arc<dyn LogSink>,
}

impl Default for WatchdogOptions {
    fn default() -> Self {
        Self {
            probes: Vec::new(),
            shutdown_actions: Vec::new(),
            join_actions: Vec::new(),
            signals: Vec::new(),
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
            sink: Arc::new(StderrSink),
        }
    }
}

impl WatchdogOptions {
    /// Signals, interval, and sink stack from a validated config.
    ///
    /// Sinks: stderr and/or JSONL, fanned out behind a [`ChannelSink`] so
    /// that the signal and monitor threads never wait on log I/O.
    pub fn from_config(config: &WatchdogConfig) -> Result<Self> {
        let logging = &config.logging;
        let mut sinks: Vec<Arc<dyn LogSink>> = Vec::new();
        if logging.stderr {
            sinks.push(Arc::new(StderrSink));
        }
        if let Some(path) = &logging.jsonl_path {
            sinks.push(Arc::new(JsonlSink::open(JsonlOptions {
                path: path.clone(),
                fallback_path: logging.fallback_path.clone(),
                max_bytes: logging.max_size_bytes,
            })));
        }

        let inner: Arc<dyn LogSink> = match sinks.len() {
            0 => Arc::new(NullSink),
            1 => sinks.remove(0),
            _ => Arc::new(FanoutSink::new(sinks)),
        };

        Ok(Self {
            signals: config.signal_numbers()?,
            monitor_interval: config.monitor_interval(),
            sink: Arc::new(ChannelSink::spawn(inner, logging.channel_capacity)?),
            ..Self::default()
        })
    }
}

/// Where the watchdog is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Constructed, monitor thread not yet spawned.
    Idle,
    /// Monitor thread running or finished, not yet joined.
    Started,
    /// `join` completed; terminal.
    Joined,
}

impl Phase {
    /// Lowercase name used in lifecycle errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Started => "started",
            Self::Joined => "joined",
        }
    }
}

struct Lifecycle {
    phase: Phase,
    monitor: Option<thread::JoinHandle<()>>,
}

/// Cloneable handle for requesting shutdown from any thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    coordinator: Arc<ShutdownCoordinator>,
}

impl ShutdownHandle {
    /// Fire the trigger with [`ShutdownCause::Requested`]. Shutdown actions run
    /// on the calling thread if this call wins; returns whether it did.
    pub fn request_shutdown(&self) -> bool {
        self.coordinator.fire(ShutdownCause::Requested)
    }

    /// Whether shutdown has been triggered by any source.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.coordinator.is_triggered()
    }

    /// The cause that won the trigger, if any.
    #[must_use]
    pub fn cause(&self) -> Option<ShutdownCause> {
        self.coordinator.cause()
    }
}

/// Process-lifetime supervisor.
///
/// All methods take `&self`; share it behind an `Arc` to call `join` on one
/// thread while others hold a [`ShutdownHandle`]. Registrations are meant to
/// happen before [`start`](Self::start). Later registrations are memory-safe
/// but may or may not be seen by a round already in progress.
pub struct Watchdog {
    probes: Arc<RwLock<Vec<ProbeRef>>>,
    join_actions: RwLock<Vec<ActionRef>>,
    coordinator: Arc<ShutdownCoordinator>,
    signals: Arc<SignalRegistry>,
    sink: Arc<dyn LogSink>,
    monitor_interval: Duration,
    lifecycle: Mutex<Lifecycle>,
}

impl Watchdog {
    /// Build a watchdog and register the initial signal set.
    pub fn new(options: WatchdogOptions) -> Result<Self> {
        let WatchdogOptions {
            probes,
            shutdown_actions,
            join_actions,
            signals,
            monitor_interval,
            sink,
        } = options;

        let coordinator = Arc::new(ShutdownCoordinator::new(
            shutdown_actions,
            Arc::clone(&sink),
        ));
        let registry = Arc::new(SignalRegistry::new(
            Arc::clone(&coordinator),
            Arc::clone(&sink),
        ));
        registry.register(&signals)?;

        Ok(Self {
            probes: Arc::new(RwLock::new(probes)),
            join_actions: RwLock::new(join_actions),
            coordinator,
            signals: registry,
            sink,
            monitor_interval,
            lifecycle: Mutex::new(Lifecycle {
                phase: Phase::Idle,
                monitor: None,
            }),
        })
    }

    /// Add termination signals. Already-registered numbers are skipped.
    pub fn register_shutdown_signals(&self, signals: &[i32]) -> Result<()> {
        self.signals.register(signals).map(|_| ())
    }

    /// Append shutdown actions. They run once, in registration order, when the
    /// trigger fires.
    pub fn register_shutdown_actions(&self, actions: impl IntoIterator<Item = ActionRef>) {
        self.coordinator.register_actions(actions);
    }

    /// Append join actions, run by [`Watchdog::join`] after shutdown completes.
    pub fn register_join_actions(&self, actions: impl IntoIterator<Item = ActionRef>) {
        self.join_actions.write().extend(actions);
    }

    /// Append probes. They join the next round the monitor thread starts.
    pub fn register_monitor_probes(&self, probes: impl IntoIterator<Item = ProbeRef>) {
        self.probes.write().extend(probes);
    }

    /// Spawn the monitor thread. Probing begins after `delay` unless the
    /// trigger fires first.
    pub fn start(&self, delay: Duration) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.phase != Phase::Idle {
            return Err(WdgError::Lifecycle {
                operation: "start",
                phase: lifecycle.phase.as_str(),
            });
        }

        let monitor = MonitorLoop {
            probes: Arc::clone(&self.probes),
            coordinator: Arc::clone(&self.coordinator),
            signals: Arc::clone(&self.signals),
            sink: Arc::clone(&self.sink),
            interval: self.monitor_interval,
            start_delay: delay,
        };
        let join = thread::Builder::new()
            .name("wdg-monitor".to_string())
            .spawn(move || monitor.run())
            .map_err(|source| WdgError::Runtime {
                details: format!("failed to spawn monitor thread: {source}"),
            })?;

        lifecycle.phase = Phase::Started;
        lifecycle.monitor = Some(join);
        drop(lifecycle);

        self.sink.log(
            &LogEntry::new(WatchdogEvent::WatchdogStarted, Severity::Info).with_details(format!(
                "monitor_interval={}ms start_delay={}ms probes={}",
                self.monitor_interval.as_millis(),
                delay.as_millis(),
                self.probes.read().len()
            )),
        );
        Ok(())
    }

    /// Block until the shutdown sequence has run, then run the join actions.
    ///
    /// Does not trigger shutdown itself. Errors if the watchdog was never
    /// started, was already joined, or another thread is already joining.
    pub fn join(&self) -> Result<()> {
        let monitor = {
            let mut lifecycle = self.lifecycle.lock();
            match (lifecycle.phase, lifecycle.monitor.take()) {
                (Phase::Started, Some(monitor)) => monitor,
                (Phase::Started, None) => {
                    return Err(WdgError::Lifecycle {
                        operation: "join",
                        phase: "joining",
                    });
                }
                (phase, _) => {
                    return Err(WdgError::Lifecycle {
                        operation: "join",
                        phase: phase.as_str(),
                    });
                }
            }
        };

        let panicked = monitor.join().is_err();
        // The winning trigger may still be running shutdown actions on
        // another thread.
        if self.coordinator.is_triggered() {
            self.coordinator.wait_settled();
        }

        let actions = self.join_actions.read().clone();
        for action in &actions {
            if let Err(reason) = execute_action(action.as_ref()) {
                self.sink.log(
                    &LogEntry::new(WatchdogEvent::JoinActionFault, Severity::Error)
                        .with_callable(action.name())
                        .with_error(reason),
                );
            }
        }

        self.lifecycle.lock().phase = Phase::Joined;

        let mut complete = LogEntry::new(WatchdogEvent::ShutdownComplete, Severity::Info);
        if let Some(cause) = self.coordinator.cause() {
            complete = complete.with_signal(cause.signal(), cause.to_string());
        }
        self.sink.log(&complete);
        self.sink.flush();

        if panicked {
            return Err(WdgError::Runtime {
                details: "monitor thread panicked".to_string(),
            });
        }
        Ok(())
    }

    /// Handle for programmatic shutdown requests.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            coordinator: Arc::clone(&self.coordinator),
        }
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.lifecycle.lock().phase
    }

    /// The cause that won the trigger, if any.
    #[must_use]
    pub fn shutdown_cause(&self) -> Option<ShutdownCause> {
        self.coordinator.cause()
    }

    /// Whether shutdown has been triggered by any source.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.coordinator.is_triggered()
    }

    /// Termination signals in registration order, including SIGABRT once
    /// the monitor loop has been entered.
    #[must_use]
    pub fn registered_signals(&self) -> Vec<i32> {
        self.signals.registered()
    }

    /// Pause between probe rounds.
    #[must_use]
    pub const fn monitor_interval(&self) -> Duration {
        self.monitor_interval
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.signals.close();
    }
}
