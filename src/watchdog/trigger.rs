//! The shutdown trigger: one indivisible NotTriggered → Triggered transition
//! shared by the signal thread, the monitor thread, and programmatic requests.
//!
//! `TriggerCell` guards the transition with a mutex and wakes every waiter
//! through a condvar. The wake is level-triggered: a waiter that arrives after
//! the transition returns immediately instead of sleeping a full interval.

#![allow(missing_docs)]

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};

use crate::core::signum::{PROBE_FAILURE_SIGNAL, signal_name};
use crate::logger::{LogEntry, LogSink, Severity, WatchdogEvent};
use crate::watchdog::callbacks::{ActionRef, execute_action};

// ──────────────────── cause ────────────────────

/// Why shutdown was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownCause {
    /// An external signal registered as a shutdown signal.
    Signal(i32),
    /// A probe reported unhealthy. Reported as SIGABRT.
    ProbeFailure,
    /// [`ShutdownHandle::request_shutdown`](crate::watchdog::ShutdownHandle::request_shutdown).
    Requested,
}

impl ShutdownCause {
    /// Signal number associated with the cause, if any.
    #[must_use]
    pub const fn signal(self) -> Option<i32> {
        match self {
            Self::Signal(n) => Some(n),
            Self::ProbeFailure => Some(PROBE_FAILURE_SIGNAL),
            Self::Requested => None,
        }
    }
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(n) => f.write_str(&signal_name(*n)),
            Self::ProbeFailure => write!(f, "{} (probe failure)", signal_name(PROBE_FAILURE_SIGNAL)),
            Self::Requested => f.write_str("shutdown request"),
        }
    }
}

// ──────────────────── trigger cell ────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TriggerState {
    NotTriggered,
    Triggered {
        cause: ShutdownCause,
        /// Shutdown actions have all returned.
        settled: bool,
    },
}

/// Exactly-once trigger with a level-triggered wake.
#[derive(Debug)]
pub struct TriggerCell {
    state: Mutex<TriggerState>,
    changed: Condvar,
}

impl Default for TriggerCell {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerCell {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TriggerState::NotTriggered),
            changed: Condvar::new(),
        }
    }

    /// Record `cause` if nothing has been recorded yet. Returns `true` only
    /// for the single winning call; every waiter is woken on a win.
    pub fn try_fire(&self, cause: ShutdownCause) -> bool {
        let mut state = self.state.lock();
        if *state != TriggerState::NotTriggered {
            return false;
        }
        *state = TriggerState::Triggered {
            cause,
            settled: false,
        };
        drop(state);
        self.changed.notify_all();
        true
    }

    /// Mark the shutdown actions as finished and wake `wait_settled` callers.
    pub fn settle(&self) {
        let mut state = self.state.lock();
        if let TriggerState::Triggered { settled, .. } = &mut *state {
            *settled = true;
        }
        drop(state);
        self.changed.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.state.lock() != TriggerState::NotTriggered
    }

    pub fn cause(&self) -> Option<ShutdownCause> {
        match *self.state.lock() {
            TriggerState::NotTriggered => None,
            TriggerState::Triggered { cause, .. } => Some(cause),
        }
    }

    /// Block for up to `timeout` or until triggered. Returns whether the
    /// trigger has fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();
        while *state == TriggerState::NotTriggered {
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
                None => self.changed.wait(&mut state),
            }
        }
        *state != TriggerState::NotTriggered
    }

    /// Block until the trigger has fired and its shutdown actions returned.
    pub fn wait_settled(&self) -> ShutdownCause {
        let mut state = self.state.lock();
        loop {
            if let TriggerState::Triggered {
                cause,
                settled: true,
            } = *state
            {
                return cause;
            }
            self.changed.wait(&mut state);
        }
    }
}

// ──────────────────── shutdown coordinator ────────────────────

/// Owns the trigger and the ordered shutdown actions; runs them exactly once.
pub struct ShutdownCoordinator {
    trigger: TriggerCell,
    actions: RwLock<Vec<ActionRef>>,
    sink: Arc<dyn LogSink>,
}

impl ShutdownCoordinator {
    pub fn new(actions: Vec<ActionRef>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            trigger: TriggerCell::new(),
            actions: RwLock::new(actions),
            sink,
        }
    }

    /// Append shutdown actions. They run in registration order.
    pub fn register_actions(&self, actions: impl IntoIterator<Item = ActionRef>) {
        self.actions.write().extend(actions);
    }

    /// Fire the trigger. Only the first call across all threads wins; the
    /// winner logs the cause and runs every shutdown action on the calling
    /// thread. Later calls return `false` without side effects.
    pub fn fire(&self, cause: ShutdownCause) -> bool {
        if !self.trigger.try_fire(cause) {
            return false;
        }

        self.sink.log(
            &LogEntry::new(WatchdogEvent::SignalCaught, Severity::Warning)
                .with_signal(cause.signal(), cause.to_string()),
        );

        let actions = self.actions.read().clone();
        if !actions.is_empty() {
            self.sink.log(&LogEntry::new(
                WatchdogEvent::ShutdownInitiated,
                Severity::Info,
            ));
            for action in &actions {
                if let Err(reason) = execute_action(action.as_ref()) {
                    self.sink.log(
                        &LogEntry::new(WatchdogEvent::ShutdownActionFault, Severity::Error)
                            .with_callable(action.name())
                            .with_error(reason),
                    );
                }
            }
        }

        self.trigger.settle();
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.trigger.is_triggered()
    }

    pub fn cause(&self) -> Option<ShutdownCause> {
        self.trigger.cause()
    }

    /// See [`TriggerCell::wait_timeout`].
    pub fn wait(&self, timeout: Duration) -> bool {
        self.trigger.wait_timeout(timeout)
    }

    /// See [`TriggerCell::wait_settled`].
    pub fn wait_settled(&self) -> ShutdownCause {
        self.trigger.wait_settled()
    }
}
