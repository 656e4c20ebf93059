//! Signal plumbing: routes OS termination signals into the shutdown trigger.
//!
//! Each registered signal gets two handler actions. The first records the
//! signal number in a shared first-writer-wins slot at delivery time. The
//! second is a `signal_hook::iterator::Signals` registration that wakes the
//! `wdg-signals` thread, which fires [`ShutdownCoordinator::fire`] with the
//! recorded signal. Shutdown actions never run inside a real signal handler,
//! and the cause is the first signal delivered, not the lowest-numbered one
//! pending when the thread wakes.
//!
//! Registration is process-wide by nature, but the forwarding thread only
//! holds this watchdog's coordinator.

#![allow(missing_docs)]

use std::sync::Arc;
#[cfg(all(unix, feature = "daemon"))]
use std::sync::atomic::{AtomicI32, Ordering};
#[cfg(all(unix, feature = "daemon"))]
use std::{io, thread};

use parking_lot::Mutex;

use crate::core::errors::{Result, WdgError};
#[cfg(all(unix, feature = "daemon"))]
use crate::core::signum::is_forbidden;
use crate::core::signum::signal_name;
use crate::logger::{LogEntry, LogSink, Severity, WatchdogEvent};
#[cfg(all(unix, feature = "daemon"))]
use crate::watchdog::trigger::ShutdownCause;
use crate::watchdog::trigger::ShutdownCoordinator;

/// Whether this build can install OS signal handlers.
pub const SIGNALS_SUPPORTED: bool = cfg!(all(unix, feature = "daemon"));

/// Empty value of the first-delivery slot. No valid signal is numbered 0.
#[cfg(all(unix, feature = "daemon"))]
const NO_SIGNAL: i32 = 0;

#[cfg(all(unix, feature = "daemon"))]
struct Listener {
    handle: signal_hook::iterator::Handle,
    join: Option<thread::JoinHandle<()>>,
}

#[derive(Default)]
struct RegistryState {
    registered: Vec<i32>,
    #[cfg(all(unix, feature = "daemon"))]
    listener: Option<Listener>,
    #[cfg(all(unix, feature = "daemon"))]
    recorders: Vec<signal_hook::SigId>,
}

/// The set of signals this watchdog treats as termination requests.
pub struct SignalRegistry {
    coordinator: Arc<ShutdownCoordinator>,
    sink: Arc<dyn LogSink>,
    state: Mutex<RegistryState>,
    #[cfg(all(unix, feature = "daemon"))]
    first_delivered: Arc<AtomicI32>,
}

impl SignalRegistry {
    pub fn new(coordinator: Arc<ShutdownCoordinator>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            coordinator,
            sink,
            state: Mutex::new(RegistryState::default()),
            #[cfg(all(unix, feature = "daemon"))]
            first_delivered: Arc::new(AtomicI32::new(NO_SIGNAL)),
        }
    }

    /// Register each signal not yet registered. Idempotent per signal number.
    /// Returns the signals that were newly added.
    pub fn register(&self, signals: &[i32]) -> Result<Vec<i32>> {
        let mut state = self.state.lock();
        let mut added = Vec::new();
        for &signal in signals {
            if state.registered.contains(&signal) {
                continue;
            }
            self.install(&mut state, signal)?;
            state.registered.push(signal);
            added.push(signal);
            self.sink.log(
                &LogEntry::new(WatchdogEvent::SignalRegistered, Severity::Info)
                    .with_signal(Some(signal), signal_name(signal)),
            );
        }
        Ok(added)
    }

    pub fn is_registered(&self, signal: i32) -> bool {
        self.state.lock().registered.contains(&signal)
    }

    /// Registered signal numbers in registration order.
    pub fn registered(&self) -> Vec<i32> {
        self.state.lock().registered.clone()
    }

    #[cfg(all(unix, feature = "daemon"))]
    fn install(&self, state: &mut RegistryState, signal: i32) -> Result<()> {
        if is_forbidden(signal) {
            return Err(WdgError::InvalidConfig {
                details: format!("signal {} cannot be caught", signal_name(signal)),
            });
        }

        // Registered before the wake-up so it runs first within the handler.
        let recorder = record_first_delivery(signal, Arc::clone(&self.first_delivered))
            .map_err(|source| WdgError::SignalRegistration { signal, source })?;
        if let Err(e) = self.forward(state, signal) {
            signal_hook::low_level::unregister(recorder);
            return Err(e);
        }
        state.recorders.push(recorder);
        Ok(())
    }

    #[cfg(all(unix, feature = "daemon"))]
    fn forward(&self, state: &mut RegistryState, signal: i32) -> Result<()> {
        if let Some(listener) = &state.listener {
            return listener
                .handle
                .add_signal(signal)
                .map_err(|source| WdgError::SignalRegistration { signal, source });
        }

        let mut signals = signal_hook::iterator::Signals::new([signal])
            .map_err(|source| WdgError::SignalRegistration { signal, source })?;
        let handle = signals.handle();
        let coordinator = Arc::clone(&self.coordinator);
        let first_delivered = Arc::clone(&self.first_delivered);
        let join = thread::Builder::new()
            .name("wdg-signals".to_string())
            .spawn(move || {
                for pending in signals.forever() {
                    let first = first_delivered.load(Ordering::SeqCst);
                    let signal = if first == NO_SIGNAL { pending } else { first };
                    coordinator.fire(ShutdownCause::Signal(signal));
                }
            })
            .map_err(|e| WdgError::Runtime {
                details: format!("failed to spawn signal thread: {e}"),
            })?;

        state.listener = Some(Listener {
            handle,
            join: Some(join),
        });
        Ok(())
    }

    #[cfg(not(all(unix, feature = "daemon")))]
    fn install(&self, _state: &mut RegistryState, signal: i32) -> Result<()> {
        let _ = &self.coordinator;
        Err(WdgError::UnsupportedPlatform {
            details: format!(
                "cannot register {}: OS signal handling is unavailable in this build",
                signal_name(signal)
            ),
        })
    }

    /// Stop forwarding signals and join the signal thread. Idempotent.
    pub fn close(&self) {
        #[cfg(all(unix, feature = "daemon"))]
        {
            let (listener, recorders) = {
                let mut state = self.state.lock();
                (state.listener.take(), std::mem::take(&mut state.recorders))
            };
            for recorder in recorders {
                signal_hook::low_level::unregister(recorder);
            }
            if let Some(mut listener) = listener {
                listener.handle.close();
                if let Some(join) = listener.join.take() {
                    let _ = join.join();
                }
            }
        }
    }
}

/// Store `signal` in `first` on delivery unless a signal is already there.
#[cfg(all(unix, feature = "daemon"))]
#[allow(unsafe_code)]
fn record_first_delivery(signal: i32, first: Arc<AtomicI32>) -> io::Result<signal_hook::SigId> {
    let action = move || {
        let _ = first.compare_exchange(NO_SIGNAL, signal, Ordering::SeqCst, Ordering::SeqCst);
    };
    // SAFETY: the action only does a lock-free atomic compare-exchange. It
    // does not allocate, lock, or touch anything else, so it is
    // async-signal-safe.
    unsafe { signal_hook::low_level::register(signal, action) }
}

impl Drop for SignalRegistry {
    fn drop(&mut self) {
        self.close();
    }
}
