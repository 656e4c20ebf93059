//! Monitor loop: grace delay, then probe rounds on a fixed interval until the
//! shutdown trigger fires.

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::core::signum::{PROBE_FAILURE_SIGNAL, signal_name};
use crate::logger::{LogEntry, LogSink, Severity, WatchdogEvent};
use crate::watchdog::callbacks::{ProbeOutcome, ProbeRef, evaluate_probe};
use crate::watchdog::signals::{SIGNALS_SUPPORTED, SignalRegistry};
use crate::watchdog::trigger::{ShutdownCause, ShutdownCoordinator};

/// How a single probe round ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Every probe was evaluated; none reported unhealthy.
    Completed { evaluated: usize, faults: usize },
    /// A probe reported unhealthy; later probes were skipped.
    Unhealthy { probe: String },
    /// The trigger had already fired before the round finished.
    Interrupted,
}

/// State owned by the `wdg-monitor` thread.
pub struct MonitorLoop {
    pub(crate) probes: Arc<RwLock<Vec<ProbeRef>>>,
    pub(crate) coordinator: Arc<ShutdownCoordinator>,
    pub(crate) signals: Arc<SignalRegistry>,
    pub(crate) sink: Arc<dyn LogSink>,
    pub(crate) interval: Duration,
    pub(crate) start_delay: Duration,
}

impl MonitorLoop {
    /// Thread body. Returns once the trigger has fired; never re-enters
    /// polling afterwards.
    pub fn run(&self) {
        if !self.coordinator.wait(self.start_delay) {
            self.ensure_probe_failure_signal();
            loop {
                self.run_round();
                if self.coordinator.wait(self.interval) {
                    break;
                }
            }
        }

        self.sink.log(
            &LogEntry::new(WatchdogEvent::MonitorLoopExited, Severity::Info)
                .with_details(format!("cause={}", self.cause_label())),
        );
    }

    /// Evaluate each probe in registration order.
    pub fn run_round(&self) -> RoundOutcome {
        // Snapshot so a slow probe never holds the registration lock.
        let probes = self.probes.read().clone();
        let mut faults = 0;

        for probe in &probes {
            if self.coordinator.is_triggered() {
                return RoundOutcome::Interrupted;
            }
            match evaluate_probe(probe.as_ref()) {
                ProbeOutcome::Healthy => {}
                ProbeOutcome::Unhealthy => {
                    self.sink.log(
                        &LogEntry::new(WatchdogEvent::ProbeUnhealthy, Severity::Warning)
                            .with_callable(probe.name()),
                    );
                    self.coordinator.fire(ShutdownCause::ProbeFailure);
                    return RoundOutcome::Unhealthy {
                        probe: probe.name().to_string(),
                    };
                }
                ProbeOutcome::Fault(reason) => {
                    faults += 1;
                    self.sink.log(
                        &LogEntry::new(WatchdogEvent::ProbeFault, Severity::Error)
                            .with_callable(probe.name())
                            .with_error(reason),
                    );
                }
            }
        }

        RoundOutcome::Completed {
            evaluated: probes.len(),
            faults,
        }
    }

    /// Add the probe-failure signal to the shutdown set on first loop entry.
    fn ensure_probe_failure_signal(&self) {
        if !SIGNALS_SUPPORTED || self.signals.is_registered(PROBE_FAILURE_SIGNAL) {
            return;
        }
        if let Err(e) = self.signals.register(&[PROBE_FAILURE_SIGNAL]) {
            self.sink.log(
                &LogEntry::new(WatchdogEvent::SignalRegistrationFault, Severity::Error)
                    .with_signal(Some(PROBE_FAILURE_SIGNAL), signal_name(PROBE_FAILURE_SIGNAL))
                    .with_error(e.to_string()),
            );
        }
    }

    fn cause_label(&self) -> String {
        self.coordinator
            .cause()
            .map_or_else(|| "none".to_string(), |cause| cause.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::logger::sink::MemorySink;
    use crate::watchdog::callbacks::{flag_probe, probe};

    fn monitor_with(probes: Vec<ProbeRef>) -> (MonitorLoop, Arc<MemorySink>) {
        let sink = MemorySink::new();
        let coordinator = Arc::new(ShutdownCoordinator::new(Vec::new(), sink.clone()));
        let signals = Arc::new(SignalRegistry::new(
            Arc::clone(&coordinator),
            sink.clone(),
        ));
        let monitor = MonitorLoop {
            probes: Arc::new(RwLock::new(probes)),
            coordinator,
            signals,
            sink: sink.clone(),
            interval: Duration::ZERO,
            start_delay: Duration::ZERO,
        };
        (monitor, sink)
    }

    fn counted(name: &str, counter: &Arc<AtomicUsize>, healthy: bool) -> ProbeRef {
        let c = Arc::clone(counter);
        flag_probe(name, move || {
            c.fetch_add(1, Ordering::SeqCst);
            healthy
        })
    }

    #[test]
    fn unhealthy_probe_short_circuits_round() {
        let before = Arc::new(AtomicUsize::new(0));
        let after = Arc::new(AtomicUsize::new(0));
        let (monitor, sink) = monitor_with(vec![
            counted("first", &before, true),
            counted("failing", &before, false),
            counted("skipped", &after, true),
        ]);

        let outcome = monitor.run_round();

        assert_eq!(
            outcome,
            RoundOutcome::Unhealthy {
                probe: "failing".to_string()
            }
        );
        assert_eq!(before.load(Ordering::SeqCst), 2);
        assert_eq!(after.load(Ordering::SeqCst), 0);
        assert_eq!(monitor.coordinator.cause(), Some(ShutdownCause::ProbeFailure));
        assert_eq!(sink.count(WatchdogEvent::ProbeUnhealthy), 1);
    }

    #[test]
    fn faulting_probe_is_logged_and_round_continues() {
        let later = Arc::new(AtomicUsize::new(0));
        let (monitor, sink) = monitor_with(vec![
            probe("flaky", || Err("timeout".into())),
            counted("later", &later, true),
        ]);

        let outcome = monitor.run_round();

        assert_eq!(
            outcome,
            RoundOutcome::Completed {
                evaluated: 2,
                faults: 1
            }
        );
        assert_eq!(later.load(Ordering::SeqCst), 1);
        assert!(!monitor.coordinator.is_triggered());
        let faults = sink.events(WatchdogEvent::ProbeFault);
        assert_eq!(faults[0].callable.as_deref(), Some("flaky"));
        assert_eq!(faults[0].error_message.as_deref(), Some("timeout"));
    }

    #[test]
    fn round_stops_when_already_triggered() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (monitor, _sink) = monitor_with(vec![counted("never", &calls, true)]);
        monitor.coordinator.fire(ShutdownCause::Requested);

        assert_eq!(monitor.run_round(), RoundOutcome::Interrupted);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn trigger_mid_round_skips_remaining_probes() {
        let (monitor, _sink) = monitor_with(Vec::new());
        let coordinator = Arc::clone(&monitor.coordinator);
        let tail = Arc::new(AtomicUsize::new(0));
        monitor.probes.write().extend([
            flag_probe("fires-signal", move || {
                coordinator.fire(ShutdownCause::Signal(15));
                true
            }),
            counted("tail", &tail, true),
        ]);

        assert_eq!(monitor.run_round(), RoundOutcome::Interrupted);
        assert_eq!(tail.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn run_exits_after_probe_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let (monitor, sink) = monitor_with(vec![flag_probe("third-call-fails", move || {
            c.fetch_add(1, Ordering::SeqCst) < 2
        })]);

        monitor.run();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(monitor.coordinator.cause(), Some(ShutdownCause::ProbeFailure));
        assert_eq!(sink.count(WatchdogEvent::MonitorLoopExited), 1);
    }

    #[test]
    fn run_skips_probes_when_triggered_during_start_delay() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (mut monitor, _sink) = monitor_with(vec![counted("idle", &calls, true)]);
        monitor.start_delay = Duration::from_secs(60);
        monitor.coordinator.fire(ShutdownCause::Signal(2));

        monitor.run();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!monitor.signals.is_registered(PROBE_FAILURE_SIGNAL));
    }
}
