//! Probe and teardown-action contracts, closure adapters, and fault isolation.
//!
//! Every invocation goes through [`evaluate_probe`] or [`execute_action`], which
//! turn both returned errors and panics into a plain message. A faulting
//! callback never unwinds into the watchdog.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::core::errors::CallbackError;

/// A health check evaluated once per monitor round.
///
/// `Ok(true)` is healthy, `Ok(false)` triggers shutdown, `Err(_)` is logged
/// and treated as inconclusive.
pub trait HealthProbe: Send + Sync {
    /// Identity used in log entries.
    fn name(&self) -> &str;

    /// Evaluate health once.
    fn check(&self) -> Result<bool, CallbackError>;
}

/// A shutdown or join callback.
pub trait TeardownAction: Send + Sync {
    /// Identity used in log entries.
    fn name(&self) -> &str;

    /// Perform the teardown step once.
    fn run(&self) -> Result<(), CallbackError>;
}

/// Shared probe handle, as stored by the watchdog.
pub type ProbeRef = Arc<dyn HealthProbe>;
/// Shared action handle, as stored by the watchdog.
pub type ActionRef = Arc<dyn TeardownAction>;

struct FnProbe<F> {
    name: String,
    check: F,
}

impl<F> HealthProbe for FnProbe<F>
where
    F: Fn() -> Result<bool, CallbackError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self) -> Result<bool, CallbackError> {
        (self.check)()
    }
}

struct FnAction<F> {
    name: String,
    run: F,
}

impl<F> TeardownAction for FnAction<F>
where
    F: Fn() -> Result<(), CallbackError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self) -> Result<(), CallbackError> {
        (self.run)()
    }
}

/// Wrap a fallible closure as a named probe.
pub fn probe<F>(name: impl Into<String>, check: F) -> ProbeRef
where
    F: Fn() -> Result<bool, CallbackError> + Send + Sync + 'static,
{
    Arc::new(FnProbe {
        name: name.into(),
        check,
    })
}

/// Wrap an infallible `Fn() -> bool` as a named probe.
pub fn flag_probe<F>(name: impl Into<String>, check: F) -> ProbeRef
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    probe(name, move || Ok(check()))
}

/// Wrap a fallible closure as a named teardown action.
pub fn action<F>(name: impl Into<String>, run: F) -> ActionRef
where
    F: Fn() -> Result<(), CallbackError> + Send + Sync + 'static,
{
    Arc::new(FnAction {
        name: name.into(),
        run,
    })
}

/// Wrap an infallible closure as a named teardown action.
pub fn simple_action<F>(name: impl Into<String>, run: F) -> ActionRef
where
    F: Fn() + Send + Sync + 'static,
{
    action(name, move || {
        run();
        Ok(())
    })
}

/// Result of one probe invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// `check` returned `Ok(true)`.
    Healthy,
    /// `check` returned `Ok(false)`.
    Unhealthy,
    /// The probe returned an error or panicked.
    Fault(String),
}

/// Run a probe with errors and panics contained.
pub fn evaluate_probe(probe: &dyn HealthProbe) -> ProbeOutcome {
    match catch_unwind(AssertUnwindSafe(|| probe.check())) {
        Ok(Ok(true)) => ProbeOutcome::Healthy,
        Ok(Ok(false)) => ProbeOutcome::Unhealthy,
        Ok(Err(e)) => ProbeOutcome::Fault(error_chain(e.as_ref())),
        Err(payload) => ProbeOutcome::Fault(panic_message(payload.as_ref())),
    }
}

/// Run an action with errors and panics contained. `Err` carries the message.
pub fn execute_action(action: &dyn TeardownAction) -> Result<(), String> {
    match catch_unwind(AssertUnwindSafe(|| action.run())) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(error_chain(e.as_ref())),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

/// Single-line rendering of an error and its sources.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut msg = err.to_string().replace('\n', " ");
    let mut source = err.source();
    while let Some(inner) = source {
        msg.push_str(": ");
        msg.push_str(&inner.to_string().replace('\n', " "));
        source = inner.source();
    }
    msg
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    format!("panicked: {detail}")
}
