//! Watchdog log entries: the event vocabulary shared by every sink.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, WdgError};

/// Severity level for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Log event types emitted by the watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchdogEvent {
    WatchdogStarted,
    SignalRegistered,
    SignalRegistrationFault,
    SignalCaught,
    ShutdownInitiated,
    ProbeUnhealthy,
    ProbeFault,
    ShutdownActionFault,
    JoinActionFault,
    MonitorLoopExited,
    ShutdownComplete,
    LogEventsDropped,
}

/// A single log entry. All fields are optional except `ts`, `event`, `severity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO 8601 UTC timestamp.
    pub ts: String,
    /// Event type identifier.
    pub event: WatchdogEvent,
    /// Severity level.
    pub severity: Severity,
    /// Signal number involved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
    /// Rendered shutdown cause or signal name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_name: Option<String>,
    /// Name of the probe or action involved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callable: Option<String>,
    /// Human-readable error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Freeform details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// Create a new entry stamped with the current UTC time.
    pub fn new(event: WatchdogEvent, severity: Severity) -> Self {
        Self {
            ts: format_utc_now(),
            event,
            severity,
            signal: None,
            signal_name: None,
            callable: None,
            error_message: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_signal(mut self, signal: Option<i32>, name: impl Into<String>) -> Self {
        self.signal = signal;
        self.signal_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_callable(mut self, name: impl Into<String>) -> Self {
        self.callable = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// One-line human rendering, used by the stderr sink.
    pub fn render(&self) -> String {
        let signal = self.signal_name.as_deref().unwrap_or("?");
        let callable = self.callable.as_deref().unwrap_or("?");
        let reason = self.error_message.as_deref().unwrap_or("?");
        let mut line = match self.event {
            WatchdogEvent::WatchdogStarted => "watchdog: started".to_string(),
            WatchdogEvent::SignalRegistered => {
                format!("watchdog: registered shutdown signal '{signal}'")
            }
            WatchdogEvent::SignalRegistrationFault => format!(
                "watchdog error: registering shutdown signal failed: reason={reason} signal={signal}"
            ),
            WatchdogEvent::SignalCaught => format!("watchdog: caught '{signal}'"),
            WatchdogEvent::ShutdownInitiated => "watchdog: initiating shutdown ...".to_string(),
            WatchdogEvent::ProbeUnhealthy => {
                format!("watchdog: monitor callable reported unhealthy: callable={callable}")
            }
            WatchdogEvent::ProbeFault => format!(
                "watchdog error: executing monitor callable failed: reason={reason} callable={callable}"
            ),
            WatchdogEvent::ShutdownActionFault => format!(
                "watchdog error: executing shutdown callable failed: reason={reason} callable={callable}"
            ),
            WatchdogEvent::JoinActionFault => format!(
                "watchdog error: executing join callable failed: reason={reason} callable={callable}"
            ),
            WatchdogEvent::MonitorLoopExited => "watchdog: monitor loop exited".to_string(),
            WatchdogEvent::ShutdownComplete => "watchdog: shutdown complete".to_string(),
            WatchdogEvent::LogEventsDropped => "watchdog: log events dropped".to_string(),
        };
        if let Some(details) = &self.details {
            line.push_str(" (");
            line.push_str(details);
            line.push(')');
        }
        line
    }
}

/// Format current UTC time as ISO 8601.
fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
