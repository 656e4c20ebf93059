//! Signal number ↔ name conversion.
//!
//! Names are accepted with or without the `SIG` prefix and case-insensitively
//! (`"term"`, `"SIGTERM"`, `"15"` all resolve to the same number).

use crate::core::errors::{Result, WdgError};

/// Signals that can never be caught; registering them is a configuration error.
#[cfg(unix)]
pub const FORBIDDEN_SIGNALS: &[&str] = &["SIGKILL", "SIGSTOP", "SIGILL", "SIGFPE", "SIGSEGV"];
#[cfg(not(unix))]
pub const FORBIDDEN_SIGNALS: &[&str] = &[];

/// Signal used to report a probe failure (the internal shutdown sentinel).
#[cfg(unix)]
pub const PROBE_FAILURE_SIGNAL: i32 = nix::sys::signal::Signal::SIGABRT as i32;
#[cfg(not(unix))]
pub const PROBE_FAILURE_SIGNAL: i32 = 22;

/// Human-readable name for a signal number, e.g. `15` → `"SIGTERM"`.
#[must_use]
pub fn signal_name(signal: i32) -> String {
    #[cfg(unix)]
    {
        nix::sys::signal::Signal::try_from(signal)
            .map_or_else(|_| format!("signal {signal}"), |sig| sig.as_str().to_string())
    }
    #[cfg(not(unix))]
    {
        format!("signal {signal}")
    }
}

/// Resolve a signal name or number to its platform signal number.
pub fn parse_signal(raw: &str) -> Result<i32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(WdgError::UnknownSignal {
            name: raw.to_string(),
        });
    }

    #[cfg(unix)]
    {
        use std::str::FromStr;

        use nix::sys::signal::Signal;

        if let Ok(num) = trimmed.parse::<i32>() {
            return Signal::try_from(num)
                .map(|sig| sig as i32)
                .map_err(|_| WdgError::UnknownSignal {
                    name: raw.to_string(),
                });
        }

        let upper = trimmed.to_ascii_uppercase();
        let canonical = if upper.starts_with("SIG") {
            upper
        } else {
            format!("SIG{upper}")
        };
        Signal::from_str(&canonical)
            .map(|sig| sig as i32)
            .map_err(|_| WdgError::UnknownSignal {
                name: raw.to_string(),
            })
    }
    #[cfg(not(unix))]
    {
        Err(WdgError::UnsupportedPlatform {
            details: format!("cannot resolve signal {trimmed:?} on this platform"),
        })
    }
}

/// Whether the signal can never be caught by a handler.
#[must_use]
pub fn is_forbidden(signal: i32) -> bool {
    let name = signal_name(signal);
    FORBIDDEN_SIGNALS.contains(&name.as_str())
}
