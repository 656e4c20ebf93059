//! WDG-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::PathBuf;

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, WdgError>;

/// Error raised by a probe or teardown action.
///
/// Callback faults are logged and contained; they never become a [`WdgError`].
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error type for the watchdog.
#[derive(Debug, Error)]
pub enum WdgError {
    #[error("[WDG-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[WDG-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[WDG-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[WDG-1004] unknown signal name: {name}")]
    UnknownSignal { name: String },

    #[error("[WDG-1101] unsupported platform: {details}")]
    UnsupportedPlatform { details: String },

    #[error("[WDG-2001] failed to register signal {signal}: {source}")]
    SignalRegistration {
        signal: i32,
        #[source]
        source: std::io::Error,
    },

    #[error("[WDG-2002] cannot {operation} while watchdog is {phase}")]
    Lifecycle {
        operation: &'static str,
        phase: &'static str,
    },

    #[error("[WDG-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[WDG-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[WDG-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl WdgError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "WDG-1001",
            Self::MissingConfig { .. } => "WDG-1002",
            Self::ConfigParse { .. } => "WDG-1003",
            Self::UnknownSignal { .. } => "WDG-1004",
            Self::UnsupportedPlatform { .. } => "WDG-1101",
            Self::SignalRegistration { .. } => "WDG-2001",
            Self::Lifecycle { .. } => "WDG-2002",
            Self::Serialization { .. } => "WDG-2101",
            Self::Io { .. } => "WDG-3002",
            Self::Runtime { .. } => "WDG-3900",
        }
    }

}

impl From<serde_json::Error> for WdgError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for WdgError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<toml::ser::Error> for WdgError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Serialization {
            context: "toml",
            details: value.to_string(),
        }
    }
}
