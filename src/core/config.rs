//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, WdgError};
use crate::core::signum::{is_forbidden, parse_signal};

/// Default polling interval between probe rounds.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(2);

/// Default grace period before the first probe round.
pub const DEFAULT_START_DELAY: Duration = Duration::from_secs(5);

/// Full watchdog configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Pause between probe rounds.
    pub monitor_interval_ms: u64,
    /// Grace period after `start()` before probes run.
    pub start_delay_ms: u64,
    /// Signal names (or numbers) treated as termination requests.
    pub shutdown_signals: Vec<String>,
    pub logging: LoggingConfig,
}

/// Where watchdog events are written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Human-readable lines on stderr.
    pub stderr: bool,
    /// JSONL event log. `None` disables file logging.
    pub jsonl_path: Option<PathBuf>,
    pub fallback_path: Option<PathBuf>,
    /// Past this size the log is moved aside to `<jsonl_path>.1`.
    pub max_size_bytes: u64,
    /// Capacity of the channel in front of the sinks.
    pub channel_capacity: usize,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            monitor_interval_ms: duration_ms(DEFAULT_MONITOR_INTERVAL),
            start_delay_ms: duration_ms(DEFAULT_START_DELAY),
            shutdown_signals: vec!["SIGTERM".to_string(), "SIGINT".to_string()],
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stderr: true,
            jsonl_path: None,
            fallback_path: None,
            max_size_bytes: crate::logger::jsonl::DEFAULT_MAX_BYTES,
            channel_capacity: crate::logger::channel::CHANNEL_CAPACITY,
        }
    }
}

impl WatchdogConfig {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        env::var_os("WDG_CONFIG").map_or_else(
            || PathBuf::from("/etc/wdg/config.toml"),
            PathBuf::from,
        )
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| WdgError::Io {
                path: path_buf.clone(),
                source,
            })?;
            Self::from_toml(&raw)?
        } else if is_explicit_path {
            return Err(WdgError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.apply_env_overrides_from(env_var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document without env overrides or validation.
    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    #[must_use]
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    #[must_use]
    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    /// Resolve `shutdown_signals` to signal numbers, preserving order and
    /// dropping duplicates.
    pub fn signal_numbers(&self) -> Result<Vec<i32>> {
        let mut out = Vec::with_capacity(self.shutdown_signals.len());
        for name in &self.shutdown_signals {
            let num = parse_signal(name)?;
            if !out.contains(&num) {
                out.push(num);
            }
        }
        Ok(out)
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("WDG_MONITOR_INTERVAL_MS") {
            self.monitor_interval_ms = parse_env_u64("WDG_MONITOR_INTERVAL_MS", &raw)?;
        }
        if let Some(raw) = lookup("WDG_START_DELAY_MS") {
            self.start_delay_ms = parse_env_u64("WDG_START_DELAY_MS", &raw)?;
        }
        if let Some(raw) = lookup("WDG_SHUTDOWN_SIGNALS") {
            self.shutdown_signals = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(raw) = lookup("WDG_LOG_JSONL_PATH") {
            self.logging.jsonl_path = Some(PathBuf::from(raw));
        }
        if let Some(raw) = lookup("WDG_LOG_STDERR") {
            self.logging.stderr = parse_env_bool("WDG_LOG_STDERR", &raw)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for name in &self.shutdown_signals {
            let num = parse_signal(name)?;
            if is_forbidden(num) {
                return Err(WdgError::InvalidConfig {
                    details: format!("shutdown signal {name} cannot be caught"),
                });
            }
        }

        if self.logging.channel_capacity == 0 {
            return Err(WdgError::InvalidConfig {
                details: "logging.channel_capacity must be >= 1".to_string(),
            });
        }

        if self.logging.jsonl_path.is_some() && self.logging.max_size_bytes == 0 {
            return Err(WdgError::InvalidConfig {
                details: "logging.max_size_bytes must be > 0".to_string(),
            });
        }

        Ok(())
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn duration_ms(d: Duration) -> u64 {
    d.as_millis() as u64
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env_u64(name: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|error| WdgError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}

fn parse_env_bool(name: &str, raw: &str) -> Result<bool> {
    raw.trim()
        .parse::<bool>()
        .map_err(|error| WdgError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}
