//! Top-level CLI definition and dispatch.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde_json::json;
use thiserror::Error;

use process_watchdog::core::config::WatchdogConfig;
use process_watchdog::core::errors::CallbackError;
use process_watchdog::watchdog::callbacks::{HealthProbe, ProbeRef, action};
use process_watchdog::watchdog::{ShutdownHandle, Watchdog, WatchdogOptions};

/// wdg: supervise a heartbeat file and shut down cleanly on signals.
#[derive(Debug, Parser)]
#[command(
    name = "wdg",
    author,
    version,
    about = "Process watchdog - health probes and graceful shutdown",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Load and validate configuration, then print the effective settings.
    CheckConfig,
    /// Watch a heartbeat file until a signal or a stale heartbeat.
    Run(RunArgs),
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    /// File whose mtime is refreshed by the supervised process.
    #[arg(long, value_name = "PATH")]
    heartbeat_file: PathBuf,
    /// Heartbeat older than this is unhealthy.
    #[arg(long, value_name = "SECONDS")]
    stale_after_secs: u64,
    /// Write the shutdown cause here once shutdown completes.
    #[arg(long, value_name = "PATH")]
    shutdown_marker: Option<PathBuf>,
    /// Override the configured start delay.
    #[arg(long, value_name = "MS")]
    start_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    match &cli.command {
        Command::CheckConfig => run_check_config(cli),
        Command::Run(args) => run_watchdog(cli, args),
    }
}

const fn output_mode(cli: &Cli) -> OutputMode {
    if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    }
}

fn write_json_line(value: &serde_json::Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

fn run_check_config(cli: &Cli) -> Result<(), CliError> {
    match WatchdogConfig::load(cli.config.as_deref()) {
        Ok(config) => {
            match output_mode(cli) {
                OutputMode::Human => {
                    let toml_str = config
                        .to_toml()
                        .map_err(|e| CliError::Runtime(e.to_string()))?;
                    println!("Configuration is valid.");
                    println!();
                    print!("{toml_str}");
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "check-config",
                        "valid": true,
                        "config": serde_json::to_value(&config)?,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Err(e) => {
            if output_mode(cli) == OutputMode::Json {
                let payload = json!({
                    "command": "check-config",
                    "valid": false,
                    "code": e.code(),
                    "error": e.to_string(),
                });
                write_json_line(&payload)?;
            }
            Err(CliError::User(format!("invalid config: {e}")))
        }
    }
}

fn run_watchdog(cli: &Cli, args: &RunArgs) -> Result<(), CliError> {
    if args.stale_after_secs == 0 {
        return Err(CliError::User(
            "--stale-after-secs must be greater than zero".to_string(),
        ));
    }

    let config = WatchdogConfig::load(cli.config.as_deref())
        .map_err(|e| CliError::User(format!("invalid config: {e}")))?;
    let options =
        WatchdogOptions::from_config(&config).map_err(|e| CliError::Runtime(e.to_string()))?;
    let watchdog = Watchdog::new(options).map_err(|e| CliError::Runtime(e.to_string()))?;

    let heartbeat: ProbeRef = Arc::new(HeartbeatProbe {
        path: args.heartbeat_file.clone(),
        max_age: Duration::from_secs(args.stale_after_secs),
    });
    watchdog.register_monitor_probes([heartbeat]);

    if let Some(marker) = &args.shutdown_marker {
        let handle = watchdog.shutdown_handle();
        let marker = marker.clone();
        watchdog.register_join_actions([action("write-shutdown-marker", move || {
            write_marker(&marker, &handle)
        })]);
    }

    let delay = args
        .start_delay_ms
        .map_or_else(|| config.start_delay(), Duration::from_millis);
    watchdog
        .start(delay)
        .map_err(|e| CliError::Runtime(e.to_string()))?;
    watchdog
        .join()
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    let cause = watchdog
        .shutdown_cause()
        .map_or_else(|| "unknown".to_string(), |c| c.to_string());
    match output_mode(cli) {
        OutputMode::Human => println!("wdg: shutdown complete (cause: {cause})"),
        OutputMode::Json => write_json_line(&json!({
            "command": "run",
            "cause": cause,
            "signal": watchdog.shutdown_cause().and_then(|c| c.signal()),
        }))?,
    }
    Ok(())
}

fn write_marker(path: &Path, handle: &ShutdownHandle) -> Result<(), CallbackError> {
    let cause = handle
        .cause()
        .map_or_else(|| "unknown".to_string(), |c| c.to_string());
    fs::write(path, format!("{cause}\n"))?;
    Ok(())
}

/// Healthy while the heartbeat file exists and was touched recently.
struct HeartbeatProbe {
    path: PathBuf,
    max_age: Duration,
}

impl HealthProbe for HeartbeatProbe {
    fn name(&self) -> &str {
        "heartbeat-file"
    }

    fn check(&self) -> Result<bool, CallbackError> {
        let metadata = match fs::metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(Box::new(e)),
        };
        // An mtime in the future counts as fresh.
        let age = metadata.modified()?.elapsed().unwrap_or_default();
        Ok(age <= self.max_age)
    }
}
