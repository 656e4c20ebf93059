//! CLI smoke tests and end-to-end `wdg run` scenarios.

mod common;

use std::fs;
use std::process::Stdio;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;

#[test]
fn help_command_prints_usage() {
    let result = common::run_cli_case("help_command_prints_usage", &["--help"]);
    assert!(
        result.status.success(),
        "expected success; log: {}",
        result.log_path.display()
    );
    assert!(
        result.stdout.contains("Usage: wdg [OPTIONS] <COMMAND>"),
        "missing help banner; log: {}",
        result.log_path.display()
    );
}

#[test]
fn version_command_prints_version() {
    let result = common::run_cli_case("version_command_prints_version", &["--version"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert!(
        result.stdout.contains(env!("CARGO_PKG_VERSION")),
        "log: {}",
        result.log_path.display()
    );
}

#[test]
fn check_config_uses_defaults_when_file_is_absent() {
    let result = common::run_cli_case("check_config_defaults", &["check-config"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert!(result.stdout.contains("Configuration is valid."));
    assert!(result.stdout.contains("monitor_interval_ms = 2000"));
}

#[test]
fn check_config_json_reports_file_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wdg.toml");
    fs::write(
        &path,
        "monitor_interval_ms = 750\nshutdown_signals = [\"SIGTERM\"]\n",
    )
    .unwrap();

    let result = common::run_cli_case(
        "check_config_json",
        &["--json", "check-config", "--config", path.to_str().unwrap()],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());

    let payload: Value = serde_json::from_str(result.stdout.trim()).unwrap();
    assert_eq!(payload["valid"], true);
    assert_eq!(payload["config"]["monitor_interval_ms"], 750);
    assert_eq!(payload["config"]["shutdown_signals"][0], "SIGTERM");
}

#[test]
fn check_config_accepts_zero_monitor_interval() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wdg.toml");
    fs::write(&path, "monitor_interval_ms = 0\n").unwrap();

    let result = common::run_cli_case(
        "check_config_zero_interval",
        &["--json", "check-config", "--config", path.to_str().unwrap()],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());

    let payload: Value = serde_json::from_str(result.stdout.trim()).unwrap();
    assert_eq!(payload["valid"], true);
    assert_eq!(payload["config"]["monitor_interval_ms"], 0);
}

#[test]
fn check_config_rejects_uncatchable_signal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wdg.toml");
    fs::write(&path, "shutdown_signals = [\"SIGKILL\"]\n").unwrap();

    let result = common::run_cli_case(
        "check_config_sigkill",
        &["check-config", "--config", path.to_str().unwrap()],
    );
    assert_eq!(result.status.code(), Some(1), "log: {}", result.log_path.display());
    assert!(result.stderr.contains("WDG-1001"), "log: {}", result.log_path.display());
}

#[test]
fn check_config_explicit_missing_file_fails() {
    let result = common::run_cli_case(
        "check_config_missing",
        &["check-config", "--config", "/nonexistent/wdg/missing.toml"],
    );
    assert_eq!(result.status.code(), Some(1));
    assert!(result.stderr.contains("WDG-1002"), "log: {}", result.log_path.display());
}

#[test]
fn run_shuts_down_when_heartbeat_is_missing() {
    let dir = tempfile::tempdir().unwrap();
    let heartbeat = dir.path().join("heartbeat");
    let marker = dir.path().join("marker");

    let result = common::run_cli_case_with_env(
        "run_missing_heartbeat",
        &[
            "run",
            "--heartbeat-file",
            heartbeat.to_str().unwrap(),
            "--stale-after-secs",
            "30",
            "--shutdown-marker",
            marker.to_str().unwrap(),
            "--start-delay-ms",
            "0",
        ],
        &[("WDG_MONITOR_INTERVAL_MS", "50")],
    );

    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert!(result.stdout.contains("probe failure"), "log: {}", result.log_path.display());
    assert!(result.stderr.contains("watchdog: caught 'SIGABRT (probe failure)'"), "log: {}", result.log_path.display());
    let written = fs::read_to_string(&marker).unwrap();
    assert_eq!(written.trim(), "SIGABRT (probe failure)");
}

#[test]
fn run_rejects_zero_staleness() {
    let result = common::run_cli_case(
        "run_zero_stale",
        &["run", "--heartbeat-file", "/tmp/hb", "--stale-after-secs", "0"],
    );
    assert_eq!(result.status.code(), Some(1));
}

#[cfg(unix)]
#[test]
fn run_exits_cleanly_on_sigterm() {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let dir = tempfile::tempdir().unwrap();
    let heartbeat = dir.path().join("heartbeat");
    let marker = dir.path().join("marker");
    let jsonl = dir.path().join("events.jsonl");
    fs::write(&heartbeat, b"").unwrap();

    let mut child = common::wdg_command()
        .args([
            "run",
            "--heartbeat-file",
            heartbeat.to_str().unwrap(),
            "--stale-after-secs",
            "3600",
            "--shutdown-marker",
            marker.to_str().unwrap(),
            "--start-delay-ms",
            "0",
        ])
        .env("WDG_LOG_JSONL_PATH", &jsonl)
        .env("WDG_LOG_STDERR", "false")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    // Signals are registered before `watchdog_started` is logged.
    let deadline = Instant::now() + Duration::from_secs(10);
    while !fs::read_to_string(&jsonl).is_ok_and(|s| s.contains("watchdog_started")) {
        assert!(Instant::now() < deadline, "watchdog never started");
        thread::sleep(Duration::from_millis(20));
    }

    let pid = Pid::from_raw(i32::try_from(child.id()).unwrap());
    kill(pid, Signal::SIGTERM).unwrap();
    let status = child.wait().unwrap();

    assert!(status.success());
    assert_eq!(fs::read_to_string(&marker).unwrap().trim(), "SIGTERM");

    let events: Vec<Value> = fs::read_to_string(&jsonl)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let caught: Vec<_> = events
        .iter()
        .filter(|e| e["event"] == "signal_caught")
        .collect();
    assert_eq!(caught.len(), 1);
    assert_eq!(caught[0]["signal_name"], "SIGTERM");
    assert_eq!(events.last().unwrap()["event"], "shutdown_complete");
}
