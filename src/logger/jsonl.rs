//! JSONL event log sink.
//!
//! Each entry is one JSON object on its own line, appended with a single
//! `write_all` on an append-mode file so a tailing reader never sees half a
//! line. Once the file would grow past `max_bytes` it is moved aside to
//! `<path>.1`, replacing the previous generation, and a fresh file is started.
//!
//! Destinations are tried in order: the configured path, the fallback path,
//! then stderr with a `[WDG-JSONL]` prefix. A failed open or write moves the
//! sink one step down; after stderr fails, entries are dropped.

#![allow(missing_docs)]

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::logger::entry::LogEntry;
use crate::logger::sink::LogSink;

/// Default size at which the event log is moved aside.
pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Where and how large the event log may be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonlOptions {
    pub path: PathBuf,
    /// Used when `path` cannot be opened or written (e.g. `/dev/shm/wdg.jsonl`).
    pub fallback_path: Option<PathBuf>,
    pub max_bytes: u64,
}

impl JsonlOptions {
    /// Primary path only, default size limit.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fallback_path: None,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

enum Candidate {
    File(PathBuf),
    Stderr,
}

enum Destination {
    File { path: PathBuf, file: File, len: u64 },
    Stderr,
    Dropped,
}

struct Chain {
    current: Destination,
    remaining: VecDeque<Candidate>,
}

impl Chain {
    /// Pop candidates until one can be used.
    fn step_down(&mut self) {
        self.current = loop {
            match self.remaining.pop_front() {
                Some(Candidate::File(path)) => match open_append(&path) {
                    Ok((file, len)) => break Destination::File { path, file, len },
                    Err(e) => {
                        let _ = writeln!(
                            io::stderr(),
                            "[WDG-JSONL] cannot open {}: {e}",
                            path.display()
                        );
                    }
                },
                Some(Candidate::Stderr) => break Destination::Stderr,
                None => break Destination::Dropped,
            }
        };
    }

    fn append(&mut self, line: &str, max_bytes: u64) {
        loop {
            match &mut self.current {
                Destination::File { path, file, len } => {
                    match append_to_file(path, file, len, line, max_bytes) {
                        Ok(()) => return,
                        Err(e) => {
                            let _ = writeln!(
                                io::stderr(),
                                "[WDG-JSONL] write to {} failed: {e}",
                                path.display()
                            );
                        }
                    }
                }
                Destination::Stderr => {
                    if write!(io::stderr(), "[WDG-JSONL] {line}").is_ok() {
                        return;
                    }
                }
                Destination::Dropped => return,
            }
            self.step_down();
        }
    }
}

/// Line-delimited JSON file sink. Never panics and never reports failure to
/// the caller.
pub struct JsonlSink {
    max_bytes: u64,
    chain: Mutex<Chain>,
}

impl JsonlSink {
    pub fn open(options: JsonlOptions) -> Self {
        let mut remaining = VecDeque::with_capacity(3);
        remaining.push_back(Candidate::File(options.path));
        if let Some(fallback) = options.fallback_path {
            remaining.push_back(Candidate::File(fallback));
        }
        remaining.push_back(Candidate::Stderr);

        let mut chain = Chain {
            current: Destination::Dropped,
            remaining,
        };
        chain.step_down();
        Self {
            max_bytes: options.max_bytes,
            chain: Mutex::new(chain),
        }
    }

    /// The file currently receiving entries; `None` once on stderr or dropping.
    pub fn current_path(&self) -> Option<PathBuf> {
        match &self.chain.lock().current {
            Destination::File { path, .. } => Some(path.clone()),
            Destination::Stderr | Destination::Dropped => None,
        }
    }
}

impl LogSink for JsonlSink {
    fn log(&self, entry: &LogEntry) {
        let mut line = match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(e) => {
                let _ = writeln!(io::stderr(), "[WDG-JSONL] serialize error: {e}");
                return;
            }
        };
        line.push('\n');
        self.chain.lock().append(&line, self.max_bytes);
    }

    fn flush(&self) {
        match &self.chain.lock().current {
            Destination::File { file, .. } => {
                let _ = file.sync_data();
            }
            Destination::Stderr => {
                let _ = io::stderr().flush();
            }
            Destination::Dropped => {}
        }
    }
}

fn append_to_file(
    path: &Path,
    file: &mut File,
    len: &mut u64,
    line: &str,
    max_bytes: u64,
) -> io::Result<()> {
    let size = line.len() as u64;
    if *len > 0 && *len + size > max_bytes {
        fs::rename(path, previous_generation(path))?;
        *file = open_append(path)?.0;
        *len = 0;
    }
    file.write_all(line.as_bytes())?;
    *len += size;
    Ok(())
}

/// Open or create `path` for appending, creating parent directories.
fn open_append(path: &Path) -> io::Result<(File, u64)> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let len = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((file, len))
}

/// `events.jsonl` -> `events.jsonl.1`
fn previous_generation(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".1");
    PathBuf::from(name)
}
