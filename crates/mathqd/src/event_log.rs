//! Server event log.
//!
//! Every protocol-level event (connect, request, response, disconnect,
//! error) is recorded through [`EventLog::record`]. Records always go to
//! `tracing`; when a log file is configured they are also appended to it
//! as one timestamped line each:
//!
//! ```text
//! [2025-01-31 14:02:11] CALC_RESPONSE - alice: 3+4*2 = 11
//! ```

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::{NonBlocking, NonBlockingBuilder, WorkerGuard};

/// Client label used for server-wide events.
pub const SERVER_CLIENT: &str = "SERVER";

/// Client label used before a session has joined.
pub const UNKNOWN_CLIENT: &str = "UNKNOWN";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Kind of a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Connect,
    CalcRequest,
    CalcResponse,
    Disconnect,
    Err,
}

impl EventKind {
    /// Returns the label written to the log.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::CalcRequest => "CALC_REQUEST",
            Self::CalcResponse => "CALC_RESPONSE",
            Self::Disconnect => "DISCONNECT",
            Self::Err => "ERR",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only event sink, cheap to clone.
///
/// File lines are handed to a background writer thread, so `record` never
/// blocks the calling task on disk I/O. Pending lines are flushed once the
/// last clone is dropped.
#[derive(Clone, Default)]
pub struct EventLog {
    file: Option<FileSink>,
}

#[derive(Clone)]
struct FileSink {
    writer: NonBlocking,
    path: PathBuf,
    _guard: Arc<WorkerGuard>,
}

impl EventLog {
    /// Creates a log that only emits `tracing` events.
    pub fn console_only() -> Self {
        Self::default()
    }

    /// Creates a log that also appends to `path`.
    ///
    /// Parent directories are created and an existing file is truncated,
    /// so each server run starts with a fresh log.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EventLogError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| EventLogError {
                    path: path.clone(),
                    error: e.to_string(),
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| EventLogError {
                path: path.clone(),
                error: e.to_string(),
            })?;

        // Records are never dropped; a full buffer applies backpressure.
        let (writer, guard) = NonBlockingBuilder::default()
            .lossy(false)
            .thread_name("mathqd-event-log")
            .finish(file);

        Ok(Self {
            file: Some(FileSink {
                writer,
                path,
                _guard: Arc::new(guard),
            }),
        })
    }

    /// Returns the log file path, if any.
    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|sink| sink.path.as_path())
    }

    /// Records one event.
    pub fn record(&self, kind: EventKind, client: &str, detail: impl fmt::Display) {
        let detail = detail.to_string();

        match kind {
            EventKind::Err => error!(event = %kind, client = %client, "{detail}"),
            _ => info!(event = %kind, client = %client, "{detail}"),
        }

        let Some(sink) = &self.file else {
            return;
        };

        // One write per line keeps concurrent records from interleaving.
        let mut entry = format_entry(Local::now(), kind, client, &detail);
        entry.push('\n');

        let mut writer = sink.writer.clone();
        if let Err(e) = writer.write_all(entry.as_bytes()) {
            warn!(path = %sink.path.display(), error = %e, "Failed to write event log");
        }
    }
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("path", &self.path())
            .finish()
    }
}

/// Formats a log line: `[timestamp] KIND - client: detail`.
pub fn format_entry(timestamp: DateTime<Local>, kind: EventKind, client: &str, detail: &str) -> String {
    format!(
        "[{}] {} - {}: {}",
        timestamp.format(TIMESTAMP_FORMAT),
        kind,
        client,
        detail
    )
}

/// The log file could not be prepared.
#[derive(Debug, thiserror::Error)]
#[error("Failed to open event log at {path}: {error}")]
pub struct EventLogError {
    pub path: PathBuf,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_event_kind_labels() {
        assert_eq!(EventKind::Connect.to_string(), "CONNECT");
        assert_eq!(EventKind::CalcRequest.to_string(), "CALC_REQUEST");
        assert_eq!(EventKind::CalcResponse.to_string(), "CALC_RESPONSE");
        assert_eq!(EventKind::Disconnect.to_string(), "DISCONNECT");
        assert_eq!(EventKind::Err.to_string(), "ERR");
    }

    #[test]
    fn test_format_entry() {
        let ts = Local.with_ymd_and_hms(2025, 1, 15, 8, 5, 7).single().unwrap();
        assert_eq!(
            format_entry(ts, EventKind::CalcResponse, "alice", "3+4*2 = 11"),
            "[2025-01-15 08:05:07] CALC_RESPONSE - alice: 3+4*2 = 11"
        );
    }

    #[test]
    fn test_records_are_appended_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("server.log");
        let log = EventLog::open(&path).unwrap();
        assert_eq!(log.path(), Some(path.as_path()));

        log.record(EventKind::Connect, "alice", "Connected from 127.0.0.1:5000");
        log.clone().record(EventKind::Err, "alice", "boom");
        drop(log);

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("CONNECT - alice: Connected from 127.0.0.1:5000"));
        assert!(lines[1].ends_with("ERR - alice: boom"));
    }

    #[test]
    fn test_open_truncates_previous_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.log");
        fs::write(&path, "old run\n").unwrap();

        let log = EventLog::open(&path).unwrap();
        log.record(EventKind::Disconnect, "bob", "Client disconnected after 3 seconds");
        drop(log);

        let contents = fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("old run"));
        assert!(contents.contains("DISCONNECT - bob"));
    }

    #[test]
    fn test_console_only_has_no_path() {
        let log = EventLog::console_only();
        assert!(log.path().is_none());
        log.record(EventKind::Connect, SERVER_CLIENT, "no file");
    }

    #[test]
    fn test_open_fails_for_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = EventLog::open(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to open event log"));
    }

    #[test]
    fn test_debug_shows_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.log");
        let log = EventLog::open(&path).unwrap();

        assert!(format!("{log:?}").contains("server.log"));
        assert_eq!(format!("{:?}", EventLog::console_only()), "EventLog { path: None }");
    }

    #[test]
    fn test_concurrent_records_are_whole_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.log");
        let log = EventLog::open(&path).unwrap();

        let threads: Vec<_> = (0..4)
            .map(|t| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        log.record(EventKind::CalcRequest, &format!("client{t}"), format_args!("request {i}"));
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        drop(log);

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 200);
        assert!(lines
            .iter()
            .all(|line| line.contains("CALC_REQUEST - client") && line.contains(": request ")));
    }
}
