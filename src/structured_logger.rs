//! Structured JSONL event log.
//!
//! Every run appends machine-parseable entries to `events.jsonl`:
//! - Monotonic sequence numbers for ordering
//! - ISO 8601 timestamps with microsecond precision
//! - A per-run id for correlating the entries of one process
//!
//! Write failures are swallowed; the event log never changes control flow.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub const EVENTS_FILE_NAME: &str = "events.jsonl";

/// Notable points in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunEvent {
    LoginTransition {
        from: String,
        to: String,
    },
    AppStateSaved {
        path: String,
    },
    RecipientResolved {
        thread_id: String,
        source: String,
    },
    CandidateDiscovered {
        thread_id: String,
        display_name: String,
    },
    RecipientSelected {
        thread_id: String,
    },
    TriggerArmed {
        expression: String,
        fire_at: String,
        jitter_seconds: u32,
    },
    MessageSent {
        thread_id: String,
        payload: String,
    },
    SendFailed {
        thread_id: String,
        error: String,
    },
    Shutdown {
        reason: String,
    },
}

impl RunEvent {
    fn component(&self) -> &'static str {
        match self {
            RunEvent::LoginTransition { .. } | RunEvent::AppStateSaved { .. } => "Session",
            RunEvent::RecipientResolved { .. } => "Recipient",
            RunEvent::CandidateDiscovered { .. } | RunEvent::RecipientSelected { .. } => {
                "Discovery"
            }
            RunEvent::TriggerArmed { .. }
            | RunEvent::MessageSent { .. }
            | RunEvent::SendFailed { .. } => "Dispatch",
            RunEvent::Shutdown { .. } => "Shutdown",
        }
    }
}

/// A single log entry in JSONL format.
#[derive(Serialize, Deserialize)]
pub struct LogEntry {
    /// Monotonic sequence number within the run
    pub seq: u64,
    /// ISO 8601 timestamp with microseconds
    pub ts: String,
    pub run_id: String,
    pub pid: u32,
    /// Component that emitted the log
    pub component: String,
    pub event: Value,
}

pub struct StructuredLogger {
    run_id: String,
    seq: AtomicU64,
    log_file: Mutex<Option<File>>,
    log_path: Option<PathBuf>,
}

impl StructuredLogger {
    /// Opens `<logs_dir>/events.jsonl` for appending.
    ///
    /// # Errors
    ///
    /// Returns an error if the logs directory cannot be created or the log
    /// file cannot be opened.
    pub fn new(logs_dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(logs_dir)?;
        let log_path = logs_dir.join(EVENTS_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        Ok(Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            seq: AtomicU64::new(0),
            log_file: Mutex::new(Some(file)),
            log_path: Some(log_path),
        })
    }

    /// A logger that drops every entry.
    pub fn disabled() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            seq: AtomicU64::new(0),
            log_file: Mutex::new(None),
            log_path: None,
        }
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Logs an arbitrary structured event under `component`.
    pub fn log(&self, component: &str, event: impl Serialize) {
        let Ok(mut guard) = self.log_file.lock() else {
            return;
        };
        let Some(file) = guard.as_mut() else {
            return;
        };

        let entry = LogEntry {
            seq: self.next_seq(),
            ts: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            run_id: self.run_id.clone(),
            pid: std::process::id(),
            component: component.to_string(),
            event: serde_json::to_value(event).unwrap_or(Value::Null),
        };

        if let Ok(line) = serde_json::to_string(&entry) {
            let _ = writeln!(file, "{}", line);
            let _ = file.flush();
        }
    }

    pub fn record(&self, event: RunEvent) {
        self.log(event.component(), &event);
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.log_path.as_ref()
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

#[cfg(test)]
#[path = "tests/structured_logger_tests.rs"]
mod tests;
