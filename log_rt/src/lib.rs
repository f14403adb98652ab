//! Per-agent append-only structured action log (§4.4).
//!
//! Each agent gets its own `<agent>.log` of newline-delimited JSON objects.
//! Appends are single `write` calls, each entry self-contained, so a
//! crash mid-write can only ever corrupt the last line. Readers skip lines
//! that fail to parse rather than failing the whole read. Rotation is out
//! of scope: callers that need bounded log size should archive externally.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single structured log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    pub action: String,
    pub status: String,
    #[serde(default)]
    pub details: Value,
}

/// Append-only action log for one agent.
pub struct ActionLog {
    agent_name: String,
    path: PathBuf,
}

impl ActionLog {
    pub fn open(agent_name: &str, logs_dir: impl AsRef<Path>) -> Result<Self, LogError> {
        let logs_dir = logs_dir.as_ref();
        fs::create_dir_all(logs_dir)?;
        Ok(ActionLog {
            agent_name: agent_name.to_string(),
            path: logs_dir.join(format!("{agent_name}.log")),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry. `details` defaults to an empty JSON object when
    /// `None`, matching the source's `details or {}` behavior.
    pub fn append(&self, action: &str, status: &str, details: Option<Value>) -> Result<(), LogError> {
        let entry = LogEntry {
            timestamp: Utc::now(),
            agent: self.agent_name.clone(),
            action: action.to_string(),
            status: status.to_string(),
            details: details.unwrap_or_else(|| Value::Object(Default::default())),
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// The most recent `limit` entries (all entries if `limit` is 0).
    /// Malformed trailing (or interior) lines are skipped with a warning
    /// rather than failing the read.
    pub fn recent(&self, limit: usize) -> Result<Vec<LogEntry>, LogError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        let mut entries = Vec::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<LogEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(err) => warn!(agent = %self.agent_name, %err, "skipping malformed log line"),
            }
        }
        if limit == 0 || limit >= entries.len() {
            Ok(entries)
        } else {
            let start = entries.len() - limit;
            Ok(entries.split_off(start))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn append_then_recent_round_trips_entries() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActionLog::open("scout", dir.path()).unwrap();
        log.append("run_task", "started", Some(json!({"task": "index"}))).unwrap();
        log.append("run_task", "completed", None).unwrap();

        let entries = log.recent(0).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "run_task");
        assert_eq!(entries[1].details, json!({}));
    }

    #[test]
    fn recent_honors_limit_and_returns_newest_last() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActionLog::open("scout", dir.path()).unwrap();
        for i in 0..5 {
            log.append("tick", "ok", Some(json!({"i": i}))).unwrap();
        }
        let entries = log.recent(2).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].details, json!({"i": 4}));
    }

    #[test]
    fn recent_skips_malformed_trailing_line() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActionLog::open("scout", dir.path()).unwrap();
        log.append("run_task", "started", None).unwrap();

        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        file.write_all(b"{not valid json\n").unwrap();

        let entries = log.recent(0).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn recent_on_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActionLog::open("scout", dir.path()).unwrap();
        assert!(log.recent(0).unwrap().is_empty());
    }
}
