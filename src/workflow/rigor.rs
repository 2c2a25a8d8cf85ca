//! Rigor enforcement: mandatory audit flags and append-only decision/event logs.
//!
//! Every run writes two JSONL streams per session:
//!
//! - `<logs-root>/decisions/session-<id>.jsonl`
//! - `<logs-root>/events/session-<id>.jsonl`
//!
//! Records are appended one line at a time and synced to disk before the
//! call returns. Files are never rewritten or truncated.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::{Result, WorkflowError};
use super::schema::RigorFlags;

/// Version of the log record format.
pub const LOG_SCHEMA_VERSION: u32 = 1;

static SESSION_ID_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

/// Kind of audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Decision,
    Event,
}

impl LogKind {
    /// Directory under the logs root holding this kind of stream.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Decision => "decisions",
            Self::Event => "events",
        }
    }
}

/// One line of an audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Record format version
    pub schema_version: u32,

    /// RFC 3339 UTC timestamp
    pub timestamp: String,

    /// Session this record belongs to
    pub session_id: String,

    /// Decision or event
    pub kind: LogKind,

    /// Decision reason/context or event name/details
    pub payload: Value,
}

impl LogRecord {
    fn new(session_id: &str, kind: LogKind, payload: Value) -> Self {
        Self {
            schema_version: LOG_SCHEMA_VERSION,
            timestamp: chrono::Utc::now().to_rfc3339(),
            session_id: session_id.to_string(),
            kind,
            payload,
        }
    }

    /// Event type for event records.
    pub fn event_type(&self) -> Option<&str> {
        self.payload.get("event_type").and_then(Value::as_str)
    }

    /// Decision text for decision records.
    pub fn decision(&self) -> Option<&str> {
        self.payload.get("decision").and_then(Value::as_str)
    }
}

/// Writes audit records and guards the mandatory rigor flags.
#[derive(Debug, Clone)]
pub struct RigorEnforcer {
    logs_root: PathBuf,
}

impl RigorEnforcer {
    /// Create an enforcer writing under `logs_root`.
    pub fn new(logs_root: impl Into<PathBuf>) -> Self {
        Self { logs_root: logs_root.into() }
    }

    /// Root directory of all log streams.
    pub fn logs_root(&self) -> &Path {
        &self.logs_root
    }

    /// Reject a custom workflow whose rigor flags are not all enabled.
    pub fn validate_rigor(workflow: &str, flags: &RigorFlags) -> Result<()> {
        let disabled = flags.disabled();
        if disabled.is_empty() {
            return Ok(());
        }
        Err(WorkflowError::RigorViolation {
            workflow: workflow.to_string(),
            flags: disabled
                .into_iter()
                .map(|flag| format!("custom_workflows.{workflow}.rigor.{flag}"))
                .collect(),
        })
    }

    /// Path of a session's log stream.
    pub fn log_path(&self, kind: LogKind, session_id: &str) -> Result<PathBuf> {
        validate_session_id(session_id)?;
        Ok(self.logs_root.join(kind.dir_name()).join(format!("session-{session_id}.jsonl")))
    }

    /// Append a decision record.
    pub fn log_decision(
        &self,
        session_id: &str,
        decision: &str,
        rationale: &str,
        context: Value,
    ) -> Result<()> {
        let payload = json!({ "decision": decision, "rationale": rationale, "context": context });
        self.append(&LogRecord::new(session_id, LogKind::Decision, payload))
    }

    /// Append an event record.
    pub fn log_event(
        &self,
        session_id: &str,
        event_type: &str,
        event: &str,
        details: Value,
    ) -> Result<()> {
        let payload = json!({ "event_type": event_type, "event": event, "details": details });
        self.append(&LogRecord::new(session_id, LogKind::Event, payload))
    }

    /// Read back every record of a session stream.
    ///
    /// A missing stream yields no records.
    pub fn read_records(&self, kind: LogKind, session_id: &str) -> Result<Vec<LogRecord>> {
        let path = self.log_path(kind, session_id)?;
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path).map_err(|e| WorkflowError::io(&path, e))?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(WorkflowError::from))
            .collect()
    }

    fn append(&self, record: &LogRecord) -> Result<()> {
        let path = self.log_path(record.kind, &record.session_id)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| WorkflowError::io(parent, e))?;
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| WorkflowError::io(&path, e))?;
        file.write_all(line.as_bytes()).map_err(|e| WorkflowError::io(&path, e))?;
        file.flush().map_err(|e| WorkflowError::io(&path, e))?;
        file.sync_data().map_err(|e| WorkflowError::io(&path, e))?;

        tracing::trace!(path = ?path, kind = ?record.kind, "Appended audit record");
        Ok(())
    }
}

/// Check that a session id is safe to embed in a log path.
pub fn validate_session_id(session_id: &str) -> Result<()> {
    if SESSION_ID_PATTERN.is_match(session_id) {
        Ok(())
    } else {
        Err(WorkflowError::InvalidSessionId(session_id.to_string()))
    }
}

/// Generate a fresh session id (`<yyyymmdd-HHMMSS>-<8 hex>`).
pub fn generate_session_id() -> String {
    let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{stamp}-{}", &suffix[..8])
}
