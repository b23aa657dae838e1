//! Append-only dual-format audit log

use crate::message::{local_hostname, now_utc, timestamp, FilesystemSet};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Structured JSON-lines audit file
pub const DETAILED_LOG_FILE: &str = "fence-events-detailed.jsonl";

/// Human-readable audit file
pub const READABLE_LOG_FILE: &str = "fence-events-readable.log";

/// Diagnostic log written by the agent binary alongside the audit files
pub const DIAGNOSTIC_LOG_FILE: &str = "fence-events.log";

/// Lifecycle status of an audit record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Requested,
    Initiated,
    Completed,
    Failed,
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditStatus::Requested => write!(f, "requested"),
            AuditStatus::Initiated => write!(f, "initiated"),
            AuditStatus::Completed => write!(f, "completed"),
            AuditStatus::Failed => write!(f, "failed"),
        }
    }
}

/// How a fence call ended; distinguishes a protocol timeout from an
/// actuator-reported failure even though both are `status = failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Completed,
    Failed,
    Timeout,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Completed => write!(f, "completed"),
            Outcome::Failed => write!(f, "failed"),
            Outcome::Timeout => write!(f, "timeout"),
        }
    }
}

/// A single audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub target_node: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_filesystems: Option<FilesystemSet>,
    pub status: AuditStatus,
    pub details: String,
    pub recorder_node: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
}

impl AuditEvent {
    pub fn new(
        action: impl Into<String>,
        target_node: impl Into<String>,
        status: AuditStatus,
        details: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: now_utc(),
            action: action.into(),
            target_node: target_node.into(),
            affected_filesystems: None,
            status,
            details: details.into(),
            recorder_node: local_hostname(),
            request_id: None,
            outcome: None,
        }
    }

    pub fn with_filesystems(mut self, filesystems: &FilesystemSet) -> Self {
        self.affected_filesystems = Some(filesystems.clone());
        self
    }

    pub fn with_request_id(mut self, request_id: &str) -> Self {
        self.request_id = Some(request_id.to_string());
        self
    }

    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Operator-facing single line
    pub fn readable_line(&self) -> String {
        let local: DateTime<Local> = self.timestamp.with_timezone(&Local);
        let filesystems = self
            .affected_filesystems
            .as_ref()
            .map(|set| serde_json::to_string(&set.to_list()).unwrap_or_default())
            .unwrap_or_else(|| "[]".to_string());
        format!(
            "[{}] ACTION={} TARGET={} FILESYSTEMS={} STATUS={} DETAILS={}",
            local.format("%Y-%m-%d %H:%M:%S"),
            self.action,
            self.target_node,
            filesystems,
            self.status,
            self.details
        )
    }
}

/// Audit log rooted at a directory
#[derive(Debug, Clone)]
pub struct AuditLog {
    dir: PathBuf,
}

impl AuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn detailed_path(&self) -> PathBuf {
        self.dir.join(DETAILED_LOG_FILE)
    }

    pub fn readable_path(&self) -> PathBuf {
        self.dir.join(READABLE_LOG_FILE)
    }

    /// Check that records can be written to the log directory
    pub fn is_writable(&self) -> bool {
        if std::fs::create_dir_all(&self.dir).is_err() {
            return false;
        }
        tempfile::NamedTempFile::new_in(&self.dir).is_ok()
    }

    /// Append `event` to both files; write failures are logged, not returned
    pub fn record(&self, event: &AuditEvent) {
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            error!("Failed to create audit directory {}: {}", self.dir.display(), e);
        }

        match serde_json::to_string(event) {
            Ok(json) => {
                if let Err(e) = append_line(&self.detailed_path(), &json) {
                    error!("Failed to write JSON log: {}", e);
                }
            }
            Err(e) => error!("Failed to serialize audit event: {}", e),
        }

        if let Err(e) = append_line(&self.readable_path(), &event.readable_line()) {
            error!("Failed to write readable log: {}", e);
        }

        info!(
            "Recorded fence event: action={}, target={}, status={}",
            event.action, event.target_node, event.status
        );
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)
}
