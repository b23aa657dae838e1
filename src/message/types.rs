//! Request and response types
//!
//! A `FenceRequest` is written by the requester and consumed by the watcher.
//! A `FenceResponse` is the watcher's answer, correlated by `request_id`.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// File extension shared by request and response files
pub const MESSAGE_EXTENSION: &str = "json";

/// Wire marker for "discovery ran but found nothing"
pub const NONE_DETECTED_SENTINEL: &str = "none-detected";

/// Wire marker for "discovery was turned off"
pub const DISCOVERY_DISABLED_SENTINEL: &str = "discovery-disabled";

/// Fence action carried by a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FenceAction {
    /// Power the node on
    On,
    /// Power the node off
    Off,
    /// Power-cycle the node
    Reboot,
    /// Query power state
    Status,
}

impl FenceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FenceAction::On => "on",
            FenceAction::Off => "off",
            FenceAction::Reboot => "reboot",
            FenceAction::Status => "status",
        }
    }
}

impl fmt::Display for FenceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FenceAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(FenceAction::On),
            "off" => Ok(FenceAction::Off),
            "reboot" => Ok(FenceAction::Reboot),
            "status" => Ok(FenceAction::Status),
            other => Err(format!("unknown fence action '{}'", other)),
        }
    }
}

/// Filesystems associated with a fence target
///
/// The sentinel variants are distinct from an empty `Detected` list:
/// downstream consumers treat "no filesystems affected" differently from
/// "we could not or did not look".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub enum FilesystemSet {
    /// Filesystem names found by a discovery tier
    Detected(Vec<String>),
    /// Discovery ran and every tier came back empty
    NoneDetected,
    /// Discovery was turned off for this call
    DiscoveryDisabled,
}

impl FilesystemSet {
    /// Wire representation as a list of strings
    pub fn to_list(&self) -> Vec<String> {
        match self {
            FilesystemSet::Detected(names) => names.clone(),
            FilesystemSet::NoneDetected => vec![NONE_DETECTED_SENTINEL.to_string()],
            FilesystemSet::DiscoveryDisabled => vec![DISCOVERY_DISABLED_SENTINEL.to_string()],
        }
    }
}

impl From<Vec<String>> for FilesystemSet {
    fn from(list: Vec<String>) -> Self {
        if list.len() == 1 {
            match list[0].as_str() {
                NONE_DETECTED_SENTINEL => return FilesystemSet::NoneDetected,
                DISCOVERY_DISABLED_SENTINEL => return FilesystemSet::DiscoveryDisabled,
                _ => {}
            }
        }
        FilesystemSet::Detected(list)
    }
}

impl From<FilesystemSet> for Vec<String> {
    fn from(set: FilesystemSet) -> Self {
        match set {
            FilesystemSet::Detected(names) => names,
            other => other.to_list(),
        }
    }
}

impl fmt::Display for FilesystemSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.to_list().join(", "))
    }
}

/// ISO-8601 UTC timestamps at second precision (`2025-01-02T03:04:05Z`)
///
/// Deserialization accepts any RFC 3339 timestamp so that requests written
/// with fractional seconds or an explicit offset are still readable.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&ts.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Ok(ts.with_timezone(&Utc));
        }
        // Naive timestamps are taken to be UTC
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|e| format!("invalid timestamp '{}': {}", raw, e))
    }
}

/// Current time truncated to whole seconds
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Hostname of the local machine, or "unknown"
pub fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Whether `name` can be used as a fence target
///
/// Hostname characters only, starting with a letter or digit. The name
/// ends up inside a response file name and on an actuator command line.
pub fn is_valid_node_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= 253
        && first.is_ascii_alphanumeric()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Response filename for a request, namespaced by target node
pub fn response_file_name(target_node: &str, request_id: &str) -> String {
    format!("{}-{}.{}", target_node, request_id, MESSAGE_EXTENSION)
}

/// A fence request written by the inline agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FenceRequest {
    /// Unique request identifier (UUID v4)
    pub request_id: String,
    /// Requested action
    pub action: FenceAction,
    /// Node to fence
    pub target_node: String,
    /// Filesystems the target may be using
    #[serde(alias = "filesystems", alias = "gfs2_filesystems")]
    pub affected_filesystems: FilesystemSet,
    /// Host that issued the request
    #[serde(alias = "recorder_node")]
    pub requesting_node: String,
    /// When the request was created
    #[serde(with = "timestamp", alias = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl FenceRequest {
    /// Create a request with a fresh id from this host
    pub fn new(action: FenceAction, target_node: &str, affected_filesystems: FilesystemSet) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            action,
            target_node: target_node.to_string(),
            affected_filesystems,
            requesting_node: local_hostname(),
            created_at: now_utc(),
        }
    }

    /// Request filename
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.request_id, MESSAGE_EXTENSION)
    }

    /// Filename of the response that answers this request
    pub fn response_file_name(&self) -> String {
        response_file_name(&self.target_node, &self.request_id)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// A fence response written by the watcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FenceResponse {
    /// Id of the request being answered
    pub request_id: String,
    /// Whether the fence action succeeded
    pub success: bool,
    /// Action actually performed
    pub action_performed: String,
    /// Node that was fenced
    pub target_node: String,
    /// Free-form detail from the actuator
    pub message: String,
    /// When the action finished
    #[serde(with = "timestamp", alias = "timestamp")]
    pub completed_at: DateTime<Utc>,
}

impl FenceResponse {
    /// Build the response for a request
    pub fn for_request(request: &FenceRequest, success: bool, message: impl Into<String>) -> Self {
        Self {
            request_id: request.request_id.clone(),
            success,
            action_performed: request.action.to_string(),
            target_node: request.target_node.clone(),
            message: message.into(),
            completed_at: now_utc(),
        }
    }

    pub fn file_name(&self) -> String {
        response_file_name(&self.target_node, &self.request_id)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
