//! Error types for fence-recorder
//!
//! Error hierarchy covering:
//! - Channel (request/response directory) transport and payload errors
//! - Filesystem discovery errors
//! - Actuator errors
//! - Configuration errors
//!
//! Only transport errors on the write path are fatal to a fence call.
//! Everything else is logged and degraded by the caller.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for fence-recorder
#[derive(Error, Debug)]
pub enum RecorderError {
    /// Request/response channel errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Discovery errors
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Actuator errors
    #[error("Actuator error: {0}")]
    Actuator(#[from] ActuatorError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the directory-based request/response channel
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Directory could not be created or is not usable
    #[error("Channel directory '{path}' is unusable: {reason}")]
    DirectoryUnusable { path: PathBuf, reason: String },

    /// Writing a message file failed
    #[error("Failed to write '{path}': {reason}")]
    WriteFailed { path: PathBuf, reason: String },

    /// Reading a message file failed
    #[error("Failed to read '{path}': {reason}")]
    ReadFailed { path: PathBuf, reason: String },

    /// Payload could not be parsed
    #[error("Malformed message '{path}': {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// Payload id does not match the id encoded in the filename
    #[error("Message '{path}' carries request id '{found}', expected '{expected}'")]
    IdMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    /// File size never stabilized within the wait window
    #[error("File '{path}' did not stabilize within {waited:?}")]
    Unstable { path: PathBuf, waited: Duration },

    /// File disappeared while being inspected
    #[error("File '{path}' vanished")]
    Vanished { path: PathBuf },
}

impl ChannelError {
    /// Check if a later scan may succeed where this attempt failed
    pub fn is_transient(&self) -> bool {
        matches!(self, ChannelError::Unstable { .. })
    }
}

/// Filesystem discovery errors; never surfaced past the discovery engine
#[derive(Error, Debug, Clone)]
pub enum DiscoveryError {
    /// Discovery tool not installed
    #[error("Tool '{tool}' not found on PATH")]
    ToolMissing { tool: String },

    /// Subprocess could not be spawned
    #[error("Failed to run '{command}': {reason}")]
    SpawnFailed { command: String, reason: String },

    /// Subprocess exceeded its time bound
    #[error("Command '{command}' timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// Subprocess exited unsuccessfully
    #[error("Command '{command}' exited with status {status}")]
    NonZeroExit { command: String, status: i32 },

    /// Tool output could not be parsed
    #[error("Failed to parse output of '{command}': {reason}")]
    Parse { command: String, reason: String },
}

/// Actuator errors; converted into `success = false` responses by the watcher
#[derive(Error, Debug)]
pub enum ActuatorError {
    /// External fence mechanism could not be started
    #[error("Failed to start '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },

    /// External fence mechanism exceeded its time bound
    #[error("Fence action timed out after {0:?}")]
    Timeout(Duration),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Interval or timeout outside accepted bounds
    #[error("Invalid {name} '{value}': {reason}")]
    InvalidDuration {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// Unknown enumerated value
    #[error("Invalid {name} '{value}': expected one of {expected}")]
    InvalidChoice {
        name: &'static str,
        value: String,
        expected: &'static str,
    },

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    /// Target node name unusable in a file name or command line
    #[error("Invalid target node '{0}'")]
    InvalidNode(String),

    /// Directories collide
    #[error("Request and response directories must differ: '{0}'")]
    SharedDirectory(PathBuf),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, RecorderError>;

/// Result type for channel operations
pub type ChannelResult<T> = std::result::Result<T, ChannelError>;

/// Result type for discovery operations
pub type DiscoveryResult<T> = std::result::Result<T, DiscoveryError>;
