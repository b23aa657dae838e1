//! Pluggable fence mechanisms
//!
//! The watcher hands every parsed request to a `FenceActuator`. Which one is
//! used is a configuration choice.

mod command;
mod simulated;

pub use command::{CommandActuator, AFFECTED_FILESYSTEMS_ENV};
pub use simulated::SimulatedActuator;

use crate::error::{ActuatorError, ConfigError};
use crate::message::{FenceAction, FilesystemSet};

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Default bound on a single fence action
pub const DEFAULT_ACTUATOR_TIMEOUT: Duration = Duration::from_secs(30);

/// Default delay of the simulated actuator
pub const DEFAULT_SIMULATED_DELAY: Duration = Duration::from_secs(2);

/// Result of a fence action as reported back to the requester
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuationReport {
    pub success: bool,
    pub message: String,
}

impl ActuationReport {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

impl From<ActuatorError> for ActuationReport {
    fn from(err: ActuatorError) -> Self {
        ActuationReport::failed(err.to_string())
    }
}

/// Something that can power-cycle or isolate a node
#[async_trait]
pub trait FenceActuator: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Perform `action` against `target`
    async fn act(
        &self,
        action: FenceAction,
        target: &str,
        filesystems: &FilesystemSet,
    ) -> Result<ActuationReport, ActuatorError>;
}

/// Available actuator implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActuatorKind {
    #[default]
    Simulated,
    Command,
}

impl fmt::Display for ActuatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActuatorKind::Simulated => write!(f, "simulated"),
            ActuatorKind::Command => write!(f, "command"),
        }
    }
}

impl FromStr for ActuatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulated" | "simulate" => Ok(ActuatorKind::Simulated),
            "command" | "external" => Ok(ActuatorKind::Command),
            other => Err(format!("unknown actuator '{}', expected simulated or command", other)),
        }
    }
}

/// Actuator selection and tuning
#[derive(Debug, Clone)]
pub struct ActuatorConfig {
    pub kind: ActuatorKind,
    /// Program run by the command actuator
    pub command: Option<PathBuf>,
    pub timeout: Duration,
    pub simulated_delay: Duration,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            kind: ActuatorKind::Simulated,
            command: None,
            timeout: DEFAULT_ACTUATOR_TIMEOUT,
            simulated_delay: DEFAULT_SIMULATED_DELAY,
        }
    }
}

impl ActuatorConfig {
    /// Instantiate the configured actuator
    pub fn build(&self) -> Result<Arc<dyn FenceActuator>, ConfigError> {
        match self.kind {
            ActuatorKind::Simulated => Ok(Arc::new(SimulatedActuator::new(self.simulated_delay))),
            ActuatorKind::Command => {
                let program = self.command.clone().ok_or_else(|| {
                    ConfigError::MissingRequired(
                        "ACTUATOR_COMMAND is required when ACTUATOR=command".to_string(),
                    )
                })?;
                Ok(Arc::new(CommandActuator::new(program)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("simulated".parse::<ActuatorKind>().unwrap(), ActuatorKind::Simulated);
        assert_eq!("COMMAND".parse::<ActuatorKind>().unwrap(), ActuatorKind::Command);
        assert!("ipmi".parse::<ActuatorKind>().is_err());
    }

    #[test]
    fn test_command_actuator_requires_program() {
        let config = ActuatorConfig {
            kind: ActuatorKind::Command,
            ..Default::default()
        };
        assert!(matches!(config.build(), Err(ConfigError::MissingRequired(_))));

        let config = ActuatorConfig {
            kind: ActuatorKind::Command,
            command: Some(PathBuf::from("/usr/sbin/fence_ipmilan")),
            ..Default::default()
        };
        assert_eq!(config.build().unwrap().name(), "command");
    }

    #[test]
    fn test_error_becomes_failed_report() {
        let report: ActuationReport = ActuatorError::Timeout(Duration::from_secs(30)).into();
        assert!(!report.success);
        assert!(report.message.contains("timed out"));
    }
}
