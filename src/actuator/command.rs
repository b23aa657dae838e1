//! External fence agent invocation

use super::{ActuationReport, FenceActuator};
use crate::error::ActuatorError;
use crate::message::{FenceAction, FilesystemSet};

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Environment variable carrying the comma-separated filesystem list
pub const AFFECTED_FILESYSTEMS_ENV: &str = "FENCE_AFFECTED_FILESYSTEMS";

/// Runs `<program> --action <action> --plug <target>`; exit status 0 is success
///
/// The child is killed if the future is dropped, which is how the watcher's
/// timeout stops a hung agent.
#[derive(Debug, Clone)]
pub struct CommandActuator {
    program: PathBuf,
}

impl CommandActuator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl FenceActuator for CommandActuator {
    fn name(&self) -> &str {
        "command"
    }

    async fn act(
        &self,
        action: FenceAction,
        target: &str,
        filesystems: &FilesystemSet,
    ) -> Result<ActuationReport, ActuatorError> {
        info!(
            "Running fence agent {} --action {} --plug {}",
            self.program.display(),
            action,
            target
        );

        let output = Command::new(&self.program)
            .arg("--action")
            .arg(action.as_str())
            .arg("--plug")
            .arg(target)
            .env(AFFECTED_FILESYSTEMS_ENV, filesystems.to_list().join(","))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ActuatorError::SpawnFailed {
                program: self.program.display().to_string(),
                reason: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("Fence agent stdout: {}", stdout.trim());

        if output.status.success() {
            let detail = stdout.trim();
            let message = if detail.is_empty() {
                format!("Fence {} succeeded for {}", action, target)
            } else {
                detail.to_string()
            };
            return Ok(ActuationReport::succeeded(message));
        }

        let code = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        warn!("Fence agent exited with {}: {}", code, stderr.trim());
        Ok(ActuationReport::failed(format!(
            "Fence {} failed for {} (exit {}): {}",
            action,
            target,
            code,
            stderr.trim()
        )))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &std::path::Path, body: &str) -> PathBuf {
        let path = dir.join("fence_agent.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_exit_zero_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "echo \"$2 $4 $FENCE_AFFECTED_FILESYSTEMS\"");
        let actuator = CommandActuator::new(program);

        let fs = FilesystemSet::Detected(vec!["fs-a".into(), "fs-b".into()]);
        let report = actuator.act(FenceAction::Off, "rabbit-03", &fs).await.unwrap();
        assert!(report.success);
        assert_eq!(report.message, "off rabbit-03 fs-a,fs-b");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "echo boom >&2; exit 3");
        let actuator = CommandActuator::new(program);

        let report = actuator
            .act(FenceAction::Reboot, "rabbit-03", &FilesystemSet::NoneDetected)
            .await
            .unwrap();
        assert!(!report.success);
        assert!(report.message.contains("exit 3"));
        assert!(report.message.contains("boom"));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let actuator = CommandActuator::new("/nonexistent/fence_agent");
        let err = actuator
            .act(FenceAction::Reboot, "n", &FilesystemSet::NoneDetected)
            .await
            .unwrap_err();
        assert!(matches!(err, ActuatorError::SpawnFailed { .. }));
    }
}
