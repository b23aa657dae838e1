//! Subprocess boundary for discovery tools
//!
//! Providers never spawn processes directly; they go through a
//! `CommandRunner` so that their parsing can be exercised against fixed
//! fixture output.

use crate::error::{DiscoveryError, DiscoveryResult};

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Default time bound for one discovery subprocess
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Captured output of a successful command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
}

/// Runs external tools on behalf of discovery providers
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Whether `program` can be found
    fn is_installed(&self, program: &str) -> bool;

    /// Run `program` with `args`, failing on timeout or non-zero exit
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> DiscoveryResult<CommandOutput>;
}

/// Runs real subprocesses via tokio
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    fn is_installed(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }

    async fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> DiscoveryResult<CommandOutput> {
        let command_line = format!("{} {}", program, args.join(" "));
        debug!("Running discovery command: {}", command_line);

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(DiscoveryError::SpawnFailed {
                    command: command_line,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(DiscoveryError::Timeout {
                    command: command_line,
                    timeout,
                })
            }
        };

        if !output.status.success() {
            return Err(DiscoveryError::NonZeroExit {
                command: command_line,
                status: output.status.code().unwrap_or(-1),
            });
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tool_is_not_installed() {
        assert!(!SystemCommandRunner.is_installed("definitely-not-a-real-tool-4f2a"));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let err = SystemCommandRunner
            .run("definitely-not-a-real-tool-4f2a", &["x"], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::SpawnFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_timeout() {
        let err = SystemCommandRunner
            .run("sleep", &["5"], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Timeout { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_output() {
        let out = SystemCommandRunner
            .run("echo", &["gfs2-fs-a"], Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "gfs2-fs-a");
    }
}
