//! Requesting side of the fence protocol
//!
//! Embedded in the fence agent binary. One call handles one fence action:
//! sweep stale requests, discover filesystems, write the request, wait for
//! the watcher's answer and audit every step along the way.

use crate::audit::{AuditEvent, AuditLog, AuditStatus, Outcome};
use crate::channel::FileChannel;
use crate::config::RequesterConfig;
use crate::discovery::DiscoveryEngine;
use crate::message::{FenceAction, FenceRequest, FenceResponse, FilesystemSet};

use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How a fence call ended
#[derive(Debug, Clone, PartialEq)]
pub enum FenceOutcome {
    /// The watcher reported success
    Completed { response: FenceResponse },
    /// The watcher reported failure
    Failed { response: FenceResponse },
    /// The request could not be written
    SubmitFailed { reason: String },
    /// No usable response arrived in time
    TimedOut { after: Duration },
}

impl FenceOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FenceOutcome::Completed { .. })
    }

    /// Audit classification
    pub fn kind(&self) -> Outcome {
        match self {
            FenceOutcome::Completed { .. } => Outcome::Completed,
            FenceOutcome::Failed { .. } | FenceOutcome::SubmitFailed { .. } => Outcome::Failed,
            FenceOutcome::TimedOut { .. } => Outcome::Timeout,
        }
    }

    /// Exit status reported to the resource manager
    pub fn exit_code(&self) -> ExitCode {
        if self.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

/// Result of the local health probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorReport {
    pub audit_writable: bool,
    pub discovery_enabled: bool,
    /// Discovery tiers whose tool was found
    pub available_tiers: Vec<&'static str>,
}

impl MonitorReport {
    pub fn is_healthy(&self) -> bool {
        self.audit_writable && (!self.discovery_enabled || !self.available_tiers.is_empty())
    }
}

/// Drives one fence call end to end
pub struct FenceRequester {
    config: RequesterConfig,
    channel: FileChannel,
    discovery: DiscoveryEngine,
    audit: AuditLog,
}

impl FenceRequester {
    /// Requester with the standard discovery tiers
    pub fn from_config(config: RequesterConfig) -> Self {
        let discovery = DiscoveryEngine::from_config(&config.discovery);
        Self::new(config, discovery)
    }

    /// Requester with a caller-supplied discovery engine
    pub fn new(config: RequesterConfig, discovery: DiscoveryEngine) -> Self {
        let channel = FileChannel::new(config.channel.clone());
        let audit = AuditLog::new(&config.log_dir);
        Self {
            config,
            channel,
            discovery,
            audit,
        }
    }

    pub fn channel(&self) -> &FileChannel {
        &self.channel
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Fence `target` and report how it went
    pub async fn fence(&self, action: FenceAction, target: &str) -> FenceOutcome {
        info!("Fence action requested: {} for target: {}", action, target);

        match self.channel.sweep_requests(self.config.max_request_age) {
            Ok(0) => {}
            Ok(n) => info!("Swept {} stale request(s)", n),
            Err(e) => warn!("Failed to sweep old requests: {}", e),
        }

        let filesystems = self.discovery.discover(target).await;
        info!("Filesystems for {}: {}", target, filesystems);

        self.audit.record(&event(
            action,
            target,
            &filesystems,
            AuditStatus::Requested,
            format!("Fence action {} requested by cluster manager", action),
        ));

        let request = FenceRequest::new(action, target, filesystems.clone());
        let submitted = self
            .channel
            .ensure_dirs()
            .and_then(|_| self.channel.submit_request(&request));
        if let Err(e) = submitted {
            error!("Failed to write fence request: {}", e);
            self.audit.record(
                &event(
                    action,
                    target,
                    &filesystems,
                    AuditStatus::Failed,
                    format!("Failed to create fence request file: {}", e),
                )
                .with_request_id(&request.request_id)
                .with_outcome(Outcome::Failed),
            );
            return FenceOutcome::SubmitFailed {
                reason: e.to_string(),
            };
        }

        let response = self
            .channel
            .wait_for_response(
                &request,
                self.config.timeout,
                self.config.poll_interval,
                self.config.response_retention,
            )
            .await;

        let outcome = match response {
            Some(response) if response.success => FenceOutcome::Completed { response },
            Some(response) => FenceOutcome::Failed { response },
            None => FenceOutcome::TimedOut {
                after: self.config.timeout,
            },
        };

        let (status, details) = match &outcome {
            FenceOutcome::Completed { response } => (
                AuditStatus::Completed,
                format!(
                    "Fence action {} completed successfully: {}",
                    response.action_performed, response.message
                ),
            ),
            FenceOutcome::Failed { response } => (
                AuditStatus::Failed,
                format!("Fence action {} failed: {}", action, response.message),
            ),
            FenceOutcome::TimedOut { after } => (
                AuditStatus::Failed,
                format!(
                    "Fence action {} failed: timed out waiting for response after {}s",
                    action,
                    after.as_secs_f64()
                ),
            ),
            FenceOutcome::SubmitFailed { reason } => (AuditStatus::Failed, reason.clone()),
        };

        self.audit.record(
            &event(action, target, &filesystems, status, details)
                .with_request_id(&request.request_id)
                .with_outcome(outcome.kind()),
        );

        if outcome.is_success() {
            info!("Fence operation successful for {}", target);
        } else {
            error!("Fence operation failed for {}: {:?}", target, outcome.kind());
        }
        outcome
    }

    /// Local capability probe; never touches the channel
    pub fn monitor(&self) -> MonitorReport {
        let report = MonitorReport {
            audit_writable: self.audit.is_writable(),
            discovery_enabled: self.discovery.is_enabled(),
            available_tiers: if self.discovery.is_enabled() {
                self.discovery.available_tiers()
            } else {
                Vec::new()
            },
        };

        if !report.audit_writable {
            error!("Log directory {} is not writable", self.audit.dir().display());
        }
        if report.discovery_enabled && report.available_tiers.is_empty() {
            error!("Filesystem discovery enabled but no discovery tool is reachable");
        } else {
            debug!("Discovery tiers available: {:?}", report.available_tiers);
        }
        if report.is_healthy() {
            debug!("Monitor successful: fence recorder operational");
        }
        report
    }
}

fn event(
    action: FenceAction,
    target: &str,
    filesystems: &FilesystemSet,
    status: AuditStatus,
    details: String,
) -> AuditEvent {
    AuditEvent::new(action.as_str(), target, status, details).with_filesystems(filesystems)
}
