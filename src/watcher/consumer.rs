//! Request handling shared by every scheduler

use super::recency::{RecencySet, DEFAULT_RECENCY_CAPACITY, DEFAULT_RECENCY_TTL};
use crate::actuator::{ActuationReport, FenceActuator, DEFAULT_ACTUATOR_TIMEOUT};
use crate::channel::{FileChannel, Retention};
use crate::error::{ActuatorError, ChannelError};
use crate::message::{now_utc, FenceRequest, FenceResponse};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Consumer tuning
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Bound on one actuator call
    pub actuator_timeout: Duration,
    /// What to do with a request file once answered
    pub request_retention: Retention,
    pub recency_capacity: usize,
    pub recency_ttl: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            actuator_timeout: DEFAULT_ACTUATOR_TIMEOUT,
            request_retention: Retention::Delete,
            recency_capacity: DEFAULT_RECENCY_CAPACITY,
            recency_ttl: DEFAULT_RECENCY_TTL,
        }
    }
}

/// What happened to one request file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Actuator ran and a response was written
    Answered { success: bool },
    /// Already handled within the recency window
    Duplicate,
    /// Older than any requester would still wait for
    Stale,
    /// Not ready yet; retried on a later pass
    Deferred,
    /// Unreadable, malformed or unanswerable
    Rejected,
}

/// Counters reported when the watcher stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatcherStats {
    pub passes: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub rejected: u64,
}

/// Turns request files into actuator calls and response files
pub struct RequestConsumer {
    channel: FileChannel,
    actuator: Arc<dyn FenceActuator>,
    config: ConsumerConfig,
    seen: RecencySet,
    stats: WatcherStats,
}

impl RequestConsumer {
    pub fn new(channel: FileChannel, actuator: Arc<dyn FenceActuator>, config: ConsumerConfig) -> Self {
        let seen = RecencySet::new(config.recency_capacity, config.recency_ttl);
        Self {
            channel,
            actuator,
            config,
            seen,
            stats: WatcherStats::default(),
        }
    }

    pub fn channel(&self) -> &FileChannel {
        &self.channel
    }

    pub fn stats(&self) -> &WatcherStats {
        &self.stats
    }

    /// Handle every pending request once, oldest first
    pub async fn run_pass(&mut self) -> Vec<(PathBuf, Disposition)> {
        self.stats.passes += 1;
        let pending = match self.channel.pending_requests() {
            Ok(pending) => pending,
            Err(e) => {
                warn!("Failed to scan request directory: {}", e);
                return Vec::new();
            }
        };

        let mut results = Vec::with_capacity(pending.len());
        for path in pending {
            let disposition = self.process_path(&path).await;
            results.push((path, disposition));
        }
        results
    }

    /// Handle a single request file
    pub async fn process_path(&mut self, path: &Path) -> Disposition {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            return Disposition::Rejected;
        };
        if self.seen.contains(stem) {
            debug!("Skipping already handled request {}", stem);
            self.stats.skipped += 1;
            return Disposition::Duplicate;
        }

        info!("Processing fence request: {}", path.display());
        let request = match self.channel.read_request(path).await {
            Ok(request) => request,
            Err(e) if e.is_transient() => {
                warn!("Request not ready, will retry: {}", e);
                return Disposition::Deferred;
            }
            Err(ChannelError::Vanished { .. }) => {
                debug!("Request {} disappeared before it was read", path.display());
                return Disposition::Deferred;
            }
            Err(e) => {
                error!("Error processing fence request: {}", e);
                self.seen.insert(stem);
                self.stats.rejected += 1;
                return Disposition::Rejected;
            }
        };

        self.seen.insert(&request.request_id);

        let age = now_utc()
            .signed_duration_since(request.created_at)
            .to_std()
            .unwrap_or_default();
        if age >= self.seen.ttl() {
            warn!(
                "Ignoring stale request {} created {}s ago",
                request.request_id,
                age.as_secs()
            );
            self.stats.skipped += 1;
            return Disposition::Stale;
        }

        info!(
            "Fence request: action={}, target={}, filesystems={}",
            request.action, request.target_node, request.affected_filesystems
        );

        let report = self.actuate(&request).await;
        let response = FenceResponse::for_request(&request, report.success, report.message);

        match self.channel.write_response(&response) {
            Ok(written) => info!(
                "Wrote fence response: success={}, file={}",
                response.success,
                written.display()
            ),
            Err(e) => {
                error!("Failed to write fence response: {}", e);
                self.stats.rejected += 1;
                return Disposition::Rejected;
            }
        }

        if self.config.request_retention == Retention::Delete {
            self.channel.remove_request(path);
        }

        self.stats.processed += 1;
        if response.success {
            self.stats.succeeded += 1;
        } else {
            self.stats.failed += 1;
        }
        Disposition::Answered {
            success: response.success,
        }
    }

    async fn actuate(&self, request: &FenceRequest) -> ActuationReport {
        let timeout = self.config.actuator_timeout;
        let call = self.actuator.act(
            request.action,
            &request.target_node,
            &request.affected_filesystems,
        );
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                error!("Actuator {} failed: {}", self.actuator.name(), e);
                e.into()
            }
            Err(_) => {
                error!("Actuator {} timed out after {:?}", self.actuator.name(), timeout);
                ActuatorError::Timeout(timeout).into()
            }
        }
    }
}
