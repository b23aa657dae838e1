//! Integration tests for fence-recorder
//!
//! Each test runs the requesting agent and the watcher against a private
//! pair of temporary directories.

use async_trait::async_trait;
use fence_recorder::actuator::{ActuationReport, FenceActuator};
use fence_recorder::audit::AuditStatus;
use fence_recorder::channel::{ChannelConfig, FileChannel, Retention};
use fence_recorder::config::RequesterConfig;
use fence_recorder::discovery::{CommandOutput, CommandRunner, DiscoveryConfig, DiscoveryEngine};
use fence_recorder::error::{ActuatorError, DiscoveryError, DiscoveryResult};
use fence_recorder::message::{FenceAction, FenceRequest, FilesystemSet};
use fence_recorder::requester::{FenceOutcome, FenceRequester};
use fence_recorder::watcher::{
    ConsumerConfig, Disposition, PollScheduler, RequestConsumer, Scheduler, WatcherStats,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tempfile::tempdir;
use tokio::task::JoinHandle;

/// Actuator returning a fixed report and counting invocations
struct FixedActuator {
    success: bool,
    message: &'static str,
    calls: AtomicUsize,
}

impl FixedActuator {
    fn new(success: bool, message: &'static str) -> Arc<Self> {
        Arc::new(Self {
            success,
            message,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FenceActuator for FixedActuator {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn act(
        &self,
        _action: FenceAction,
        _target: &str,
        _filesystems: &FilesystemSet,
    ) -> Result<ActuationReport, ActuatorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ActuationReport {
            success: self.success,
            message: self.message.to_string(),
        })
    }
}

/// Discovery tools with canned output; only `pcs` is installed
struct PcsOnlyRunner;

#[async_trait]
impl CommandRunner for PcsOnlyRunner {
    fn is_installed(&self, program: &str) -> bool {
        program == "pcs"
    }

    async fn run(&self, program: &str, args: &[&str], _timeout: Duration) -> DiscoveryResult<CommandOutput> {
        match (program, args.first().copied()) {
            ("pcs", Some("status")) => Ok(CommandOutput {
                stdout: "  * gfs2-fs-a\t(ocf:heartbeat:Filesystem):\t Started rabbit-03\n\
                         \x20 * gfs2-fs-b\t(ocf:heartbeat:Filesystem):\t Started rabbit-03\n"
                    .to_string(),
            }),
            _ => Err(DiscoveryError::ToolMissing {
                tool: program.to_string(),
            }),
        }
    }
}

fn channel_config(root: &Path) -> ChannelConfig {
    ChannelConfig::with_dirs(root.join("requests"), root.join("responses"))
}

fn requester_config(root: &Path, timeout: Duration) -> RequesterConfig {
    RequesterConfig {
        channel: channel_config(root),
        log_dir: root.join("log"),
        timeout,
        poll_interval: Duration::from_millis(500),
        ..Default::default()
    }
}

fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

fn audit_records(root: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(root.join("log").join("fence-events-detailed.jsonl"))
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

/// Run a polling watcher in the background until the returned flag is set
fn spawn_watcher(
    root: &Path,
    actuator: Arc<dyn FenceActuator>,
    config: ConsumerConfig,
) -> (Arc<AtomicBool>, JoinHandle<WatcherStats>) {
    let channel = FileChannel::new(channel_config(root));
    channel.ensure_dirs().unwrap();

    let shutdown = Arc::new(AtomicBool::new(false));
    let mut scheduler = PollScheduler::new(Duration::from_millis(50), shutdown.clone());
    let mut consumer = RequestConsumer::new(channel, actuator, config);

    let handle = tokio::spawn(async move {
        scheduler.run(&mut consumer).await.unwrap();
        consumer.stats().clone()
    });
    (shutdown, handle)
}

#[tokio::test]
async fn test_end_to_end_delete_policy() {
    let dir = tempdir().unwrap();
    let actuator = FixedActuator::new(true, "ok");
    let (shutdown, watcher) = spawn_watcher(dir.path(), actuator.clone(), ConsumerConfig::default());

    let requester = FenceRequester::new(
        requester_config(dir.path(), Duration::from_secs(10)),
        DiscoveryEngine::disabled(),
    );
    let outcome = requester.fence(FenceAction::Reboot, "rabbit-03").await;

    shutdown.store(true, Ordering::SeqCst);
    let stats = watcher.await.unwrap();

    match outcome {
        FenceOutcome::Completed { response } => {
            assert!(response.success);
            assert_eq!(response.message, "ok");
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(stats.processed, 1);
    assert_eq!(actuator.calls(), 1);
    assert_eq!(file_count(&dir.path().join("requests")), 0);
    assert_eq!(file_count(&dir.path().join("responses")), 0);
}

#[tokio::test]
async fn test_end_to_end_response_retention() {
    let dir = tempdir().unwrap();
    let actuator = FixedActuator::new(true, "ok");
    let (shutdown, watcher) = spawn_watcher(dir.path(), actuator, ConsumerConfig::default());

    let config = RequesterConfig {
        response_retention: Retention::Retain,
        ..requester_config(dir.path(), Duration::from_secs(10))
    };
    let requester = FenceRequester::new(config, DiscoveryEngine::disabled());
    let outcome = requester.fence(FenceAction::Off, "rabbit-03").await;

    shutdown.store(true, Ordering::SeqCst);
    watcher.await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(file_count(&dir.path().join("requests")), 0);
    assert_eq!(file_count(&dir.path().join("responses")), 1);
}

#[tokio::test]
async fn test_end_to_end_request_retention_processes_once() {
    let dir = tempdir().unwrap();
    let actuator = FixedActuator::new(true, "ok");
    let config = ConsumerConfig {
        request_retention: Retention::Retain,
        ..Default::default()
    };
    let (shutdown, watcher) = spawn_watcher(dir.path(), actuator.clone(), config);

    let requester = FenceRequester::new(
        requester_config(dir.path(), Duration::from_secs(10)),
        DiscoveryEngine::disabled(),
    );
    let outcome = requester.fence(FenceAction::Reboot, "rabbit-03").await;

    // let the watcher rescan the retained request a few times
    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown.store(true, Ordering::SeqCst);
    let stats = watcher.await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(actuator.calls(), 1);
    assert!(stats.skipped >= 1);
    assert_eq!(file_count(&dir.path().join("requests")), 1);
}

#[tokio::test]
async fn test_duplicate_observation_actuates_once() {
    let dir = tempdir().unwrap();
    let channel = FileChannel::new(channel_config(dir.path()));
    channel.ensure_dirs().unwrap();

    let request = FenceRequest::new(FenceAction::Reboot, "rabbit-03", FilesystemSet::NoneDetected);
    let path = channel.submit_request(&request).unwrap();

    let actuator = FixedActuator::new(true, "ok");
    let mut consumer = RequestConsumer::new(channel.clone(), actuator.clone(), ConsumerConfig::default());
    assert_eq!(consumer.process_path(&path).await, Disposition::Answered { success: true });

    // same request id shows up again, e.g. rewritten by a confused writer
    channel.submit_request(&request).unwrap();
    assert_eq!(consumer.process_path(&path).await, Disposition::Duplicate);
    assert_eq!(actuator.calls(), 1);
}

#[tokio::test]
async fn test_reboot_success_exit_and_audit() {
    let dir = tempdir().unwrap();
    let actuator = FixedActuator::new(true, "ok");
    let (shutdown, watcher) = spawn_watcher(dir.path(), actuator, ConsumerConfig::default());

    let requester = FenceRequester::new(
        requester_config(dir.path(), Duration::from_secs(10)),
        DiscoveryEngine::disabled(),
    );
    let outcome = requester.fence(FenceAction::Reboot, "rabbit-03").await;
    shutdown.store(true, Ordering::SeqCst);
    watcher.await.unwrap();

    assert!(outcome.is_success());

    let records = audit_records(dir.path());
    let last = records.last().unwrap();
    assert_eq!(last["status"], AuditStatus::Completed.to_string());
    assert_eq!(last["target_node"], "rabbit-03");
    assert_eq!(last["action"], "reboot");

    let readable =
        std::fs::read_to_string(dir.path().join("log").join("fence-events-readable.log")).unwrap();
    assert!(readable.lines().last().unwrap().contains("STATUS=completed"));
}

#[tokio::test]
async fn test_no_watcher_times_out() {
    let dir = tempdir().unwrap();
    let requester = FenceRequester::new(
        requester_config(dir.path(), Duration::from_secs(2)),
        DiscoveryEngine::disabled(),
    );

    let start = Instant::now();
    let outcome = requester.fence(FenceAction::Reboot, "rabbit-03").await;
    let elapsed = start.elapsed();

    assert!(matches!(outcome, FenceOutcome::TimedOut { .. }));
    assert!(!outcome.is_success());
    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_millis(2500));

    let records = audit_records(dir.path());
    let last = records.last().unwrap();
    assert_eq!(last["status"], "failed");
    assert_eq!(last["outcome"], "timeout");
    assert!(last["details"].as_str().unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_actuator_failure_is_not_a_timeout() {
    let dir = tempdir().unwrap();
    let actuator = FixedActuator::new(false, "power controller unreachable");
    let (shutdown, watcher) = spawn_watcher(dir.path(), actuator, ConsumerConfig::default());

    let requester = FenceRequester::new(
        requester_config(dir.path(), Duration::from_secs(10)),
        DiscoveryEngine::disabled(),
    );
    let outcome = requester.fence(FenceAction::Off, "rabbit-03").await;
    shutdown.store(true, Ordering::SeqCst);
    watcher.await.unwrap();

    assert!(matches!(outcome, FenceOutcome::Failed { .. }));
    let records = audit_records(dir.path());
    let last = records.last().unwrap();
    assert_eq!(last["status"], "failed");
    assert_eq!(last["outcome"], "failed");
    assert!(last["details"]
        .as_str()
        .unwrap()
        .contains("power controller unreachable"));
}

#[tokio::test]
async fn test_old_requests_are_swept_before_new_request() {
    let dir = tempdir().unwrap();
    let channel = FileChannel::new(channel_config(dir.path()));
    channel.ensure_dirs().unwrap();

    let stale = FenceRequest::new(FenceAction::Reboot, "rabbit-01", FilesystemSet::NoneDetected);
    let stale_path = channel.submit_request(&stale).unwrap();
    std::fs::File::options()
        .write(true)
        .open(&stale_path)
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(400))
        .unwrap();

    let requester = FenceRequester::new(
        requester_config(dir.path(), Duration::from_millis(500)),
        DiscoveryEngine::disabled(),
    );
    requester.fence(FenceAction::Reboot, "rabbit-03").await;

    assert!(!stale_path.exists());
    let pending = channel.pending_requests().unwrap();
    assert_eq!(pending.len(), 1);
    assert_ne!(pending[0], stale_path);
}

#[tokio::test]
async fn test_discovered_filesystems_reach_the_actuator() {
    let dir = tempdir().unwrap();
    let actuator = FixedActuator::new(true, "ok");
    let (shutdown, watcher) = spawn_watcher(dir.path(), actuator, ConsumerConfig::default());

    let discovery = DiscoveryEngine::with_runner(&DiscoveryConfig::default(), Arc::new(PcsOnlyRunner));
    let config = RequesterConfig {
        response_retention: Retention::Retain,
        ..requester_config(dir.path(), Duration::from_secs(10))
    };
    let requester = FenceRequester::new(config, discovery);
    let outcome = requester.fence(FenceAction::Reboot, "rabbit-03").await;
    shutdown.store(true, Ordering::SeqCst);
    watcher.await.unwrap();

    assert!(outcome.is_success());
    let records = audit_records(dir.path());
    assert_eq!(
        records[0]["affected_filesystems"],
        serde_json::json!(["fs-a", "fs-b"])
    );
}

#[tokio::test]
async fn test_legacy_request_fields_are_accepted() {
    let dir = tempdir().unwrap();
    let channel = FileChannel::new(channel_config(dir.path()));
    channel.ensure_dirs().unwrap();

    let id = "0f8fad5b-d9cb-469f-a165-70867728950e";
    let created = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let legacy = serde_json::json!({
        "request_id": id,
        "action": "off",
        "target_node": "rabbit-03",
        "gfs2_filesystems": ["scratch"],
        "recorder_node": "rabbit-01",
        "timestamp": created,
    });
    let path = channel.request_dir().join(format!("{}.json", id));
    std::fs::write(&path, serde_json::to_string_pretty(&legacy).unwrap()).unwrap();

    let actuator = FixedActuator::new(true, "ok");
    let mut consumer = RequestConsumer::new(channel.clone(), actuator, ConsumerConfig::default());
    assert_eq!(consumer.process_path(&path).await, Disposition::Answered { success: true });
    assert!(channel
        .response_dir()
        .join(format!("rabbit-03-{}.json", id))
        .exists());
}
