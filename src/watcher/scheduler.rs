//! Drivers that decide when the consumer scans

use super::consumer::RequestConsumer;
use crate::error::{ChannelError, Result};

use async_trait::async_trait;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How often a blocked scheduler re-checks the shutdown flag
const SHUTDOWN_CHECK_INTERVAL: Duration = Duration::from_millis(200);

/// Default safety rescan period for the event scheduler
pub const DEFAULT_RESCAN_INTERVAL: Duration = Duration::from_secs(5);

/// Runs a consumer until shutdown is signalled
#[async_trait]
pub trait Scheduler: Send {
    async fn run(&mut self, consumer: &mut RequestConsumer) -> Result<()>;
}

/// Scans the request directory on a fixed interval
pub struct PollScheduler {
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl PollScheduler {
    pub fn new(interval: Duration, shutdown: Arc<AtomicBool>) -> Self {
        Self { interval, shutdown }
    }
}

#[async_trait]
impl Scheduler for PollScheduler {
    async fn run(&mut self, consumer: &mut RequestConsumer) -> Result<()> {
        info!("Polling {} every {:?}", consumer.channel().request_dir().display(), self.interval);

        while !self.shutdown.load(Ordering::SeqCst) {
            consumer.run_pass().await;
            sleep_unless_shutdown(self.interval, &self.shutdown).await;
        }
        Ok(())
    }
}

/// Scans when the request directory changes, plus a periodic safety scan
pub struct EventScheduler {
    rescan_interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl EventScheduler {
    pub fn new(rescan_interval: Duration, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            rescan_interval,
            shutdown,
        }
    }
}

#[async_trait]
impl Scheduler for EventScheduler {
    async fn run(&mut self, consumer: &mut RequestConsumer) -> Result<()> {
        let request_dir = consumer.channel().request_dir().to_path_buf();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _watcher = watch_directory(&request_dir, tx)?;

        info!(
            "Watching {} for requests (rescan every {:?})",
            request_dir.display(),
            self.rescan_interval
        );

        consumer.run_pass().await;
        let mut last_scan = Instant::now();

        while !self.shutdown.load(Ordering::SeqCst) {
            match tokio::time::timeout(SHUTDOWN_CHECK_INTERVAL, rx.recv()).await {
                Ok(Some(())) => {
                    while rx.try_recv().is_ok() {}
                    debug!("Request directory changed");
                    consumer.run_pass().await;
                    last_scan = Instant::now();
                }
                Ok(None) => {
                    warn!("Filesystem watch ended unexpectedly");
                    return Err(ChannelError::DirectoryUnusable {
                        path: request_dir,
                        reason: "filesystem watch ended".to_string(),
                    }
                    .into());
                }
                Err(_) => {
                    if last_scan.elapsed() >= self.rescan_interval {
                        consumer.run_pass().await;
                        last_scan = Instant::now();
                    }
                }
            }
        }
        Ok(())
    }
}

fn watch_directory(dir: &Path, tx: mpsc::UnboundedSender<()>) -> Result<RecommendedWatcher> {
    let unusable = |e: notify::Error| ChannelError::DirectoryUnusable {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    };

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) if !matches!(event.kind, EventKind::Access(_)) => {
            let _ = tx.send(());
        }
        Ok(_) => {}
        Err(e) => warn!("Filesystem watch error: {}", e),
    })
    .map_err(unusable)?;

    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(unusable)?;
    Ok(watcher)
}

async fn sleep_unless_shutdown(total: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now() + total;
    while !shutdown.load(Ordering::SeqCst) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        tokio::time::sleep(remaining.min(SHUTDOWN_CHECK_INTERVAL)).await;
    }
}
