//! Completeness detection for files written by another process
//!
//! A writer in a different process gives no signal when it is done, so the
//! reader samples the file size until it is non-zero and unchanged across
//! two consecutive samples, then waits one extra grace interval.

use crate::error::{ChannelError, ChannelResult};

use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default interval between size samples
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// Default extra wait after the size settles
pub const DEFAULT_GRACE: Duration = Duration::from_millis(100);

/// Default bound on the whole stabilization wait
pub const DEFAULT_STABILITY_WINDOW: Duration = Duration::from_secs(5);

/// Tuning for size-stability detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityPolicy {
    /// Interval between size samples
    pub sample_interval: Duration,
    /// Extra wait once the size has settled
    pub grace: Duration,
    /// Give up after this long
    pub window: Duration,
}

impl Default for StabilityPolicy {
    fn default() -> Self {
        Self {
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            grace: DEFAULT_GRACE,
            window: DEFAULT_STABILITY_WINDOW,
        }
    }
}

impl StabilityPolicy {
    /// Same policy with the window capped at `limit`
    pub fn capped(self, limit: Duration) -> Self {
        Self {
            window: self.window.min(limit),
            ..self
        }
    }

    /// Wait until `path` looks completely written, returning its size
    pub async fn wait_until_stable(&self, path: &Path) -> ChannelResult<u64> {
        let start = Instant::now();
        let mut last_size: Option<u64> = None;

        loop {
            if start.elapsed() >= self.window {
                warn!("Timeout waiting for {} to be fully written", path.display());
                return Err(ChannelError::Unstable {
                    path: path.to_path_buf(),
                    waited: start.elapsed(),
                });
            }

            match tokio::fs::metadata(path).await {
                Ok(meta) => {
                    let size = meta.len();
                    if size > 0 && last_size == Some(size) {
                        tokio::time::sleep(self.grace.min(self.remaining(start))).await;
                        debug!(size, "{} is stable", path.display());
                        return Ok(size);
                    }
                    last_size = Some(size);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(ChannelError::Vanished {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) => {
                    // Possibly mid-create on some filesystems
                    debug!("stat {} failed: {}", path.display(), e);
                }
            }

            tokio::time::sleep(self.sample_interval.min(self.remaining(start))).await;
        }
    }

    fn remaining(&self, start: Instant) -> Duration {
        self.window.saturating_sub(start.elapsed())
    }
}
