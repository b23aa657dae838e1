//! Directory-backed request/response channel
//!
//! Requests live in one directory as `<request_id>.json`; responses live in
//! another as `<target_node>-<request_id>.json`. Writers go through a hidden
//! temporary file that is renamed into place. Readers only consider
//! `*.json` names and still wait for the size to settle before parsing,
//! since rename atomicity is not guaranteed on every deployment filesystem.

use crate::channel::{Retention, StabilityPolicy};
use crate::error::{ChannelError, ChannelResult};
use crate::message::{is_valid_node_name, FenceRequest, FenceResponse, MESSAGE_EXTENSION};

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, error, info, warn};

/// Default request directory
pub const DEFAULT_REQUEST_DIR: &str = "/localdisk/fence-recorder/requests";

/// Default response directory
pub const DEFAULT_RESPONSE_DIR: &str = "/localdisk/fence-recorder/responses";

/// Default maximum age of an unconsumed request before it is swept
pub const DEFAULT_MAX_REQUEST_AGE: Duration = Duration::from_secs(300);

/// Configuration for the file channel
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Directory requests are written to
    pub request_dir: PathBuf,
    /// Directory responses are written to
    pub response_dir: PathBuf,
    /// Completeness detection tuning
    pub stability: StabilityPolicy,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            request_dir: PathBuf::from(DEFAULT_REQUEST_DIR),
            response_dir: PathBuf::from(DEFAULT_RESPONSE_DIR),
            stability: StabilityPolicy::default(),
        }
    }
}

impl ChannelConfig {
    /// Create with explicit directories and default stability tuning
    pub fn with_dirs(request_dir: impl Into<PathBuf>, response_dir: impl Into<PathBuf>) -> Self {
        Self {
            request_dir: request_dir.into(),
            response_dir: response_dir.into(),
            stability: StabilityPolicy::default(),
        }
    }
}

/// Shared-directory transport between requester and watcher
#[derive(Debug, Clone)]
pub struct FileChannel {
    config: ChannelConfig,
}

impl FileChannel {
    pub fn new(config: ChannelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn request_dir(&self) -> &Path {
        &self.config.request_dir
    }

    pub fn response_dir(&self) -> &Path {
        &self.config.response_dir
    }

    /// Create both directories if missing
    pub fn ensure_dirs(&self) -> ChannelResult<()> {
        for dir in [&self.config.request_dir, &self.config.response_dir] {
            std::fs::create_dir_all(dir).map_err(|e| ChannelError::DirectoryUnusable {
                path: dir.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Write a request file, returning its path
    pub fn submit_request(&self, request: &FenceRequest) -> ChannelResult<PathBuf> {
        let path = self.config.request_dir.join(request.file_name());
        let json = request.to_json().map_err(|e| ChannelError::WriteFailed {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        write_atomic(&self.config.request_dir, &path, json.as_bytes())?;
        info!("Wrote fence request: {}", path.display());
        Ok(path)
    }

    /// Write a response file, returning its path
    pub fn write_response(&self, response: &FenceResponse) -> ChannelResult<PathBuf> {
        if !is_valid_node_name(&response.target_node) {
            return Err(ChannelError::WriteFailed {
                path: self.config.response_dir.clone(),
                reason: format!("invalid target node '{}'", response.target_node),
            });
        }
        let path = self.config.response_dir.join(response.file_name());
        let json = response.to_json().map_err(|e| ChannelError::WriteFailed {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        write_atomic(&self.config.response_dir, &path, json.as_bytes())?;
        Ok(path)
    }

    /// Path where the response to `request` will appear
    pub fn response_path(&self, request: &FenceRequest) -> PathBuf {
        self.config.response_dir.join(request.response_file_name())
    }

    /// Request files currently in the request directory, oldest first
    pub fn pending_requests(&self) -> ChannelResult<Vec<PathBuf>> {
        let mut found: Vec<(SystemTime, PathBuf)> = message_files(&self.config.request_dir)?
            .into_iter()
            .map(|(path, meta)| (meta.modified().unwrap_or(SystemTime::UNIX_EPOCH), path))
            .collect();
        found.sort();
        Ok(found.into_iter().map(|(_, path)| path).collect())
    }

    /// Wait for a request file to settle, then parse it
    pub async fn read_request(&self, path: &Path) -> ChannelResult<FenceRequest> {
        self.config.stability.wait_until_stable(path).await?;
        let json = read_file(path).await?;
        let request = FenceRequest::from_json(&json).map_err(|e| ChannelError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let expected = file_stem(path);
        if request.request_id != expected {
            return Err(ChannelError::IdMismatch {
                path: path.to_path_buf(),
                expected,
                found: request.request_id,
            });
        }
        if !is_valid_node_name(&request.target_node) {
            return Err(ChannelError::Malformed {
                path: path.to_path_buf(),
                reason: format!("invalid target node '{}'", request.target_node),
            });
        }
        Ok(request)
    }

    /// Read a response file, giving the stability wait at most `limit`
    pub async fn read_response(
        &self,
        path: &Path,
        request_id: &str,
        limit: Duration,
    ) -> ChannelResult<FenceResponse> {
        self.config.stability.capped(limit).wait_until_stable(path).await?;
        let json = read_file(path).await?;
        let response = FenceResponse::from_json(&json).map_err(|e| ChannelError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if response.request_id != request_id {
            return Err(ChannelError::IdMismatch {
                path: path.to_path_buf(),
                expected: request_id.to_string(),
                found: response.request_id,
            });
        }
        Ok(response)
    }

    /// Poll for the response to `request`
    ///
    /// Returns `None` once `timeout` has elapsed without a usable response.
    /// Unreadable or mismatched response files are logged and skipped; the
    /// timeout turns them into a failure. Total wait never exceeds
    /// `timeout + poll_interval`.
    pub async fn wait_for_response(
        &self,
        request: &FenceRequest,
        timeout: Duration,
        poll_interval: Duration,
        retention: Retention,
    ) -> Option<FenceResponse> {
        let path = self.response_path(request);
        let start = Instant::now();
        let mut reported_bad_file = false;

        info!(
            "Waiting for fence response: {} (timeout={}s)",
            path.display(),
            timeout.as_secs_f64()
        );

        loop {
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                break;
            }

            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                match self.read_response(&path, &request.request_id, timeout - elapsed).await {
                    Ok(response) => {
                        if retention == Retention::Delete {
                            if let Err(e) = std::fs::remove_file(&path) {
                                warn!("Failed to remove response {}: {}", path.display(), e);
                            }
                        }
                        info!(
                            "Fence response received: success={}, action={}, message={}",
                            response.success, response.action_performed, response.message
                        );
                        return Some(response);
                    }
                    Err(e) if !reported_bad_file => {
                        warn!("Ignoring unusable response file: {}", e);
                        reported_bad_file = true;
                    }
                    Err(e) => debug!("Response still unusable: {}", e),
                }
            }

            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(poll_interval.min(remaining)).await;
        }

        error!("Fence response timeout after {}s", timeout.as_secs_f64());
        None
    }

    /// Best-effort removal of a consumed request file
    pub fn remove_request(&self, path: &Path) -> bool {
        match std::fs::remove_file(path) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to remove request {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Delete request files older than `max_age`, returning how many were removed
    ///
    /// Only `*.json` names are considered, so temporary files from an
    /// in-flight write are never touched; the age floor covers writers that
    /// write in place.
    pub fn sweep_requests(&self, max_age: Duration) -> ChannelResult<usize> {
        let now = SystemTime::now();
        let mut removed = 0;

        for (path, meta) in message_files(&self.config.request_dir)? {
            let Ok(modified) = meta.modified() else {
                continue;
            };
            let age = now.duration_since(modified).unwrap_or_default();
            if age <= max_age {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!("Cleaned up old request: {}", path.display());
                    removed += 1;
                }
                Err(e) => warn!("Failed to clean up {}: {}", path.display(), e),
            }
        }

        Ok(removed)
    }
}

/// Write `bytes` to `final_path` via a synced temporary file in `dir`
fn write_atomic(dir: &Path, final_path: &Path, bytes: &[u8]) -> ChannelResult<()> {
    let write_err = |reason: String| ChannelError::WriteFailed {
        path: final_path.to_path_buf(),
        reason,
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| write_err(format!("cannot create temp file in {}: {}", dir.display(), e)))?;
    tmp.write_all(bytes).map_err(|e| write_err(e.to_string()))?;
    tmp.as_file().sync_all().map_err(|e| write_err(e.to_string()))?;
    tmp.persist(final_path)
        .map_err(|e| write_err(e.error.to_string()))?;
    Ok(())
}

/// Regular `*.json` files in `dir` with their metadata
fn message_files(dir: &Path) -> ChannelResult<Vec<(PathBuf, std::fs::Metadata)>> {
    let entries = std::fs::read_dir(dir).map_err(|e| ChannelError::DirectoryUnusable {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut files = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !is_message_file(&path) {
            continue;
        }
        match entry.metadata() {
            Ok(meta) if meta.is_file() => files.push((path, meta)),
            Ok(_) => {}
            Err(e) => debug!("Skipping {}: {}", path.display(), e),
        }
    }
    Ok(files)
}

/// Whether `path` names a message file (visible `*.json`)
pub fn is_message_file(path: &Path) -> bool {
    let visible = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| !n.starts_with('.'))
        .unwrap_or(false);
    visible && path.extension().and_then(|e| e.to_str()) == Some(MESSAGE_EXTENSION)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

async fn read_file(path: &Path) -> ChannelResult<String> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ChannelError::Vanished {
                path: path.to_path_buf(),
            }
        } else {
            ChannelError::ReadFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        }
    })
}
