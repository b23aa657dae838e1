//! Watcher daemon internals
//!
//! A `RequestConsumer` turns request files into actuator calls and
//! responses. A `Scheduler` decides when it scans: on filesystem events or
//! on a fixed poll interval.

mod consumer;
mod recency;
mod scheduler;

pub use consumer::{ConsumerConfig, Disposition, RequestConsumer, WatcherStats};
pub use recency::{RecencySet, DEFAULT_RECENCY_CAPACITY, DEFAULT_RECENCY_TTL};
pub use scheduler::{EventScheduler, PollScheduler, Scheduler, DEFAULT_RESCAN_INTERVAL};

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// Scan trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchMode {
    /// Filesystem notifications plus a periodic safety scan
    #[default]
    Events,
    /// Fixed-interval directory scan
    Poll,
}

impl WatchMode {
    /// Build the scheduler for this mode
    pub fn scheduler(
        self,
        poll_interval: Duration,
        rescan_interval: Duration,
        shutdown: Arc<AtomicBool>,
    ) -> Box<dyn Scheduler> {
        match self {
            WatchMode::Events => Box::new(EventScheduler::new(rescan_interval, shutdown)),
            WatchMode::Poll => Box::new(PollScheduler::new(poll_interval, shutdown)),
        }
    }
}

impl fmt::Display for WatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchMode::Events => write!(f, "events"),
            WatchMode::Poll => write!(f, "poll"),
        }
    }
}

impl FromStr for WatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "events" | "event" | "notify" => Ok(WatchMode::Events),
            "poll" | "polling" => Ok(WatchMode::Poll),
            other => Err(format!("unknown watch mode '{}', expected events or poll", other)),
        }
    }
}
