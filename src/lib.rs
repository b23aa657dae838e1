//! fence-recorder - Filesystem-mediated fence relay
//!
//! Lets a cluster resource manager fence a node through an external
//! fencing component that it cannot call directly. The two sides never talk
//! over the network; they exchange JSON files through a pair of shared
//! directories.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                         ┌──────────────────────┐
//! │  fence-recorder      │   requests/<id>.json    │  fence-watcher       │
//! │  (fence agent)       │ ──────────────────────▶ │                      │
//! │                      │                         │  RequestConsumer     │
//! │  discovery ─▶ audit  │   responses/            │   └─ FenceActuator   │
//! │  FenceRequester      │ ◀────────────────────── │  Poll/EventScheduler │
//! └──────────────────────┘   <node>-<id>.json      └──────────────────────┘
//!            │
//!            ▼
//!   fence-events-detailed.jsonl / fence-events-readable.log
//! ```
//!
//! The agent's exit status is the only thing the resource manager sees:
//! 0 when the watcher confirmed the fence, non-zero otherwise.

pub mod actuator;
pub mod audit;
pub mod channel;
pub mod config;
pub mod discovery;
pub mod error;
pub mod message;
pub mod requester;
pub mod watcher;

pub use config::{AgentArgs, RequesterConfig, WatcherArgs, WatcherConfig};
pub use error::{RecorderError, Result};
pub use requester::{FenceOutcome, FenceRequester};
pub use watcher::{RequestConsumer, WatchMode};
