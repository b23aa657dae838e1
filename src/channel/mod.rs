//! Channel module for the request/response rendezvous
//!
//! Two processes exchange messages through plain files in a pair of shared
//! directories. There is no locking: unique ids, size-stability detection
//! and an age-based sweep stand in for it.

mod directory;
mod stability;

pub use directory::{
    is_message_file, ChannelConfig, FileChannel, DEFAULT_MAX_REQUEST_AGE, DEFAULT_REQUEST_DIR,
    DEFAULT_RESPONSE_DIR,
};
pub use stability::{
    StabilityPolicy, DEFAULT_GRACE, DEFAULT_SAMPLE_INTERVAL, DEFAULT_STABILITY_WINDOW,
};

use std::fmt;
use std::str::FromStr;

/// What happens to a message file after it has been consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Retention {
    /// Remove the file once read
    #[default]
    Delete,
    /// Leave the file as a durable record
    Retain,
}

impl fmt::Display for Retention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Retention::Delete => write!(f, "delete"),
            Retention::Retain => write!(f, "retain"),
        }
    }
}

impl FromStr for Retention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delete" => Ok(Retention::Delete),
            "retain" | "keep" => Ok(Retention::Retain),
            other => Err(format!("unknown retention '{}', expected delete or retain", other)),
        }
    }
}
