//! Message module for the request/response protocol
//!
//! Requests and responses are the only payloads exchanged between the
//! inline fence agent and the watcher. Both ends must agree on field
//! names and on the timestamp representation.

mod types;

pub use types::{
    is_valid_node_name, local_hostname, now_utc, response_file_name, timestamp, FenceAction,
    FenceRequest, FenceResponse, FilesystemSet, DISCOVERY_DISABLED_SENTINEL, MESSAGE_EXTENSION,
    NONE_DETECTED_SENTINEL,
};
