//! Audit module for fence lifecycle records
//!
//! Every transition is appended twice: once as a JSON line for tooling and
//! once as a human-readable line for operators. Nothing in this crate reads
//! these files back.

mod journal;

pub use journal::{
    AuditEvent, AuditLog, AuditStatus, Outcome, DETAILED_LOG_FILE, DIAGNOSTIC_LOG_FILE,
    READABLE_LOG_FILE,
};
