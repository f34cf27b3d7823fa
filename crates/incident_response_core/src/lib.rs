//! Shared incident-response domain primitives.
//!
//! This crate owns trigger normalization, the incident record, and the
//! text artifacts (object-log lines, alert messages) derived from it. It
//! intentionally excludes AWS SDK and Lambda runtime concerns.

pub mod alert;
pub mod contract;
pub mod storage_keys;
pub mod trigger;
