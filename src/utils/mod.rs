//! Utility modules: op-log capture, JSON helpers, numeric conversions.
pub mod json;
pub mod num;
pub mod oplog;
