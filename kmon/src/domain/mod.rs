//! Domain model for kmon
//!
//! This module contains core domain types and errors that provide:
//! - Base-prefix-aware address parsing shared by commands and snapshots
//! - Structured error handling

pub mod errors;
pub mod types;

pub use types::{parse_address, Address};

pub use errors::{MonitorError, SnapshotError};
