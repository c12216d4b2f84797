//! Application configuration and constants.
//!
//! This module provides:
//! - Default values and limits (no process-wide mutable state)
//! - CLI option types and their conversion into a request spec

mod constants;
mod types;

// Re-export all constants
pub use constants::*;
pub use types::{LogFormat, LogLevel, Opt};
