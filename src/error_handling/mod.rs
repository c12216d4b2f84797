//! Error handling for the request pipeline.
//!
//! This module provides:
//! - Error type definitions (`RequestError`, `InitializationError`)
//! - Error categorization (`ErrorKind`) used by the retry policy
//! - Retry strategy configuration
//!
//! Errors are categorized into:
//! - **Configuration**: rejected before any I/O, never retried
//! - **Transport**: connection/stream failures, retried up to the budget
//! - **HTTP status**: a completed response with status >= 400
//! - **Decode**: a body that does not match its declared Content-Type
//! - **I/O**: local filesystem failures (uploads, save path)

mod categorization;
mod types;

// Re-export public API
pub use categorization::{describe_error, describe_reqwest_error, get_retry_strategy};
pub use types::{ErrorKind, InitializationError, RequestError};
