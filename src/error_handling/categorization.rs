//! Error categorization and retry strategy.
//!
//! This module maps transport failures onto log-friendly labels and configures
//! the retry schedule used by the request orchestrator.

use std::time::Duration;
use tokio_retry::strategy::FixedInterval;

use super::types::RequestError;

/// Creates the retry schedule for `retries` additional attempts.
///
/// Retries are immediate (zero delay) and the iterator yields exactly
/// `retries` items, so the total number of attempts is `retries + 1`.
///
/// # Returns
///
/// A retry strategy iterator ready for use with `tokio_retry::RetryIf`.
pub fn get_retry_strategy(retries: u32) -> impl Iterator<Item = Duration> {
    FixedInterval::new(Duration::ZERO).take(retries as usize)
}

/// Describes a `reqwest::Error` in a short, human-readable way.
///
/// Used when logging failed attempts so the log line says what failed
/// (connect, timeout, body, ...) without dumping the whole error chain.
pub fn describe_reqwest_error(error: &reqwest::Error) -> &'static str {
    if error.is_builder() {
        "request builder error"
    } else if error.is_timeout() {
        "timeout"
    } else if error.is_connect() {
        "connect error"
    } else if error.is_redirect() {
        "redirect error"
    } else if error.is_body() {
        "body error"
    } else if error.is_decode() {
        "decode error"
    } else if error.is_request() {
        "request error"
    } else {
        "other error"
    }
}

/// Describes any `RequestError` for retry logging.
pub fn describe_error(error: &RequestError) -> String {
    match error {
        RequestError::Transport { source, .. } => {
            format!("{} ({})", error.kind(), describe_reqwest_error(source))
        }
        RequestError::Stream { source, .. } => format!("{} ({:?})", error.kind(), source.kind()),
        other => other.kind().to_string(),
    }
}
