//! Configuration constants.
//!
//! Documented defaults used when a [`RequestSpec`](crate::RequestSpec) leaves a
//! setting unset. There is no process-wide mutable configuration.

use std::time::Duration;

/// Maximum in-flight requests when a spec targets a list of URLs.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// How long a cache entry stays fresh when `max_cache_time` is not set.
pub const DEFAULT_MAX_CACHE_TIME: Duration = Duration::from_secs(10 * 60);

/// Hard cap on followed redirect hops.
///
/// Applies even when redirects are unlimited; exceeding it is a
/// `TooManyRedirects` error.
pub const MAX_REDIRECT_HOPS: usize = 20;

/// Per-request timeout in seconds when `timeout` is not set.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default User-Agent header value.
pub const DEFAULT_USER_AGENT: &str = concat!("request_util/", env!("CARGO_PKG_VERSION"));

// Content types with dedicated encoders/decoders
pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const MULTIPART_CONTENT_TYPE: &str = "multipart/form-data";
pub const URL_ENCODED_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// HTTP methods accepted by a request spec (lowercase).
pub const ALLOWED_METHODS: &[&str] = &[
    "get", "post", "put", "patch", "delete", "head", "options", "trace", "connect",
];

// Log targets for per-request events, filterable with RUST_LOG
// (e.g. `RUST_LOG=request_util::cache=debug`)
pub const LOG_TARGET_ATTEMPT: &str = "request_util::attempt";
pub const LOG_TARGET_REDIRECT: &str = "request_util::redirect";
pub const LOG_TARGET_CACHE: &str = "request_util::cache";
