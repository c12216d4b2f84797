//! request_util library: declarative HTTP requests
//!
//! This library turns a declarative [`RequestSpec`] into an HTTP exchange and a
//! fully materialized [`ResponseRecord`]: query and cookie composition, content
//! negotiation (JSON, urlencoded, multipart, raw streams), manual redirect
//! following with a recorded chain, an on-disk response cache, retries, saving
//! to disk, and bounded fan-out over several URLs.
//!
//! # Example
//!
//! ```no_run
//! use request_util::{request, RequestSpec, Target};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let record = request(RequestSpec {
//!     url: Some(Target::from("https://example.com/get")),
//!     query: Some([("a", "1")].into_iter().collect()),
//!     retries: 2,
//!     ..Default::default()
//! })
//! .await?
//! .into_one()
//! .ok_or("expected a single response")?;
//!
//! println!("{} {}", record.status_code, record.text.unwrap_or_default());
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime. Use `#[tokio::main]` in your application
//! or ensure you're calling library functions within an async context.

pub mod cache;
pub mod config;
mod error_handling;
pub mod fetch;
pub mod initialization;
pub mod parse;
pub mod request;

// Re-export public API
pub use error_handling::{ErrorKind, InitializationError, RequestError};
pub use fetch::{fetch_all, fetch_one, request, BodyStream, Fetched, ResponseBody, ResponseRecord};
pub use parse::{parse_redirect_response, parse_redirect_url, parse_response_cookies};
pub use request::{
    Attachment, AttachmentSource, Auth, ByteReader, Cookies, InputSource, OutputStream,
    QuerySource, Redirects, RequestSpec, Target, TlsOptions,
};
