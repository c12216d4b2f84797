//! Process and per-request resource setup.
//!
//! - HTTP clients (redirects disabled, TLS options on the secure client)
//! - Logger (for the CLI binary)
//!
//! All initialization functions return [`InitializationError`](crate::InitializationError).

mod client;
mod logger;

pub use client::{init_clients, Clients};
pub use logger::init_logger_with;
