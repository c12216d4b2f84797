//! Error type definitions.
//!
//! This module defines the error types surfaced by the request pipeline and by
//! process initialization (logger, HTTP clients).

use bytes::Bytes;
use log::SetLoggerError;
use reqwest::Error as ReqwestError;
use strum_macros::{Display, IntoStaticStr};
use thiserror::Error;

use crate::fetch::ResponseRecord;
use crate::request::ResolvedRequestOptions;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error initializing the HTTP client (bad certificate, identity, TLS settings).
    #[error("HTTP client initialization error: {0}")]
    HttpClientError(#[from] ReqwestError),
}

/// Errors surfaced by the request pipeline.
///
/// Every variant maps onto one [`ErrorKind`]; use [`RequestError::kind`] when
/// only the category matters.
#[derive(Error, Debug)]
pub enum RequestError {
    /// Invalid or conflicting options. Raised before any network contact.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Connection, DNS or transfer failure reported by the transport.
    #[error("Transport error for {options}: {source}")]
    Transport {
        /// Options of the attempt that failed.
        options: Box<ResolvedRequestOptions>,
        /// Underlying transport error.
        #[source]
        source: ReqwestError,
    },

    /// Input or output stream failure while a body was being transferred.
    #[error("Stream error for {options}: {source}")]
    Stream {
        /// Options of the attempt that failed.
        options: Box<ResolvedRequestOptions>,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The redirect chain exceeded the internal hop cap.
    #[error("Too many redirects ({hops}) for {options}")]
    TooManyRedirects {
        /// Options of the last attempt in the chain.
        options: Box<ResolvedRequestOptions>,
        /// Number of hops followed before giving up.
        hops: usize,
    },

    /// The response completed with status >= 400 and status errors are enabled.
    #[error("HTTP Error: {}({})", .record.status_message, .record.status_code)]
    HttpStatus {
        /// The materialized response.
        record: Box<ResponseRecord>,
    },

    /// The response body could not be decoded as declared by its Content-Type.
    #[error("Decode error ({status_code}): {message}")]
    Decode {
        /// Status code of the response that failed to decode.
        status_code: u16,
        /// What went wrong.
        message: String,
        /// Decoded text, when charset decoding succeeded.
        text: Option<String>,
        /// Raw response bytes.
        buffer: Bytes,
    },

    /// Local filesystem failure (file uploads, save path).
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path involved in the failed operation.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Broad error categories used for retry decisions and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[cfg_attr(test, derive(strum_macros::EnumIter))]
pub enum ErrorKind {
    #[strum(serialize = "Configuration error")]
    Configuration,
    #[strum(serialize = "Transport error")]
    Transport,
    #[strum(serialize = "HTTP status error")]
    HttpStatus,
    #[strum(serialize = "Decode error")]
    Decode,
    #[strum(serialize = "I/O error")]
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        (*self).into()
    }
}

impl RequestError {
    /// Shorthand for a [`RequestError::Configuration`].
    pub fn config(message: impl Into<String>) -> Self {
        RequestError::Configuration(message.into())
    }

    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RequestError::Configuration(_) => ErrorKind::Configuration,
            RequestError::Transport { .. }
            | RequestError::Stream { .. }
            | RequestError::TooManyRedirects { .. } => ErrorKind::Transport,
            RequestError::HttpStatus { .. } => ErrorKind::HttpStatus,
            RequestError::Decode { .. } => ErrorKind::Decode,
            RequestError::Io { .. } => ErrorKind::Io,
        }
    }

    /// Whether another attempt may succeed.
    ///
    /// Only failures raised while talking to the peer loop the retry budget.
    /// A completed response, even an errorful one, is terminal. So is a
    /// redirect loop, which would repeat identically.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            RequestError::Transport { .. } | RequestError::Stream { .. }
        )
    }

    /// Options of the failed attempt, for transport-class errors.
    pub fn request_options(&self) -> Option<&ResolvedRequestOptions> {
        match self {
            RequestError::Transport { options, .. }
            | RequestError::Stream { options, .. }
            | RequestError::TooManyRedirects { options, .. } => Some(options),
            _ => None,
        }
    }

    /// The response attached to an HTTP status error.
    pub fn response(&self) -> Option<&ResponseRecord> {
        match self {
            RequestError::HttpStatus { record } => Some(record),
            _ => None,
        }
    }

    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        RequestError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_error_kind_as_str() {
        assert_eq!(ErrorKind::Configuration.as_str(), "Configuration error");
        assert_eq!(ErrorKind::Transport.as_str(), "Transport error");
        assert_eq!(ErrorKind::HttpStatus.to_string(), "HTTP status error");
    }

    #[test]
    fn test_error_kind_strings_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for kind in ErrorKind::iter() {
            assert!(seen.insert(kind.as_str()), "duplicate label for {kind:?}");
        }
    }

    #[test]
    fn test_configuration_error_is_not_retriable() {
        let err = RequestError::config("Conflicting parameters");
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(!err.is_retriable());
        assert!(err.request_options().is_none());
        assert_eq!(
            err.to_string(),
            "Configuration error: Conflicting parameters"
        );
    }

    #[test]
    fn test_decode_error_keeps_raw_bytes() {
        let err = RequestError::Decode {
            status_code: 200,
            message: "expected value".into(),
            text: Some("{oops".into()),
            buffer: Bytes::from_static(b"{oops"),
        };
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(!err.is_retriable());
        match err {
            RequestError::Decode { buffer, text, .. } => {
                assert_eq!(&buffer[..], b"{oops");
                assert_eq!(text.as_deref(), Some("{oops"));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_io_error_display_includes_path() {
        let err = RequestError::io(
            "/tmp/missing.bin",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("/tmp/missing.bin"));
    }
}
