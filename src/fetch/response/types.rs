//! Response data structures.

use std::fmt;

use bytes::Bytes;
use futures::Stream;
use reqwest::header::HeaderMap;
use serde_json::Value;

use super::content_type::MediaType;

/// An unread response body, handed back when a non-textual body was not
/// buffered.
pub struct BodyStream {
    response: reqwest::Response,
}

impl BodyStream {
    pub(crate) fn new(response: reqwest::Response) -> Self {
        Self { response }
    }

    /// Next chunk, or `None` at the end of the body.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, reqwest::Error> {
        self.response.chunk().await
    }

    /// Reads the rest of the body.
    pub async fn bytes(self) -> Result<Bytes, reqwest::Error> {
        self.response.bytes().await
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, reqwest::Error>> {
        self.response.bytes_stream()
    }
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyStream")
            .field("content_length", &self.response.content_length())
            .finish()
    }
}

/// Decoded response body. The variant follows the response Content-Type.
#[derive(Debug)]
pub enum ResponseBody {
    /// No body, or a body delivered elsewhere (piped to an output stream).
    Empty,
    Json(Value),
    Text(String),
    Form(Vec<(String, String)>),
    Bytes(Bytes),
    Stream(BodyStream),
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ResponseBody::Empty)
    }
}

/// Normalized result of a completed request.
#[derive(Debug)]
pub struct ResponseRecord {
    /// URL of the request that produced this response.
    pub url: String,
    pub status_code: u16,
    pub status_message: String,
    /// Case-insensitive header map (multi-valued headers preserved).
    pub headers: HeaderMap,
    /// Header name/value pairs, one per value. Values sharing a name are
    /// adjacent; order across different names is not preserved.
    pub raw_headers: Vec<(String, String)>,
    pub body: ResponseBody,
    /// Decoded text, for textual bodies that were buffered.
    pub text: Option<String>,
    /// Raw bytes, for buffered bodies.
    pub buffer: Option<Bytes>,
    /// Intermediate 30x responses, oldest first. Only set on the terminal record.
    pub redirects: Vec<ResponseRecord>,
    pub content_type: Option<MediaType>,
    /// Served from the on-disk cache.
    pub cached: bool,
}

impl ResponseRecord {
    /// First value of a header, when it is valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Whether this is a 301/302/303/307/308 response.
    pub fn is_redirect(&self) -> bool {
        matches!(self.status_code, 301 | 302 | 303 | 307 | 308)
    }
}
