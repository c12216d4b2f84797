//! Declarative request description.
//!
//! A [`RequestSpec`] is the caller-facing description of one HTTP call (or of a
//! fan-out over several URLs). It is validated once into a [`plan::RequestPlan`]
//! before any I/O happens; the submodules compose the protocol-level pieces:
//!
//! - [`query`]: merges path, existing query string and query sources
//! - [`cookies`]: merges cookie maps/strings with an existing `Cookie` header
//! - [`negotiate`]: turns `data`/`attachments` into a payload plus headers
//! - [`builder`]: resolves the per-attempt protocol options and opens the request

pub(crate) mod builder;
pub mod cookies;
pub mod negotiate;
pub(crate) mod plan;
pub mod query;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};

pub use builder::{BasicCredentials, ResolvedRequestOptions};
pub use cookies::compose_cookie_header;
pub use negotiate::{negotiate, ContentKind, Negotiated, Payload};
pub use query::compose_path;

use crate::error_handling::RequestError;

/// One URL or a list of URLs (fan-out).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Single(String),
    Many(Vec<String>),
}

impl From<&str> for Target {
    fn from(url: &str) -> Self {
        Target::Single(url.to_string())
    }
}

impl From<String> for Target {
    fn from(url: String) -> Self {
        Target::Single(url)
    }
}

impl From<Vec<String>> for Target {
    fn from(urls: Vec<String>) -> Self {
        Target::Many(urls)
    }
}

impl From<Vec<&str>> for Target {
    fn from(urls: Vec<&str>) -> Self {
        Target::Many(urls.into_iter().map(str::to_string).collect())
    }
}

/// A query source: either an encoded string (`a=1&b=2`) or a key-value map.
///
/// Map values may be nested objects or arrays; they are flattened with bracket
/// notation (`a[b]=c`, `a[0]=x`).
#[derive(Debug, Clone, PartialEq)]
pub enum QuerySource {
    Encoded(String),
    Map(serde_json::Map<String, Value>),
}

impl From<&str> for QuerySource {
    fn from(query: &str) -> Self {
        QuerySource::Encoded(query.to_string())
    }
}

impl From<serde_json::Map<String, Value>> for QuerySource {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        QuerySource::Map(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QuerySource {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        QuerySource::Map(
            iter.into_iter()
                .map(|(k, v)| (k.into(), Value::String(v.into())))
                .collect(),
        )
    }
}

/// Cookies to send: a name/value list or a pre-encoded `a=1; b=2` string.
///
/// A `None` value drops the cookie instead of serializing it as empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cookies {
    Map(Vec<(String, Option<String>)>),
    Header(String),
}

impl From<&str> for Cookies {
    fn from(header: &str) -> Self {
        Cookies::Header(header.to_string())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Cookies {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Cookies::Map(
            iter.into_iter()
                .map(|(k, v)| (k.into(), Some(v.into())))
                .collect(),
        )
    }
}

/// Request authentication.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// Sent as a transport-level credential (`Authorization: Basic ...`).
    Basic { username: String, password: String },
    /// Sent as `Authorization: Bearer <token>` unless an Authorization header is already set.
    Bearer { token: String },
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Auth::Bearer { .. } => f.debug_struct("Bearer").field("token", &"<redacted>").finish(),
        }
    }
}

/// Redirect policy: a hop count or an on/off switch.
///
/// `Enabled(true)` follows up to [`MAX_REDIRECT_HOPS`](crate::config::MAX_REDIRECT_HOPS);
/// `Enabled(false)`, `Count(0)` and negative counts never follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirects {
    Enabled(bool),
    Count(i64),
}

impl Default for Redirects {
    fn default() -> Self {
        Redirects::Enabled(true)
    }
}

impl From<bool> for Redirects {
    fn from(enabled: bool) -> Self {
        Redirects::Enabled(enabled)
    }
}

impl From<i64> for Redirects {
    fn from(count: i64) -> Self {
        Redirects::Count(count)
    }
}

impl From<u32> for Redirects {
    fn from(count: u32) -> Self {
        Redirects::Count(i64::from(count))
    }
}

/// A live byte source supplied by the caller.
///
/// It can be read once; a second attempt to read it is a configuration error.
pub struct ByteReader {
    inner: Option<Box<dyn AsyncRead + Send + Sync + Unpin>>,
}

impl ByteReader {
    pub fn new(reader: impl AsyncRead + Send + Sync + Unpin + 'static) -> Self {
        Self {
            inner: Some(Box::new(reader)),
        }
    }

    pub(crate) fn take(&mut self) -> Result<Box<dyn AsyncRead + Send + Sync + Unpin>, RequestError> {
        self.inner
            .take()
            .ok_or_else(|| RequestError::config("Input stream was already consumed"))
    }
}

impl fmt::Debug for ByteReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.inner.is_some() { "ready" } else { "consumed" };
        f.debug_tuple("ByteReader").field(&state).finish()
    }
}

/// A destination for a piped response body.
pub struct OutputStream(pub(crate) Box<dyn AsyncWrite + Send + Sync + Unpin>);

impl OutputStream {
    pub fn new(writer: impl AsyncWrite + Send + Sync + Unpin + 'static) -> Self {
        Self(Box::new(writer))
    }
}

impl fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OutputStream")
    }
}

/// Request body streamed from a file, a buffer or a live reader.
#[derive(Debug)]
pub enum InputSource {
    Path(PathBuf),
    Bytes(Bytes),
    Reader(ByteReader),
}

impl InputSource {
    /// Whether the source can be sent more than once (retries, 307/308).
    pub fn is_replayable(&self) -> bool {
        !matches!(self, InputSource::Reader(_))
    }

    fn try_clone(&self) -> Option<Self> {
        match self {
            InputSource::Path(path) => Some(InputSource::Path(path.clone())),
            InputSource::Bytes(bytes) => Some(InputSource::Bytes(bytes.clone())),
            InputSource::Reader(_) => None,
        }
    }
}

/// Where an attachment's bytes come from.
#[derive(Debug)]
pub enum AttachmentSource {
    /// Read lazily from disk; filename, content type and length are inferred.
    Path(PathBuf),
    Bytes(Bytes),
    Reader(ByteReader),
}

/// A file part of a multipart body.
#[derive(Debug)]
pub struct Attachment {
    pub source: AttachmentSource,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub known_length: Option<u64>,
}

impl Attachment {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self {
            source: AttachmentSource::Path(path.into()),
            filename: None,
            content_type: None,
            known_length: None,
        }
    }

    pub fn bytes(bytes: impl Into<Bytes>, filename: impl Into<String>) -> Self {
        Self {
            source: AttachmentSource::Bytes(bytes.into()),
            filename: Some(filename.into()),
            content_type: None,
            known_length: None,
        }
    }

    pub fn reader(reader: ByteReader, filename: impl Into<String>) -> Self {
        Self {
            source: AttachmentSource::Reader(reader),
            filename: Some(filename.into()),
            content_type: None,
            known_length: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn is_replayable(&self) -> bool {
        !matches!(self.source, AttachmentSource::Reader(_))
    }

    fn try_clone(&self) -> Option<Self> {
        let source = match &self.source {
            AttachmentSource::Path(path) => AttachmentSource::Path(path.clone()),
            AttachmentSource::Bytes(bytes) => AttachmentSource::Bytes(bytes.clone()),
            AttachmentSource::Reader(_) => return None,
        };
        Some(Self {
            source,
            filename: self.filename.clone(),
            content_type: self.content_type.clone(),
            known_length: self.known_length,
        })
    }
}

/// TLS parameters, applied only when the target protocol is `https`.
///
/// All certificate material is PEM except `pfx` (PKCS#12 DER).
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TlsOptions {
    pub pfx: Option<Vec<u8>>,
    pub key: Option<Vec<u8>>,
    pub passphrase: Option<String>,
    pub cert: Option<Vec<u8>>,
    pub ca: Vec<Vec<u8>>,
    pub ciphers: Option<String>,
    pub reject_unauthorized: Option<bool>,
    pub secure_protocol: Option<String>,
    pub servername: Option<String>,
}

impl TlsOptions {
    pub fn is_empty(&self) -> bool {
        *self == TlsOptions::default()
    }
}

impl fmt::Debug for TlsOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsOptions")
            .field("pfx", &self.pfx.as_ref().map(|_| "<pkcs12>"))
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("cert", &self.cert.as_ref().map(Vec::len))
            .field("ca", &self.ca.len())
            .field("ciphers", &self.ciphers)
            .field("reject_unauthorized", &self.reject_unauthorized)
            .field("secure_protocol", &self.secure_protocol)
            .field("servername", &self.servername)
            .finish()
    }
}

/// Caller-supplied configuration for one HTTP call.
///
/// Construct with struct-update syntax:
///
/// ```no_run
/// use request_util::{RequestSpec, Target};
///
/// let spec = RequestSpec {
///     url: Some(Target::from("https://example.com/get")),
///     method: Some("post".into()),
///     data: Some(serde_json::json!({ "a": "abc" })),
///     retries: 2,
///     ..Default::default()
/// };
/// ```
///
/// `data`/`attachments` and `input` are mutually exclusive, as are `output` and
/// `save_path`/`cache_path`. Conflicts are reported as configuration errors
/// before any I/O.
#[derive(Debug)]
pub struct RequestSpec {
    /// Target URL(s). When absent, the target is built from `protocol`/`host`/`port`/`path`.
    pub url: Option<Target>,
    pub protocol: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: Option<String>,

    /// HTTP method, case-insensitive. Defaults to `get`.
    pub method: Option<String>,
    /// Base headers, in order. Later duplicates override earlier ones.
    pub headers: Vec<(String, String)>,
    pub query: Option<QuerySource>,

    /// Content type hint: a full type (`application/json`) or an extension (`json`).
    pub content_type: Option<String>,
    /// Explicit Content-Length for `input` bodies.
    pub content_length: Option<u64>,
    pub data: Option<Value>,
    pub attachments: Vec<(String, Attachment)>,
    pub input: Option<InputSource>,

    pub cookies: Option<Cookies>,
    pub auth: Option<Auth>,
    pub redirects: Redirects,

    /// Force full materialization of non-textual bodies.
    pub buffer: bool,
    pub output: Option<OutputStream>,
    /// File or directory to write the body to.
    pub save_path: Option<PathBuf>,
    pub cache_path: Option<PathBuf>,
    pub max_cache_time: Option<Duration>,

    /// Additional attempts after the first failure.
    pub retries: u32,
    /// Raise an HTTP status error for status >= 400. Defaults to `true`.
    pub throw_http_error: bool,
    pub tls: TlsOptions,
    pub timeout: Option<Duration>,
    /// Maximum in-flight requests when `url` is a list.
    pub concurrency: Option<usize>,
}

impl Default for RequestSpec {
    fn default() -> Self {
        Self {
            url: None,
            protocol: None,
            host: None,
            port: None,
            path: None,
            method: None,
            headers: Vec::new(),
            query: None,
            content_type: None,
            content_length: None,
            data: None,
            attachments: Vec::new(),
            input: None,
            cookies: None,
            auth: None,
            redirects: Redirects::default(),
            buffer: false,
            output: None,
            save_path: None,
            cache_path: None,
            max_cache_time: None,
            retries: 0,
            throw_http_error: true,
            tls: TlsOptions::default(),
            timeout: None,
            concurrency: None,
        }
    }
}

impl From<&str> for RequestSpec {
    fn from(url: &str) -> Self {
        RequestSpec {
            url: Some(Target::from(url)),
            ..Default::default()
        }
    }
}

impl From<String> for RequestSpec {
    fn from(url: String) -> Self {
        RequestSpec {
            url: Some(Target::from(url)),
            ..Default::default()
        }
    }
}

impl From<Vec<String>> for RequestSpec {
    fn from(urls: Vec<String>) -> Self {
        RequestSpec {
            url: Some(Target::Many(urls)),
            ..Default::default()
        }
    }
}

impl RequestSpec {
    /// Copies this spec for one URL of a fan-out.
    ///
    /// Live readers and output streams cannot be shared between requests, so a
    /// spec holding one cannot be forked.
    pub(crate) fn fork(&self, url: &str) -> Result<RequestSpec, RequestError> {
        if self.output.is_some() {
            return Err(RequestError::config(
                "Conflicting parameters: outputStream cannot be shared by multiple URLs",
            ));
        }
        let input = match &self.input {
            Some(source) => Some(source.try_clone().ok_or_else(|| {
                RequestError::config(
                    "Conflicting parameters: a live inputStream cannot be shared by multiple URLs",
                )
            })?),
            None => None,
        };
        let attachments = self
            .attachments
            .iter()
            .map(|(name, attachment)| {
                attachment
                    .try_clone()
                    .map(|a| (name.clone(), a))
                    .ok_or_else(|| {
                        RequestError::config(format!(
                            "Conflicting parameters: attachment '{name}' is a live stream and cannot be shared by multiple URLs"
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RequestSpec {
            url: Some(Target::Single(url.to_string())),
            protocol: self.protocol.clone(),
            host: self.host.clone(),
            port: self.port,
            path: self.path.clone(),
            method: self.method.clone(),
            headers: self.headers.clone(),
            query: self.query.clone(),
            content_type: self.content_type.clone(),
            content_length: self.content_length,
            data: self.data.clone(),
            attachments,
            input,
            cookies: self.cookies.clone(),
            auth: self.auth.clone(),
            redirects: self.redirects,
            buffer: self.buffer,
            output: None,
            save_path: self.save_path.clone(),
            cache_path: self.cache_path.clone(),
            max_cache_time: self.max_cache_time,
            retries: self.retries,
            throw_http_error: self.throw_http_error,
            tls: self.tls.clone(),
            timeout: self.timeout,
            concurrency: None,
        })
    }
}
