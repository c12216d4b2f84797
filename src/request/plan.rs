//! Validation of a [`RequestSpec`] into a tagged [`RequestPlan`].
//!
//! Every conflict between options is rejected here, before any I/O. The plan
//! separates what is sent (`BodyPlan`) from how the response is delivered
//! (`Delivery`), so later stages never re-inspect the loose option set.

use std::path::PathBuf;
use std::time::Duration;

use log::warn;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde_json::Value;

use super::negotiate::{negotiate, negotiate_input, resolve_mime_hint, ContentKind, Negotiated};
use super::{Attachment, Auth, Cookies, InputSource, OutputStream, QuerySource, Redirects, RequestSpec, Target, TlsOptions};
use crate::config::{ALLOWED_METHODS, DEFAULT_MAX_CACHE_TIME, DEFAULT_TIMEOUT_SECS, MAX_REDIRECT_HOPS};
use crate::error_handling::RequestError;
use crate::request::query::compose_path;

/// What is sent as the request body.
#[derive(Debug)]
pub(crate) enum BodyPlan {
    Empty,
    /// Encoded by the content negotiator.
    Form {
        content_type: Option<String>,
        data: Option<Value>,
        attachments: Vec<(String, Attachment)>,
    },
    /// Streamed from a file, buffer or reader.
    Input {
        source: InputSource,
        content_type: Option<String>,
        content_length: Option<u64>,
    },
}

impl BodyPlan {
    /// Whether the body can be produced again for a retry or a 307/308 hop.
    pub(crate) fn is_replayable(&self) -> bool {
        match self {
            BodyPlan::Empty => true,
            BodyPlan::Form { attachments, .. } => attachments.iter().all(|(_, a)| a.is_replayable()),
            BodyPlan::Input { source, .. } => source.is_replayable(),
        }
    }

    /// Produces the payload for one attempt.
    pub(crate) async fn negotiate(&mut self) -> Result<Negotiated, RequestError> {
        match self {
            BodyPlan::Empty => Ok(Negotiated::empty()),
            BodyPlan::Form {
                content_type,
                data,
                attachments,
            } => negotiate(content_type.as_deref(), data.as_ref(), attachments).await,
            BodyPlan::Input {
                source,
                content_type,
                content_length,
            } => negotiate_input(source, content_type.as_deref(), *content_length).await,
        }
    }
}

/// How the response body is handed back.
#[derive(Debug)]
pub(crate) enum Delivery {
    /// Buffer textual bodies, leave the rest as a stream.
    Auto,
    /// Buffer every body.
    Buffered,
    /// Pipe the raw body into the caller's writer.
    Pipe(OutputStream),
    /// Buffer, then write the body to a file or directory.
    Save(PathBuf),
}

impl Delivery {
    pub(crate) fn save_path(&self) -> Option<&PathBuf> {
        match self {
            Delivery::Save(path) => Some(path),
            _ => None,
        }
    }
}

/// Number of redirect hops a request may follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RedirectBudget {
    pub(crate) hops: usize,
    /// Exceeding `hops` is an error rather than a terminal 30x.
    pub(crate) capped: bool,
}

impl From<Redirects> for RedirectBudget {
    fn from(redirects: Redirects) -> Self {
        let unlimited = RedirectBudget {
            hops: MAX_REDIRECT_HOPS,
            capped: true,
        };
        match redirects {
            Redirects::Enabled(true) => unlimited,
            Redirects::Enabled(false) => RedirectBudget { hops: 0, capped: false },
            Redirects::Count(n) if n <= 0 => RedirectBudget { hops: 0, capped: false },
            Redirects::Count(n) => match usize::try_from(n) {
                Ok(n) if n <= MAX_REDIRECT_HOPS => RedirectBudget { hops: n, capped: false },
                _ => unlimited,
            },
        }
    }
}

/// On-disk cache location and freshness window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CacheSettings {
    pub(crate) dir: PathBuf,
    pub(crate) max_age: Duration,
}

/// A validated request, ready to be attempted.
#[derive(Debug)]
pub(crate) struct RequestPlan {
    /// Target with the merged query applied.
    pub(crate) url: Url,
    pub(crate) method: Method,
    pub(crate) headers: HeaderMap,
    pub(crate) body: BodyPlan,
    pub(crate) cookies: Option<Cookies>,
    pub(crate) auth: Option<Auth>,
    pub(crate) redirects: RedirectBudget,
    pub(crate) delivery: Delivery,
    pub(crate) cache: Option<CacheSettings>,
    pub(crate) retries: u32,
    pub(crate) throw_http_error: bool,
    pub(crate) tls: TlsOptions,
    pub(crate) timeout: Duration,
}

impl RequestPlan {
    /// Validates a single-target spec.
    pub(crate) fn from_spec(spec: RequestSpec) -> Result<Self, RequestError> {
        let method = parse_method(spec.method.as_deref())?;
        let headers = parse_headers(&spec.headers)?;
        let url = resolve_target(&spec)?;
        let url = apply_query(url, spec.query.as_ref());

        let has_form = spec.data.is_some() || !spec.attachments.is_empty();
        let content_type = spec.content_type.clone().or_else(|| {
            headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        });

        let body = match (has_form, spec.input) {
            (true, Some(_)) => {
                return Err(RequestError::config(
                    "Conflicting parameters: data/attachments and inputStream",
                ))
            }
            (true, None) => {
                // Reject a malformed content type before anything is opened.
                ContentKind::resolve(content_type.as_deref(), !spec.attachments.is_empty())?;
                BodyPlan::Form {
                    content_type,
                    data: spec.data,
                    attachments: spec.attachments,
                }
            }
            (false, Some(source)) => BodyPlan::Input {
                source,
                content_type: content_type.as_deref().map(resolve_mime_hint).transpose()?,
                content_length: spec.content_length,
            },
            (false, None) => BodyPlan::Empty,
        };

        let cache = spec.cache_path.map(|dir| CacheSettings {
            dir,
            max_age: spec.max_cache_time.unwrap_or(DEFAULT_MAX_CACHE_TIME),
        });

        let delivery = match (spec.output, spec.save_path) {
            (Some(_), Some(_)) => {
                return Err(RequestError::config(
                    "Conflicting parameters: outputStream and savePath",
                ))
            }
            (Some(_), None) if cache.is_some() => {
                return Err(RequestError::config(
                    "Conflicting parameters: outputStream and cachePath",
                ))
            }
            (Some(output), None) => Delivery::Pipe(output),
            (None, Some(path)) => Delivery::Save(path),
            (None, None) if spec.buffer || cache.is_some() => Delivery::Buffered,
            (None, None) => Delivery::Auto,
        };

        let retries = if spec.retries == 0 {
            0
        } else if !body.is_replayable() {
            warn!(
                "Request body for {url} is a live stream and cannot be replayed; retries disabled"
            );
            0
        } else if matches!(delivery, Delivery::Pipe(_)) {
            // Bytes already written to the caller's stream cannot be taken back
            warn!("Response for {url} is piped to an output stream; retries disabled");
            0
        } else {
            spec.retries
        };

        Ok(RequestPlan {
            url,
            method,
            headers,
            body,
            cookies: spec.cookies,
            auth: spec.auth,
            redirects: spec.redirects.into(),
            delivery,
            cache,
            retries,
            throw_http_error: spec.throw_http_error,
            tls: spec.tls,
            timeout: spec.timeout.unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        })
    }
}

fn parse_method(method: Option<&str>) -> Result<Method, RequestError> {
    let method = method.unwrap_or("get").trim().to_ascii_lowercase();
    if !ALLOWED_METHODS.contains(&method.as_str()) {
        return Err(RequestError::config(format!("Invalid parameter: method '{method}'")));
    }
    Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| RequestError::config(format!("Invalid parameter: method '{method}'")))
}

fn parse_headers(headers: &[(String, String)]) -> Result<HeaderMap, RequestError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| RequestError::config(format!("Invalid header name: {name}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| RequestError::config(format!("Invalid value for header {name}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn resolve_target(spec: &RequestSpec) -> Result<Url, RequestError> {
    let raw = match &spec.url {
        Some(Target::Single(url)) => url.clone(),
        Some(Target::Many(_)) => {
            return Err(RequestError::config(
                "Invalid parameter: url list must be expanded before planning",
            ))
        }
        None => {
            let host = spec
                .host
                .as_deref()
                .filter(|h| !h.is_empty())
                .ok_or_else(|| RequestError::config("Invalid parameter: url or host is required"))?;
            let scheme = spec
                .protocol
                .as_deref()
                .unwrap_or("http")
                .trim_end_matches(':');
            let path = spec.path.as_deref().unwrap_or("/");
            let path = if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            };
            match spec.port {
                Some(port) => format!("{scheme}://{host}:{port}{path}"),
                None => format!("{scheme}://{host}{path}"),
            }
        }
    };

    let url = Url::parse(&raw)
        .map_err(|e| RequestError::config(format!("Invalid parameter: url '{raw}' ({e})")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(RequestError::config(format!(
            "Invalid parameter: unsupported protocol '{other}:'"
        ))),
    }
}

fn apply_query(mut url: Url, query: Option<&QuerySource>) -> Url {
    let sources: Vec<QuerySource> = query.into_iter().cloned().collect();
    let composed = compose_path(url.path(), url.query(), &sources);
    match composed.split_once('?') {
        Some((_, query)) => url.set_query(Some(query)),
        None => url.set_query(None),
    }
    url
}
