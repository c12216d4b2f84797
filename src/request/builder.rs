//! Per-attempt protocol options and request dispatch.

use std::fmt;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE};
use reqwest::{Client, Method, Response, Url};

use super::cookies::compose_cookie_header;
use super::negotiate::Payload;
use super::plan::RequestPlan;
use super::Auth;
use crate::error_handling::RequestError;

/// Username/password sent as a transport-level credential.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Fully merged parameters of one attempt.
///
/// Built fresh for every attempt and redirect hop; never modified afterwards.
#[derive(Debug, Clone)]
pub struct ResolvedRequestOptions {
    pub method: Method,
    pub url: Url,
    /// Scheme with a trailing colon, e.g. `https:`.
    pub protocol: String,
    pub host: String,
    pub port: u16,
    /// Path with the query string.
    pub path: String,
    pub headers: HeaderMap,
    pub basic_auth: Option<BasicCredentials>,
}

impl fmt::Display for ResolvedRequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}//{}:{}{}",
            self.method, self.protocol, self.host, self.port, self.path
        )
    }
}

/// Where one attempt goes and what it carries over from the previous hop.
#[derive(Debug, Clone)]
pub(crate) struct AttemptTarget {
    pub(crate) method: Method,
    pub(crate) url: Url,
    /// Send no body (after a 301/302/303 demotion).
    pub(crate) drop_body: bool,
    /// Do not forward Authorization, Cookie or basic auth (after a cross-host hop).
    pub(crate) strip_credentials: bool,
}

impl AttemptTarget {
    pub(crate) fn initial(plan: &RequestPlan) -> Self {
        Self {
            method: plan.method.clone(),
            url: plan.url.clone(),
            drop_body: false,
            strip_credentials: false,
        }
    }
}

impl ResolvedRequestOptions {
    /// Merges headers for one attempt.
    ///
    /// Precedence, lowest first: base headers, negotiated content headers,
    /// the composed cookie header, `Authorization: Bearer` (only when no
    /// Authorization header is set), then basic auth.
    pub(crate) fn resolve(
        plan: &RequestPlan,
        target: &AttemptTarget,
        negotiated: &HeaderMap,
    ) -> Result<Self, RequestError> {
        let mut headers = plan.headers.clone();
        if target.drop_body {
            headers.remove(CONTENT_TYPE);
            headers.remove(CONTENT_LENGTH);
        }
        for (name, value) in negotiated {
            headers.insert(name.clone(), value.clone());
        }

        let mut basic_auth = None;
        if target.strip_credentials {
            headers.remove(AUTHORIZATION);
            headers.remove(COOKIE);
        } else {
            if let Some(cookies) = &plan.cookies {
                let existing = headers.get(COOKIE).and_then(|v| v.to_str().ok());
                let composed = compose_cookie_header(cookies, existing);
                if composed.is_empty() {
                    headers.remove(COOKIE);
                } else {
                    headers.insert(COOKIE, header_value(&composed)?);
                }
            }
            match &plan.auth {
                Some(Auth::Bearer { token }) if !headers.contains_key(AUTHORIZATION) => {
                    headers.insert(AUTHORIZATION, header_value(&format!("Bearer {token}"))?);
                }
                Some(Auth::Basic { username, password }) => {
                    headers.remove(AUTHORIZATION);
                    basic_auth = Some(BasicCredentials {
                        username: username.clone(),
                        password: password.clone(),
                    });
                }
                _ => {}
            }
        }

        let url = &target.url;
        let path = match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_string(),
        };

        Ok(Self {
            method: target.method.clone(),
            url: url.clone(),
            protocol: format!("{}:", url.scheme()),
            host: url.host_str().unwrap_or_default().to_string(),
            port: url.port_or_known_default().unwrap_or(80),
            path,
            headers,
            basic_auth,
        })
    }

    /// Whether TLS parameters apply to this attempt.
    pub fn is_secure(&self) -> bool {
        self.url.scheme() == "https"
    }

    /// Opens the request and waits for the response head.
    pub(crate) async fn send(
        &self,
        client: &Client,
        payload: Payload,
        timeout: Duration,
    ) -> Result<Response, RequestError> {
        let mut headers = self.headers.clone();
        let mut builder = client
            .request(self.method.clone(), self.url.clone())
            .timeout(timeout);

        if let Payload::Multipart(_) = &payload {
            // The transport writes its own multipart Content-Type and length.
            headers.remove(CONTENT_TYPE);
            headers.remove(CONTENT_LENGTH);
        }
        builder = builder.headers(headers);
        if let Some(credentials) = &self.basic_auth {
            builder = builder.basic_auth(&credentials.username, Some(&credentials.password));
        }
        builder = match payload {
            Payload::Empty => builder,
            Payload::Bytes(bytes) => builder.body(bytes),
            Payload::Stream(body) => builder.body(body),
            Payload::Multipart(form) => builder.multipart(form),
        };

        builder
            .send()
            .await
            .map_err(|source| RequestError::Transport {
                options: Box::new(self.clone()),
                source,
            })
    }
}

fn header_value(value: &str) -> Result<HeaderValue, RequestError> {
    HeaderValue::from_str(value)
        .map_err(|_| RequestError::config(format!("Invalid header value: {value}")))
}
