//! HTTP redirect chain resolution.
//!
//! Redirects are followed manually so every intermediate response is recorded.
//! The loop is iterative and bounded by the request's redirect budget.

use log::{debug, warn};
use reqwest::header::{HeaderMap, LOCATION};
use reqwest::{Method, Response, StatusCode};

use crate::config::{LOG_TARGET_ATTEMPT, LOG_TARGET_REDIRECT};
use crate::error_handling::RequestError;
use crate::fetch::response::materialize::materialize_hop;
use crate::fetch::response::ResponseRecord;
use crate::initialization::Clients;
use crate::request::builder::AttemptTarget;
use crate::request::plan::RequestPlan;
use crate::request::{Negotiated, ResolvedRequestOptions};

/// Whether the status code asks the client to follow `Location`.
pub(crate) fn is_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

/// Computes the next attempt for a redirect response.
///
/// 301/302/303 demote the method to GET (HEAD stays HEAD) and drop the body;
/// 307/308 keep both, which requires a replayable body. A hop to another host
/// stops forwarding credentials. Returns `None` when the response cannot be
/// followed and must be treated as terminal.
pub(crate) fn next_target(
    current: &AttemptTarget,
    status: StatusCode,
    headers: &HeaderMap,
    body_replayable: bool,
) -> Option<AttemptTarget> {
    let Some(location) = headers.get(LOCATION) else {
        warn!(
            target: LOG_TARGET_REDIRECT,
            "Redirect status {} for {} but no Location header",
            status.as_u16(),
            current.url
        );
        return None;
    };
    let location = location.to_str().unwrap_or_default();
    let url = match current.url.join(location) {
        Ok(url) => url,
        Err(e) => {
            warn!(target: LOG_TARGET_REDIRECT, "Unusable Location '{location}' from {}: {e}", current.url);
            return None;
        }
    };

    let (method, drop_body) = match status.as_u16() {
        301..=303 => {
            let method = if current.method == Method::HEAD {
                Method::HEAD
            } else {
                Method::GET
            };
            (method, true)
        }
        _ => {
            if !current.drop_body && !body_replayable {
                warn!(
                    target: LOG_TARGET_REDIRECT,
                    "Cannot replay request body to follow {} from {}",
                    status.as_u16(),
                    current.url
                );
                return None;
            }
            (current.method.clone(), current.drop_body)
        }
    };

    let strip_credentials = current.strip_credentials || url.host_str() != current.url.host_str();
    Some(AttemptTarget {
        method,
        url,
        drop_body,
        strip_credentials,
    })
}

/// The terminal response of a redirect chain.
pub(crate) struct Landed {
    pub(crate) response: Response,
    pub(crate) options: ResolvedRequestOptions,
    /// Followed hops, oldest first.
    pub(crate) chain: Vec<ResponseRecord>,
}

/// Sends the request and follows redirects within the plan's budget.
///
/// # Errors
///
/// Returns `TooManyRedirects` when an unlimited (capped) budget runs out, and
/// propagates transport and negotiation errors of any hop.
pub(crate) async fn follow_redirects(
    plan: &mut RequestPlan,
    clients: &Clients,
) -> Result<Landed, RequestError> {
    let mut target = AttemptTarget::initial(plan);
    let mut chain: Vec<ResponseRecord> = Vec::new();

    loop {
        let negotiated = if target.drop_body {
            Negotiated::empty()
        } else {
            plan.body.negotiate().await?
        };
        let options = ResolvedRequestOptions::resolve(plan, &target, &negotiated.headers)?;
        debug!(target: LOG_TARGET_ATTEMPT, "Sending {options}");

        let response = options
            .send(clients.for_url(&options.url), negotiated.payload, plan.timeout)
            .await?;

        if !is_redirect(response.status()) {
            return Ok(Landed {
                response,
                options,
                chain,
            });
        }

        if chain.len() >= plan.redirects.hops {
            if plan.redirects.capped {
                return Err(RequestError::TooManyRedirects {
                    options: Box::new(options),
                    hops: chain.len(),
                });
            }
            debug!(target: LOG_TARGET_REDIRECT, "Redirect budget of {} exhausted at {}", plan.redirects.hops, options.url);
            return Ok(Landed {
                response,
                options,
                chain,
            });
        }

        let Some(next) = next_target(
            &target,
            response.status(),
            response.headers(),
            plan.body.is_replayable(),
        ) else {
            return Ok(Landed {
                response,
                options,
                chain,
            });
        };

        debug!(
            target: LOG_TARGET_REDIRECT,
            "Following {} from {} to {}",
            response.status().as_u16(),
            target.url,
            next.url
        );
        chain.push(materialize_hop(response, &options).await?);
        target = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use reqwest::Url;

    fn target(method: Method, url: &str) -> AttemptTarget {
        AttemptTarget {
            method,
            url: Url::parse(url).unwrap(),
            drop_body: false,
            strip_credentials: false,
        }
    }

    fn location(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(LOCATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_is_redirect() {
        for code in [301, 302, 303, 307, 308] {
            assert!(is_redirect(StatusCode::from_u16(code).unwrap()));
        }
        for code in [200, 300, 304, 305, 404] {
            assert!(!is_redirect(StatusCode::from_u16(code).unwrap()));
        }
    }

    #[test]
    fn test_302_demotes_post_to_get() {
        let current = target(Method::POST, "http://example.com/form");
        let next = next_target(&current, StatusCode::FOUND, &location("/done"), true).unwrap();
        assert_eq!(next.method, Method::GET);
        assert!(next.drop_body);
        assert_eq!(next.url.as_str(), "http://example.com/done");
        assert!(!next.strip_credentials);
    }

    #[test]
    fn test_303_keeps_head() {
        let current = target(Method::HEAD, "http://example.com/a");
        let next = next_target(&current, StatusCode::SEE_OTHER, &location("b"), true).unwrap();
        assert_eq!(next.method, Method::HEAD);
        assert_eq!(next.url.as_str(), "http://example.com/b");
    }

    #[test]
    fn test_307_preserves_method_and_body() {
        let current = target(Method::PUT, "http://example.com/a");
        let next = next_target(
            &current,
            StatusCode::TEMPORARY_REDIRECT,
            &location("http://example.com/b"),
            true,
        )
        .unwrap();
        assert_eq!(next.method, Method::PUT);
        assert!(!next.drop_body);
    }

    #[test]
    fn test_308_with_unreplayable_body_is_terminal() {
        let current = target(Method::POST, "http://example.com/a");
        assert!(next_target(
            &current,
            StatusCode::PERMANENT_REDIRECT,
            &location("/b"),
            false
        )
        .is_none());
    }

    #[test]
    fn test_missing_location_is_terminal() {
        let current = target(Method::GET, "http://example.com/a");
        assert!(next_target(&current, StatusCode::MOVED_PERMANENTLY, &HeaderMap::new(), true).is_none());
    }

    #[test]
    fn test_cross_host_hop_strips_credentials() {
        let current = target(Method::GET, "http://example.com/a");
        let next = next_target(
            &current,
            StatusCode::FOUND,
            &location("https://other.example/login"),
            true,
        )
        .unwrap();
        assert!(next.strip_credentials);

        let back = next_target(&next, StatusCode::FOUND, &location("http://example.com/"), true)
            .unwrap();
        assert!(back.strip_credentials, "stripping is sticky for the rest of the chain");
    }
}
