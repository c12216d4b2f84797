//! Helpers for inspecting completed responses.
//!
//! - [`parse_response_cookies`]: cookies set by a response
//! - [`parse_redirect_url`]: query and fragment parameters of a redirect target
//! - [`parse_redirect_response`]: both, for a 30x response

use std::collections::BTreeMap;

use reqwest::header::{LOCATION, SET_COOKIE};

use crate::error_handling::RequestError;
use crate::fetch::ResponseRecord;
use crate::request::cookies::parse_cookie_header;
use crate::request::query::parse_query;

/// A redirect target split into its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectUrl {
    /// The URL as given in `Location`.
    pub url: String,
    pub query_parameters: BTreeMap<String, String>,
    /// Parameters encoded in the fragment (`#access_token=...&state=...`).
    pub hash_parameters: BTreeMap<String, String>,
}

/// A redirect response: its target plus the cookies it set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectInfo {
    pub target: RedirectUrl,
    pub cookies: BTreeMap<String, String>,
}

/// Merges every `Set-Cookie` header of `record` into a name/value map.
///
/// Only the leading `name=value` pair of each header is used; attributes such
/// as `Path` or `Expires` are ignored. Later headers win.
pub fn parse_response_cookies(record: &ResponseRecord) -> BTreeMap<String, String> {
    record
        .headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| {
            let first = value.split(';').next()?;
            parse_cookie_header(first).into_iter().next()
        })
        .collect()
}

/// Splits `url` into its query parameters and fragment parameters.
pub fn parse_redirect_url(url: &str) -> RedirectUrl {
    let (rest, fragment) = url.split_once('#').unwrap_or((url, ""));
    let query = rest.split_once('?').map_or("", |(_, query)| query);
    RedirectUrl {
        url: url.to_string(),
        query_parameters: parse_query(query).into_iter().collect(),
        hash_parameters: parse_query(fragment).into_iter().collect(),
    }
}

/// Parses a 301/302/303/307/308 record into its target and cookies.
///
/// # Errors
///
/// Returns a configuration error when the record is not a redirect or has no
/// `Location` header.
pub fn parse_redirect_response(record: &ResponseRecord) -> Result<RedirectInfo, RequestError> {
    if !record.is_redirect() {
        return Err(RequestError::config(format!(
            "Invalid state: status {} is not a redirect",
            record.status_code
        )));
    }
    let location = record
        .header(LOCATION.as_str())
        .ok_or_else(|| RequestError::config("Invalid state: redirect without Location header"))?;
    Ok(RedirectInfo {
        target: parse_redirect_url(location),
        cookies: parse_response_cookies(record),
    })
}
