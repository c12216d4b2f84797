//! Cookie header composition.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use super::Cookies;
use crate::request::query::ParamList;

/// Characters escaped in cookie values (the `encodeURIComponent` set).
const COOKIE_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Parses a `Cookie` header (`a=1; b=2`) into ordered name/value pairs.
///
/// Segments without `=` are kept with an empty value; values are
/// percent-decoded when they decode to valid UTF-8.
pub fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.split_once('=') {
            Some((name, value)) => (name.trim().to_string(), decode_value(value.trim())),
            None => (segment.to_string(), String::new()),
        })
        .collect()
}

fn decode_value(value: &str) -> String {
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    percent_decode_str(value)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

fn encode_value(value: &str) -> String {
    utf8_percent_encode(value, COOKIE_VALUE).to_string()
}

fn cookie_pairs(cookies: &Cookies) -> Vec<(String, String)> {
    match cookies {
        Cookies::Map(entries) => entries
            .iter()
            .filter_map(|(name, value)| value.as_ref().map(|v| (name.clone(), v.clone())))
            .collect(),
        Cookies::Header(header) => parse_cookie_header(header),
    }
}

/// Serializes name/value pairs as a `Cookie` header value.
pub fn serialize_cookies<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    pairs
        .into_iter()
        .map(|(name, value)| format!("{name}={}", encode_value(value)))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Composes the outgoing `Cookie` header.
///
/// With an existing header, both sides are parsed and shallow-merged with the
/// incoming cookies taking precedence. Without one, the incoming set is
/// serialized directly (a pre-encoded string is passed through untouched).
/// Map entries with a `None` value are dropped.
pub fn compose_cookie_header(cookies: &Cookies, existing: Option<&str>) -> String {
    match existing.filter(|h| !h.trim().is_empty()) {
        Some(existing) => {
            let mut merged = ParamList::new();
            merged.extend(parse_cookie_header(existing));
            merged.extend(cookie_pairs(cookies));
            serialize_cookies(merged.iter())
        }
        None => match cookies {
            Cookies::Header(header) => header.clone(),
            Cookies::Map(_) => {
                let pairs = cookie_pairs(cookies);
                serialize_cookies(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            }
        },
    }
}
