//! Content-Type parsing and decoding strategy selection.

use std::fmt;

use encoding_rs::{Encoding, UTF_8};

/// How a buffered body is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategy {
    /// Charset-decode, then parse as JSON. Malformed input is an error.
    Json,
    /// Charset-decode into a string (lossy).
    Text,
    /// Charset-decode, then parse as `application/x-www-form-urlencoded`.
    Form,
    /// Keep the raw bytes.
    Binary,
}

/// `(type, subtype)` to strategy. `*` matches any subtype.
const STRATEGIES: &[(&str, &str, DecodeStrategy)] = &[
    ("application", "json", DecodeStrategy::Json),
    ("application", "x-www-form-urlencoded", DecodeStrategy::Form),
    ("text", "*", DecodeStrategy::Text),
];

/// A parsed `type/subtype; key=value` media type. Names are lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    pub type_: String,
    pub subtype: String,
    pub params: Vec<(String, String)>,
}

impl MediaType {
    /// Parses a Content-Type header value. Returns `None` when there is no
    /// `type/subtype` pair.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut segments = raw.split(';');
        let essence = segments.next()?.trim();
        let (type_, subtype) = essence.split_once('/')?;
        let (type_, subtype) = (type_.trim(), subtype.trim());
        if type_.is_empty() || subtype.is_empty() {
            return None;
        }

        let params = segments
            .filter_map(|param| {
                let (key, value) = param.split_once('=')?;
                let value = value.trim().trim_matches('"');
                Some((key.trim().to_ascii_lowercase(), value.to_string()))
            })
            .collect();

        Some(Self {
            type_: type_.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            params,
        })
    }

    /// `type/subtype` without parameters.
    pub fn essence(&self) -> String {
        format!("{}/{}", self.type_, self.subtype)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn charset(&self) -> Option<&str> {
        self.param("charset")
    }

    /// Encoding named by the charset parameter; UTF-8 when absent or unknown.
    pub fn encoding(&self) -> &'static Encoding {
        self.charset()
            .and_then(|label| Encoding::for_label(label.as_bytes()))
            .unwrap_or(UTF_8)
    }

    pub fn strategy(&self) -> DecodeStrategy {
        STRATEGIES
            .iter()
            .find(|(type_, subtype, _)| {
                *type_ == self.type_ && (*subtype == "*" || *subtype == self.subtype)
            })
            .map_or(DecodeStrategy::Binary, |(_, _, strategy)| *strategy)
    }

    /// Whether the body is buffered and decoded even in streaming mode.
    pub fn is_textual(&self) -> bool {
        self.strategy() != DecodeStrategy::Binary
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_, self.subtype)?;
        for (key, value) in &self.params {
            write!(f, "; {key}={value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_parameters() {
        let media = MediaType::parse("Application/JSON; charset=\"UTF-8\"").unwrap();
        assert_eq!(media.essence(), "application/json");
        assert_eq!(media.charset(), Some("UTF-8"));
        assert_eq!(media.strategy(), DecodeStrategy::Json);
        assert_eq!(media.to_string(), "application/json; charset=UTF-8");
    }

    #[test]
    fn test_strategy_table() {
        let strategy = |raw: &str| MediaType::parse(raw).unwrap().strategy();
        assert_eq!(strategy("text/html"), DecodeStrategy::Text);
        assert_eq!(strategy("text/plain; charset=latin1"), DecodeStrategy::Text);
        assert_eq!(
            strategy("application/x-www-form-urlencoded"),
            DecodeStrategy::Form
        );
        assert_eq!(strategy("application/octet-stream"), DecodeStrategy::Binary);
        assert_eq!(strategy("image/png"), DecodeStrategy::Binary);
        // Substring matches do not count.
        assert_eq!(strategy("application/jsonp"), DecodeStrategy::Binary);
    }

    #[test]
    fn test_rejects_values_without_subtype() {
        assert!(MediaType::parse("json").is_none());
        assert!(MediaType::parse("text/").is_none());
        assert!(MediaType::parse("").is_none());
    }

    #[test]
    fn test_encoding_lookup() {
        let latin = MediaType::parse("text/plain; charset=iso-8859-1").unwrap();
        assert_eq!(latin.encoding().name(), "windows-1252");
        let unknown = MediaType::parse("text/plain; charset=klingon").unwrap();
        assert_eq!(unknown.encoding(), UTF_8);
    }
}
