//! URL/query composition.
//!
//! Merges the query already present on a path with any number of extra query
//! sources. Later sources override earlier ones key by key; the first position
//! of a key is kept so the output order is stable.

use serde_json::Value;
use url::form_urlencoded;

use super::QuerySource;

/// Ordered key/value list where inserting an existing key replaces its value in place.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParamList {
    pairs: Vec<(String, String)>,
}

impl ParamList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, value: String) {
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.pairs.push((key, value)),
        }
    }

    pub fn extend(&mut self, pairs: impl IntoIterator<Item = (String, String)>) {
        for (key, value) in pairs {
            self.insert(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn into_pairs(self) -> Vec<(String, String)> {
        self.pairs
    }

    /// Serializes as `application/x-www-form-urlencoded`.
    pub fn encode(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.iter())
            .finish()
    }
}

/// Parses an encoded query string. A leading `?` is ignored.
pub fn parse_query(encoded: &str) -> Vec<(String, String)> {
    let encoded = encoded.strip_prefix('?').unwrap_or(encoded);
    form_urlencoded::parse(encoded.as_bytes())
        .into_owned()
        .collect()
}

/// Flattens a JSON value into `key=value` pairs using bracket notation for
/// nested objects and arrays. `null` becomes an empty value.
pub fn flatten_value(key: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (child, nested) in map {
                flatten_value(&format!("{key}[{child}]"), nested, out);
            }
        }
        Value::Array(items) => {
            for (index, nested) in items.iter().enumerate() {
                flatten_value(&format!("{key}[{index}]"), nested, out);
            }
        }
        Value::Null => out.push((key.to_string(), String::new())),
        Value::String(s) => out.push((key.to_string(), s.clone())),
        other => out.push((key.to_string(), other.to_string())),
    }
}

/// Flattens a JSON object into ordered pairs.
pub fn flatten_map(map: &serde_json::Map<String, Value>) -> Vec<(String, String)> {
    let mut out = Vec::with_capacity(map.len());
    for (key, value) in map {
        flatten_value(key, value, &mut out);
    }
    out
}

fn source_pairs(source: &QuerySource) -> Vec<(String, String)> {
    match source {
        QuerySource::Encoded(encoded) => parse_query(encoded),
        QuerySource::Map(map) => flatten_map(map),
    }
}

/// Merges every query source into one parameter list.
///
/// Precedence, lowest first: the query embedded in `path`, `existing`, then
/// `sources` left to right.
pub fn merge_query(path: &str, existing: Option<&str>, sources: &[QuerySource]) -> ParamList {
    let mut merged = ParamList::new();
    if let Some((_, embedded)) = path.split_once('?') {
        merged.extend(parse_query(embedded));
    }
    if let Some(existing) = existing {
        merged.extend(parse_query(existing));
    }
    for source in sources {
        merged.extend(source_pairs(source));
    }
    merged
}

/// Composes `path` with its merged query.
///
/// Returns `path?query`, or the bare path when the merged set is empty.
pub fn compose_path(path: &str, existing: Option<&str>, sources: &[QuerySource]) -> String {
    let bare = path.split_once('?').map_or(path, |(bare, _)| bare);
    let merged = merge_query(path, existing, sources);
    if merged.is_empty() {
        bare.to_string()
    } else {
        format!("{bare}?{}", merged.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> QuerySource {
        match value {
            Value::Object(map) => QuerySource::Map(map),
            _ => panic!("test helper expects an object"),
        }
    }

    #[test]
    fn test_compose_path_merges_all_sources() {
        let path = compose_path(
            "/get?a=abc&b=def",
            None,
            &[map(json!({"c": "ghi", "d": "jkl"}))],
        );
        assert_eq!(path, "/get?a=abc&b=def&c=ghi&d=jkl");
    }

    #[test]
    fn test_later_sources_override_earlier_keys() {
        let path = compose_path(
            "/get?a=1&b=2",
            Some("b=3"),
            &[QuerySource::from("a=4"), map(json!({"b": "5"}))],
        );
        assert_eq!(path, "/get?a=4&b=5");
    }

    #[test]
    fn test_empty_query_omits_question_mark() {
        assert_eq!(compose_path("/get", None, &[]), "/get");
        assert_eq!(compose_path("/get?", Some(""), &[QuerySource::from("")]), "/get");
    }

    #[test]
    fn test_existing_query_string_is_merged() {
        assert_eq!(compose_path("/p", Some("?x=1"), &[]), "/p?x=1");
    }

    #[test]
    fn test_values_are_percent_encoded() {
        let path = compose_path("/search", None, &[map(json!({"q": "a b&c"}))]);
        assert_eq!(path, "/search?q=a+b%26c");
        let parsed = parse_query(path.split_once('?').unwrap().1);
        assert_eq!(parsed, vec![("q".to_string(), "a b&c".to_string())]);
    }

    #[test]
    fn test_nested_values_use_bracket_notation() {
        let pairs = flatten_map(json!({"a": {"b": "c"}, "list": [1, true], "n": null})
            .as_object()
            .unwrap());
        assert_eq!(
            pairs,
            vec![
                ("a[b]".to_string(), "c".to_string()),
                ("list[0]".to_string(), "1".to_string()),
                ("list[1]".to_string(), "true".to_string()),
                ("n".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_param_list_replaces_in_place() {
        let mut params = ParamList::new();
        params.insert("a".into(), "1".into());
        params.insert("b".into(), "2".into());
        params.insert("a".into(), "3".into());
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("a"), Some("3"));
        assert_eq!(params.encode(), "a=3&b=2");
    }
}
