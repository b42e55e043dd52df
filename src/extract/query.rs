//! Query string parsing for the extractor.
//!
//! A request's query is read two ways: as the flat list of decoded
//! `(key, value)` pairs, and as a nested view where bracketed keys such as
//! `switch_cls[id]=v` become `switch_cls => { id => v }`. Intermediaries
//! disagree on which of these a backend sees, so the extractor consults both
//! and falls back to scanning the raw text.

use percent_encoding::percent_decode_str;
use std::borrow::Cow;
use std::collections::BTreeMap;
use url::form_urlencoded;

/// Deepest bracket nesting honoured by the nested view. Segments past this
/// depth are ignored.
const MAX_NESTING: usize = 16;

/// A value in the nested view of a query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    Scalar(String),
    Map(BTreeMap<String, QueryValue>),
}

impl QueryValue {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            QueryValue::Scalar(s) => Some(s),
            QueryValue::Map(_) => None,
        }
    }

    /// Look up a key if this value is a map.
    pub fn get(&self, key: &str) -> Option<&QueryValue> {
        match self {
            QueryValue::Map(map) => map.get(key),
            QueryValue::Scalar(_) => None,
        }
    }
}

/// A query string decoded into flat and nested views.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedQuery {
    raw: String,
    pairs: Vec<(String, String)>,
    nested: BTreeMap<String, QueryValue>,
}

impl ParsedQuery {
    /// Parse a query string, with or without its leading `?`.
    ///
    /// Never fails: bytes that are not valid UTF-8 after decoding are
    /// replaced, and malformed bracket syntax falls back to a literal key.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.strip_prefix('?').unwrap_or(raw);
        let pairs: Vec<(String, String)> = form_urlencoded::parse(raw.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut nested = BTreeMap::new();
        for (key, value) in &pairs {
            if key.is_empty() {
                continue;
            }
            let (base, segments) = split_key(key);
            insert_nested(&mut nested, base, &segments, value.clone());
        }

        Self {
            raw: raw.to_string(),
            pairs,
            nested,
        }
    }

    /// The raw, undecoded query text without the leading `?`.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Top-level entry of the nested view.
    pub fn get(&self, name: &str) -> Option<&QueryValue> {
        self.nested.get(name)
    }

    /// First value whose decoded key is exactly `key`.
    pub fn first_flat(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Split `a[b][c]` into `("a", ["b", "c"])`.
///
/// A key whose first bracket is never closed, or that starts with `[`, is
/// returned whole with no segments. Text after the last well-formed segment
/// is dropped.
fn split_key(key: &str) -> (&str, Vec<&str>) {
    let Some(open) = key.find('[') else {
        return (key, Vec::new());
    };
    if open == 0 {
        return (key, Vec::new());
    }

    let base = &key[..open];
    let mut segments = Vec::new();
    let mut rest = &key[open..];

    while let Some(inner) = rest.strip_prefix('[') {
        let Some(close) = inner.find(']') else {
            break;
        };
        if segments.len() == MAX_NESTING {
            break;
        }
        segments.push(&inner[..close]);
        rest = &inner[close + 1..];
    }

    if segments.is_empty() {
        return (key, Vec::new());
    }
    (base, segments)
}

fn insert_nested(
    map: &mut BTreeMap<String, QueryValue>,
    name: &str,
    segments: &[&str],
    value: String,
) {
    let Some((first, rest)) = segments.split_first() else {
        map.insert(name.to_string(), QueryValue::Scalar(value));
        return;
    };

    let slot = map
        .entry(name.to_string())
        .or_insert_with(|| QueryValue::Map(BTreeMap::new()));
    if let QueryValue::Scalar(_) = slot {
        *slot = QueryValue::Map(BTreeMap::new());
    }
    if let QueryValue::Map(child) = slot {
        // `a[]=x` appends under the next numeric index.
        let key = if first.is_empty() {
            child.len().to_string()
        } else {
            first.to_string()
        };
        insert_nested(child, &key, rest, value);
    }
}

/// Find `key=VALUE` in a raw query string and return VALUE undecoded.
///
/// The key must start the query or follow `&` (a leading `?` is ignored).
/// Percent escapes in the candidate key are compared case-insensitively, so
/// `switch_cls%5bid%5d` matches `switch_cls%5Bid%5D`.
pub fn scan_raw_param<'a>(raw: &'a str, key: &str) -> Option<&'a str> {
    let raw = raw.strip_prefix('?').unwrap_or(raw);
    let wanted = uppercase_escapes(key);
    raw.split('&').find_map(|segment| {
        let (name, value) = segment.split_once('=')?;
        (uppercase_escapes(name) == wanted).then_some(value)
    })
}

/// Decode a raw query value the way form decoding does: `+` is a space,
/// then percent escapes are resolved. `None` when the result is not UTF-8.
pub fn decode_query_value(raw: &str) -> Option<String> {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .ok()
        .map(Cow::into_owned)
}

fn uppercase_escapes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_hex = 0;
    for c in text.chars() {
        if pending_hex > 0 {
            out.push(c.to_ascii_uppercase());
            pending_hex -= 1;
        } else {
            if c == '%' {
                pending_hex = 2;
            }
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_bracket_key() {
        let q = ParsedQuery::parse("?switch_cls[id]=ABC123&page=2");
        let id = q.get("switch_cls").and_then(|v| v.get("id"));
        assert_eq!(id.and_then(QueryValue::as_scalar), Some("ABC123"));
        assert_eq!(q.get("page").and_then(QueryValue::as_scalar), Some("2"));
    }

    #[test]
    fn test_encoded_brackets_decode_to_nested() {
        let q = ParsedQuery::parse("switch_cls%5Bid%5D=ABC123");
        assert_eq!(q.first_flat("switch_cls[id]"), Some("ABC123"));
        let id = q.get("switch_cls").and_then(|v| v.get("id"));
        assert_eq!(id.and_then(QueryValue::as_scalar), Some("ABC123"));
    }

    #[test]
    fn test_later_keys_override() {
        let q = ParsedQuery::parse("a=1&a[b]=2");
        assert_eq!(
            q.get("a").and_then(|v| v.get("b")).and_then(QueryValue::as_scalar),
            Some("2")
        );

        let q = ParsedQuery::parse("a[b]=2&a=1");
        assert_eq!(q.get("a").and_then(QueryValue::as_scalar), Some("1"));
    }

    #[test]
    fn test_unterminated_bracket_is_literal() {
        let q = ParsedQuery::parse("switch_cls[id=X");
        assert_eq!(q.get("switch_cls[id").and_then(QueryValue::as_scalar), Some("X"));
        assert!(q.get("switch_cls").is_none());
    }

    #[test]
    fn test_append_index() {
        let q = ParsedQuery::parse("tags[]=a&tags[]=b");
        let tags = q.get("tags").unwrap();
        assert_eq!(tags.get("0").and_then(QueryValue::as_scalar), Some("a"));
        assert_eq!(tags.get("1").and_then(QueryValue::as_scalar), Some("b"));
    }

    #[test]
    fn test_deep_nesting_is_capped() {
        let key: String = std::iter::once("a".to_string())
            .chain((0..20).map(|i| format!("[k{i}]")))
            .collect();
        let q = ParsedQuery::parse(&format!("{key}=v"));
        let mut value = q.get("a").unwrap();
        for i in 0..MAX_NESTING {
            value = value.get(&format!("k{i}")).unwrap();
        }
        assert_eq!(value.as_scalar(), Some("v"));
    }

    #[test]
    fn test_scan_raw_param() {
        assert_eq!(
            scan_raw_param("?x=1&switch_cls[id]=A%20B&y=2", "switch_cls[id]"),
            Some("A%20B")
        );
        assert_eq!(
            scan_raw_param("switch_cls%5bid%5d=Z", "switch_cls%5Bid%5D"),
            Some("Z")
        );
        assert_eq!(scan_raw_param("xswitch_cls[id]=A", "switch_cls[id]"), None);
        assert_eq!(scan_raw_param("", "switch_cls[id]"), None);
    }

    #[test]
    fn test_malformed_query_never_panics() {
        let q = ParsedQuery::parse("%zz=%&&=&[]=1&a[=2&%FF%FE=x");
        assert!(!q.is_empty());
        assert_eq!(q.raw(), "%zz=%&&=&[]=1&a[=2&%FF%FE=x");
    }
}
