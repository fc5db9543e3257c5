//! Header normalization.
//!
//! Headers arrive either as the raw header block of an XHR (`getAllResponseHeaders()`) or as
//! an already-deduplicated fetch header collection. Both end up as:
//!
//! - a [`HeaderMapping`] keyed by lowercased name, where `set-cookie` keeps every value in order
//!   and any other repeated name is comma-joined;
//! - a [`RawHeaders`] list with the original casing and order, never merged.

use http::header::{HeaderName, CONTENT_TYPE};
use std::collections::BTreeMap;

/// The only header name that legally repeats and must not be comma-joined
pub const MULTI_VALUED_HEADER: &str = "set-cookie";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Single(String),
    Multi(Vec<String>),
}

impl HeaderValue {
    /// The value as one string. Multi values are joined with `", "`.
    pub fn joined(&self) -> String {
        match self {
            HeaderValue::Single(v) => v.clone(),
            HeaderValue::Multi(vs) => vs.join(", "),
        }
    }

    /// All values in order
    pub fn values(&self) -> Vec<&str> {
        match self {
            HeaderValue::Single(v) => vec![v.as_str()],
            HeaderValue::Multi(vs) => vs.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(v: &str) -> Self {
        HeaderValue::Single(v.to_string())
    }
}

/// Lowercased header name to value
pub type HeaderMapping = BTreeMap<String, HeaderValue>;

/// `(original name, value)` pairs in arrival order
pub type RawHeaders = Vec<(String, String)>;

/// Matches `name: value`. The name is everything up to the first colon and must not be empty;
/// whitespace after the colon is dropped.
fn split_header_line(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once(':')?;
    if name.is_empty() {
        return None;
    }
    Some((name, value.trim_start()))
}

fn insert_merged(headers: &mut HeaderMapping, key: String, value: &str) {
    if key == MULTI_VALUED_HEADER {
        let entry = headers.entry(key).or_insert_with(|| HeaderValue::Multi(Vec::new()));
        if let HeaderValue::Single(first) = entry {
            let first = std::mem::take(first);
            *entry = HeaderValue::Multi(vec![first]);
        }
        if let HeaderValue::Multi(values) = entry {
            values.push(value.to_string());
        }
        return;
    }

    match headers.get_mut(&key) {
        Some(HeaderValue::Single(existing)) => {
            existing.push_str(", ");
            existing.push_str(value);
        }
        Some(HeaderValue::Multi(values)) => values.push(value.to_string()),
        None => {
            headers.insert(key, HeaderValue::Single(value.to_string()));
        }
    }
}

/// Parse a raw header block. Lines that do not look like `name: value` are skipped.
pub fn parse_raw(block: &str) -> (HeaderMapping, RawHeaders) {
    let mut headers = HeaderMapping::new();
    let mut raw = RawHeaders::new();

    // `lines()` splits on both "\n" and "\r\n"
    for line in block.lines() {
        let Some((name, value)) = split_header_line(line) else {
            continue;
        };

        insert_merged(&mut headers, name.to_lowercase(), value);
        raw.push((name.to_string(), value.to_string()));
    }

    (headers, raw)
}

/// Mirror a fetch header collection. The host already merged duplicates, so a later pair for
/// the same name replaces the earlier one.
pub fn from_pairs<I, K, V>(pairs: I) -> (HeaderMapping, RawHeaders)
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let mut headers = HeaderMapping::new();
    let mut raw = RawHeaders::new();

    for (name, value) in pairs {
        let name = name.into();
        let value = value.into();
        headers.insert(name.to_lowercase(), HeaderValue::Single(value.clone()));
        raw.push((name, value));
    }

    (headers, raw)
}

/// Build an `http::HeaderMap` from the raw list. Entries that are not valid HTTP names or
/// values are skipped.
pub fn to_header_map(raw: &RawHeaders) -> http::HeaderMap {
    let mut map = http::HeaderMap::new();

    for (name, value) in raw {
        let Ok(name) = HeaderName::from_bytes(name.trim().as_bytes()) else {
            log::debug!("Skipping invalid header name: {:?}", name);
            continue;
        };
        let Ok(value) = http::HeaderValue::from_str(value) else {
            log::debug!("Skipping invalid value for header {}", name);
            continue;
        };
        map.append(name, value);
    }

    map
}

/// Charset declared in `Content-Type`, lowercased and unquoted
pub fn declared_charset(headers: &HeaderMapping) -> Option<String> {
    let content_type = headers.get(CONTENT_TYPE.as_str())?.joined();
    let lower = content_type.to_ascii_lowercase();

    let idx = lower.find("charset=")?;
    let after = &lower[idx + "charset=".len()..];
    let end = after.find([';', ' ', '\t', ',']).unwrap_or(after.len());
    let charset = after[..end].trim_matches('"');

    if charset.is_empty() {
        None
    } else {
        Some(charset.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_cookie_keeps_every_value() {
        let (headers, raw) = parse_raw("Set-Cookie: a=1\r\nSet-Cookie: b=2\r\n");

        assert_eq!(
            headers.get("set-cookie"),
            Some(&HeaderValue::Multi(vec!["a=1".into(), "b=2".into()]))
        );
        assert_eq!(
            raw,
            vec![
                ("Set-Cookie".to_string(), "a=1".to_string()),
                ("Set-Cookie".to_string(), "b=2".to_string()),
            ]
        );
    }

    #[test]
    fn single_set_cookie_is_still_a_sequence() {
        let (headers, _) = parse_raw("set-cookie: only=1");
        assert_eq!(headers.get("set-cookie"), Some(&HeaderValue::Multi(vec!["only=1".into()])));
    }

    #[test]
    fn repeated_headers_are_comma_joined() {
        let (headers, raw) = parse_raw("X-Foo: 1\nx-foo: 2");

        assert_eq!(headers.get("x-foo"), Some(&HeaderValue::Single("1, 2".into())));
        // raw list keeps original casing and both entries
        assert_eq!(raw[0].0, "X-Foo");
        assert_eq!(raw[1].0, "x-foo");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let (headers, raw) = parse_raw("no colon here\n: empty name\n\nContent-Length:   12\n");

        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("content-length"), Some(&HeaderValue::Single("12".into())));
        assert_eq!(raw, vec![("Content-Length".to_string(), "12".to_string())]);
    }

    #[test]
    fn value_may_contain_colons() {
        let (headers, _) = parse_raw("Location: http://example.com:8080/x");
        assert_eq!(
            headers.get("location").map(HeaderValue::joined),
            Some("http://example.com:8080/x".to_string())
        );
    }

    #[test]
    fn pairs_are_lowercased_and_mirrored() {
        let (headers, raw) = from_pairs(vec![("Content-Type", "text/plain"), ("X-Id", "7")]);

        assert_eq!(headers.get("content-type"), Some(&HeaderValue::from("text/plain")));
        assert_eq!(headers.get("x-id"), Some(&HeaderValue::from("7")));
        assert_eq!(raw[0], ("Content-Type".to_string(), "text/plain".to_string()));
    }

    #[test]
    fn header_map_skips_invalid_entries() {
        let raw: RawHeaders = vec![
            ("Set-Cookie".into(), "a=1".into()),
            ("Set-Cookie".into(), "b=2".into()),
            ("bad name".into(), "x".into()),
            ("X-Ok".into(), "fine".into()),
        ];
        let map = to_header_map(&raw);

        assert_eq!(map.get_all("set-cookie").iter().count(), 2);
        assert_eq!(map.get("x-ok").unwrap(), "fine");
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn charset_from_content_type() {
        let (headers, _) = parse_raw("Content-Type: text/html; charset=\"ISO-8859-1\"");
        assert_eq!(declared_charset(&headers).as_deref(), Some("iso-8859-1"));

        let (headers, _) = parse_raw("Content-Type: text/html; charset=utf-8; foo=bar");
        assert_eq!(declared_charset(&headers).as_deref(), Some("utf-8"));

        let (headers, _) = parse_raw("Content-Type: application/octet-stream");
        assert_eq!(declared_charset(&headers), None);

        assert_eq!(declared_charset(&HeaderMapping::new()), None);
    }
}
