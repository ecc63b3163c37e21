//! Query string access with on-demand decoding.
//!
//! The parser stores the query exactly as received; nothing here runs unless
//! a handler actually asks for a parameter.

use crate::http::codec;
use memchr::memchr;

/// Parses a raw query string into decoded `(key, value)` pairs.
///
/// Pairs are `&`-separated; the first `=` splits key from value and a pair
/// without `=` yields an empty value. Keys and values are percent-decoded
/// with `+` treated as space. A leading `?` is tolerated, so `?a=1` and
/// `a=1` are equivalent. Empty chunks (`a=1&&b=2`) are skipped.
pub fn parse(raw: &str) -> Vec<(String, String)> {
    let data = raw.strip_prefix('?').unwrap_or(raw).as_bytes();
    let mut pairs = Vec::new();

    let mut start = 0;
    while start < data.len() {
        let end = memchr(b'&', &data[start..])
            .map(|pos| start + pos)
            .unwrap_or(data.len());

        let chunk = &data[start..end];
        start = end + 1;

        if chunk.is_empty() {
            continue;
        }

        let (key, value) = match memchr(b'=', chunk) {
            Some(split) => (&chunk[..split], &chunk[split + 1..]),
            None => (chunk, &[][..]),
        };

        pairs.push((decoded_string(key), decoded_string(value)));
    }

    pairs
}

/// Returns the decoded value of the first pair whose decoded key matches.
pub fn find(raw: &str, key: &str) -> Option<String> {
    parse(raw)
        .into_iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value)
}

#[inline]
fn decoded_string(bytes: &[u8]) -> String {
    let decoded = codec::decode(bytes);
    match simdutf8::basic::from_utf8(&decoded) {
        Ok(text) => text.to_owned(),
        Err(_) => String::from_utf8_lossy(&decoded).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic() {
        let cases = ["a=1&b=2", "?a=1&b=2"];

        for raw in cases {
            let pairs = parse(raw);
            assert_eq!(pairs.len(), 2);
            assert_eq!(pairs[0], ("a".into(), "1".into()));
            assert_eq!(pairs[1], ("b".into(), "2".into()));
        }
    }

    #[test]
    fn shapes() {
        #[rustfmt::skip]
        let cases: [(&str, &[(&str, &str)]); 6] = [
            ("flag",                  &[("flag", "")]),
            ("empty=",                &[("empty", "")]),
            ("=val",                  &[("", "val")]),
            ("a=1&&b=2",              &[("a", "1"), ("b", "2")]),
            ("very=long=with=equals", &[("very", "long=with=equals")]),
            ("",                      &[]),
        ];

        for (raw, expected) in cases {
            let pairs = parse(raw);
            assert_eq!(pairs.len(), expected.len(), "query {raw:?}");
            for (pair, (key, value)) in pairs.iter().zip(expected) {
                assert_eq!(pair.0, *key);
                assert_eq!(pair.1, *value);
            }
        }
    }

    #[test]
    fn decoding() {
        let pairs = parse("q=hello+world&mail=user%40example.com");
        assert_eq!(pairs[0], ("q".into(), "hello world".into()));
        assert_eq!(pairs[1], ("mail".into(), "user@example.com".into()));
    }

    #[test]
    fn find_first_wins() {
        assert_eq!(find("a=1&a=2", "a"), Some("1".into()));
        assert_eq!(find("q=zig&limit=10", "limit"), Some("10".into()));
        assert_eq!(find("q=zig", "missing"), None);
    }
}
