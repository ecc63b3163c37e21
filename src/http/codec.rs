//! Percent-encoding codec for paths and query strings.
//!
//! Decoding never fails: a malformed `%` sequence is emitted literally and
//! scanning resumes one byte later. Decoding is deliberately not idempotent;
//! percent signs produced by one pass are not re-examined.

use memchr::{memchr, memchr2};

#[inline(always)]
const fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[inline]
fn decode_impl(input: &[u8], plus_to_space: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut pos = 0;

    while pos < input.len() {
        let rest = &input[pos..];
        let found = match plus_to_space {
            true => memchr2(b'%', b'+', rest),
            false => memchr(b'%', rest),
        };

        let Some(offset) = found else {
            out.extend_from_slice(rest);
            break;
        };

        out.extend_from_slice(&rest[..offset]);
        let special = pos + offset;

        if input[special] == b'+' {
            out.push(b' ');
            pos = special + 1;
            continue;
        }

        match (
            input.get(special + 1).copied().and_then(hex_value),
            input.get(special + 2).copied().and_then(hex_value),
        ) {
            (Some(high), Some(low)) => {
                out.push((high << 4) | low);
                pos = special + 3;
            }
            _ => {
                out.push(b'%');
                pos = special + 1;
            }
        }
    }

    out
}

/// Decodes a query component: `%HH` escapes plus `+` as space.
#[inline]
pub fn decode(input: &[u8]) -> Vec<u8> {
    decode_impl(input, true)
}

/// Decodes a path segment: `%HH` escapes only, `+` stays literal.
#[inline]
pub fn decode_path_component(input: &[u8]) -> Vec<u8> {
    decode_impl(input, false)
}

/// Splits a path on `/`, discards empty segments and decodes each one.
///
/// Leading, trailing and doubled slashes all collapse away, so
/// `//api//users/` and `/api/users` produce the same segment list.
pub fn split_and_decode_path(path: &[u8]) -> Vec<Vec<u8>> {
    path.split(|&byte| byte == b'/')
        .filter(|segment| !segment.is_empty())
        .map(decode_path_component)
        .collect()
}

const HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// Percent-encodes arbitrary bytes; unreserved characters
/// (`A-Z a-z 0-9 - . _ ~`) pass through, everything else becomes `%HH`
/// with uppercase hex.
pub fn encode(input: &[u8]) -> String {
    let mut out = String::with_capacity(input.len());

    for &byte in input {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(byte as char);
        } else {
            out.push('%');
            out.push(HEX_UPPER[(byte >> 4) as usize] as char);
            out.push(HEX_UPPER[(byte & 0x0F) as usize] as char);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::*;

    #[test]
    fn decode_basic() {
        #[rustfmt::skip]
        let cases = [
            ("hello",           "hello"),
            ("hello%20world",   "hello world"),
            ("a+b",             "a b"),
            ("%41%42%43",       "ABC"),
            ("%2Fetc%2Fpasswd", "/etc/passwd"),
            ("caf%C3%A9",       "café"),
            ("100%25",          "100%"),
            ("",                ""),

            // Malformed escapes pass through literally
            ("%",               "%"),
            ("%2",              "%2"),
            ("%G1",             "%G1"),
            ("%%41",            "%A"),
            ("50%+off",         "50% off"),
        ];

        for (input, expected) in cases {
            assert_eq!(str_op(&decode(input.as_bytes())), expected);
        }
    }

    #[test]
    fn decode_path_keeps_plus() {
        #[rustfmt::skip]
        let cases = [
            ("a+b",           "a+b"),
            ("a%20b",         "a b"),
            ("c%2B%2B",       "c++"),
            ("foo%2Fbar.txt", "foo/bar.txt"),
        ];

        for (input, expected) in cases {
            assert_eq!(str_op(&decode_path_component(input.as_bytes())), expected);
        }
    }

    #[test]
    fn split_and_decode() {
        #[rustfmt::skip]
        let cases: [(&str, &[&str]); 7] = [
            ("/api/users",        &["api", "users"]),
            ("api/users",         &["api", "users"]),
            ("/api/users/",       &["api", "users"]),
            ("//api///users//",   &["api", "users"]),
            ("/",                 &[]),
            ("",                  &[]),
            ("/files/foo%2Fbar",  &["files", "foo/bar"]),
        ];

        for (path, expected) in cases {
            let segments = split_and_decode_path(path.as_bytes());
            let segments: Vec<&str> = segments.iter().map(|s| str_op(s)).collect();
            assert_eq!(segments, expected, "path {path:?}");
        }
    }

    #[test]
    fn encode_basic() {
        #[rustfmt::skip]
        let cases = [
            ("abcXYZ019-._~", "abcXYZ019-._~"),
            ("a b",           "a%20b"),
            ("a/b",           "a%2Fb"),
            ("50%",           "50%25"),
            ("café",          "caf%C3%A9"),
            ("+",             "%2B"),
        ];

        for (input, expected) in cases {
            assert_eq!(encode(input.as_bytes()), expected);
        }
    }

    #[test]
    fn encode_decode_round_trip() {
        let samples: [&[u8]; 5] = [
            b"plain",
            b"with space & symbols!",
            b"/path/with/slashes",
            &[0x00, 0x01, 0xFE, 0xFF],
            b"a+b=c%d",
        ];

        for sample in samples {
            assert_eq!(decode(encode(sample).as_bytes()), sample);
            assert_eq!(decode_path_component(encode(sample).as_bytes()), sample);
        }
    }

    #[test]
    fn decode_not_idempotent() {
        // A double-encoded percent decodes in two distinct steps.
        let once = decode(b"%2520");
        assert_eq!(str_op(&once), "%20");

        let twice = decode(&once);
        assert_eq!(str_op(&twice), " ");
        assert_ne!(once, twice);
    }
}
