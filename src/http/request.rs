//! Incremental HTTP/1.1 request parsing with security limits.
//!
//! The parser is total: every limit is checked before the corresponding
//! allocation happens, so a rejected request never leaves half-built state
//! behind. It consumes a contiguous byte buffer that the connection driver
//! has already confirmed to contain a complete header section.

use crate::{
    config::Config,
    errors::ErrorKind,
    http::{
        query,
        types::{slice_to_usize, Method},
    },
    timing::{self, Verdict},
};
use memchr::{memchr, memchr3, memmem};

pub(crate) const MAX_METHOD_LENGTH: usize = 16;
pub(crate) const MAX_VERSION_LENGTH: usize = 16;
pub(crate) const MAX_HEADER_NAME_SIZE: usize = 256;
pub(crate) const MAX_HEADER_VALUE_SIZE: usize = 4096;

/// A fully parsed HTTP request.
///
/// Immutable once built; every field is owned, so the transport buffer can
/// be reused or freed the moment parsing returns.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    version: String,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl Request {
    /// Parses a complete request from `buffer`.
    ///
    /// `buffer` must contain at least the full header section (terminated by
    /// `CRLF CRLF`); the body may be partially present and is truncated to
    /// the available bytes.
    pub fn parse(buffer: &[u8], config: &Config) -> Result<Self, ErrorKind> {
        if buffer.is_empty() {
            return Err(ErrorKind::InvalidRequestFormat);
        }

        let headers_end =
            memmem::find(buffer, b"\r\n\r\n").ok_or(ErrorKind::InvalidRequest)?;
        if let Verdict::HeaderTooLarge = timing::validate_header_size(headers_end, config) {
            return Err(ErrorKind::HeadersTooLarge);
        }

        let head = &buffer[..headers_end];
        let (request_line, header_block) = match memmem::find(head, b"\r\n") {
            Some(pos) => (&head[..pos], &head[pos + 2..]),
            None => (head, &[][..]),
        };

        let (method, path, query, version) = parse_request_line(request_line, config)?;
        let headers = parse_header_lines(header_block, config)?;
        let body = extract_body(buffer, headers_end, &headers, config)?;

        Ok(Request {
            method,
            path,
            query,
            version,
            headers,
            body,
        })
    }
}

// Public API
impl Request {
    #[inline(always)]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// The raw path portion of the request target, before any `?`.
    ///
    /// Percent escapes are preserved; decoding happens during routing.
    #[inline(always)]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The raw query string after `?`, if any. Never decoded at parse time.
    #[inline(always)]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// The protocol version exactly as received (e.g. `HTTP/1.1`).
    #[inline(always)]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns a header value by case-insensitive name.
    ///
    /// Names are stored as received. When a client repeats a header name the
    /// last occurrence wins, matching the reference behavior.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(stored, _)| stored.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// All headers in the order they appeared on the wire.
    #[inline(always)]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The value of `Content-Length`, if present and well-formed.
    pub fn content_length(&self) -> Option<usize> {
        self.header("content-length")
            .and_then(|value| slice_to_usize(value.as_bytes()))
    }

    /// The request body, present only when `Content-Length` was positive.
    #[inline(always)]
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Looks up a query parameter, decoding it on demand.
    pub fn query_param(&self, key: &str) -> Option<String> {
        query::find(self.query()?, key)
    }
}

#[inline]
fn utf8_owned(bytes: &[u8], error: ErrorKind) -> Result<String, ErrorKind> {
    simdutf8::basic::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| error)
}

#[inline]
fn trim_spaces(mut bytes: &[u8]) -> &[u8] {
    while let [b' ', rest @ ..] = bytes {
        bytes = rest;
    }
    while let [rest @ .., b' '] = bytes {
        bytes = rest;
    }
    bytes
}

type RequestLine = (Method, String, Option<String>, String);

fn parse_request_line(line: &[u8], config: &Config) -> Result<RequestLine, ErrorKind> {
    // Exactly three space-separated tokens: METHOD SP TARGET SP VERSION.
    let first = memchr(b' ', line).ok_or(ErrorKind::InvalidRequestLine)?;
    let (method_raw, rest) = (&line[..first], &line[first + 1..]);
    let second = memchr(b' ', rest).ok_or(ErrorKind::InvalidRequestLine)?;
    let (target, version_raw) = (&rest[..second], &rest[second + 1..]);

    if method_raw.is_empty() || method_raw.len() > MAX_METHOD_LENGTH {
        return Err(ErrorKind::InvalidRequestLine);
    }
    let method = Method::from_bytes(method_raw)?;

    if target.is_empty()
        || timing::validate_uri_length(target.len(), config) != Verdict::Allowed
        || memchr(0, target).is_some()
    {
        return Err(ErrorKind::InvalidRequestLine);
    }

    if version_raw.is_empty()
        || version_raw.len() > MAX_VERSION_LENGTH
        || memchr(b' ', version_raw).is_some()
        || !version_raw.starts_with(b"HTTP/")
    {
        return Err(ErrorKind::InvalidRequestLine);
    }

    let (path_raw, query_raw) = match memchr(b'?', target) {
        Some(pos) => (&target[..pos], Some(&target[pos + 1..])),
        None => (target, None),
    };
    if path_raw.is_empty() {
        return Err(ErrorKind::InvalidRequestLine);
    }

    let path = utf8_owned(path_raw, ErrorKind::InvalidRequestLine)?;
    let query = match query_raw {
        Some(raw) => Some(utf8_owned(raw, ErrorKind::InvalidRequestLine)?),
        None => None,
    };
    let version = utf8_owned(version_raw, ErrorKind::InvalidRequestLine)?;

    Ok((method, path, query, version))
}

fn parse_header_lines(
    block: &[u8],
    config: &Config,
) -> Result<Vec<(String, String)>, ErrorKind> {
    let mut headers = Vec::new();
    if block.is_empty() {
        return Ok(headers);
    }

    let mut rest = block;
    loop {
        let (line, next) = match memmem::find(rest, b"\r\n") {
            Some(pos) => (&rest[..pos], Some(&rest[pos + 2..])),
            None => (rest, None),
        };

        if let Verdict::TooManyHeaders =
            timing::validate_header_count(headers.len() + 1, config)
        {
            return Err(ErrorKind::TooManyHeaders);
        }

        let colon = memchr(b':', line).ok_or(ErrorKind::InvalidHeaderLine)?;
        let name = trim_spaces(&line[..colon]);
        let value = trim_spaces(&line[colon + 1..]);

        if name.is_empty() || name.len() > MAX_HEADER_NAME_SIZE {
            return Err(ErrorKind::InvalidHeaderLine);
        }
        // CRLF-injection guard: a value may never smuggle line breaks.
        if value.len() > MAX_HEADER_VALUE_SIZE
            || memchr3(b'\r', b'\n', 0, value).is_some()
        {
            return Err(ErrorKind::InvalidHeaderLine);
        }

        headers.push((
            utf8_owned(name, ErrorKind::InvalidHeaderLine)?,
            utf8_owned(value, ErrorKind::InvalidHeaderLine)?,
        ));

        match next {
            Some(bytes) => rest = bytes,
            None => break,
        }
    }

    Ok(headers)
}

fn extract_body(
    buffer: &[u8],
    headers_end: usize,
    headers: &[(String, String)],
    config: &Config,
) -> Result<Option<Vec<u8>>, ErrorKind> {
    let declared = headers
        .iter()
        .rev()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .map(|(_, value)| value.as_str());

    let Some(declared) = declared else {
        return Ok(None);
    };

    let length =
        slice_to_usize(declared.as_bytes()).ok_or(ErrorKind::InvalidHeaderLine)?;
    if let Verdict::BodyTooLarge = timing::validate_body_size(length, config) {
        return Err(ErrorKind::BodyTooLarge);
    }
    if length == 0 {
        return Ok(None);
    }

    let body_start = headers_end + 4;
    let available = buffer.len().saturating_sub(body_start);
    let take = length.min(available);

    Ok(Some(buffer[body_start..body_start + take].to_vec()))
}
