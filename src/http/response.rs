//! HTTP response builder.
//!
//! A [`Response`] stays mutable while handlers and pipeline steps shape it;
//! [`Response::build`] consumes the builder and produces the single owned
//! byte sequence the connection driver writes to the transport. Consuming
//! `self` is what enforces the no-reuse invariant.

use crate::http::types::StatusCode;
use std::time::{SystemTime, UNIX_EPOCH};

const SERVER_TOKEN: &str = concat!("warden_http/", env!("CARGO_PKG_VERSION"));

/// `SameSite` cookie attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    #[inline]
    const fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// A response cookie, serialized as one `Set-Cookie` header.
///
/// Attributes are emitted in a fixed order: Path, Domain, Expires, Max-Age,
/// Secure, HttpOnly, SameSite.
#[derive(Debug, Clone, PartialEq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub expires: Option<String>,
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            domain: None,
            expires: None,
            max_age: None,
            secure: false,
            http_only: false,
            same_site: None,
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    pub fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }

    pub fn same_site(mut self, policy: SameSite) -> Self {
        self.same_site = Some(policy);
        self
    }

    fn write_to(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(b"Set-Cookie: ");
        buffer.extend_from_slice(self.name.as_bytes());
        buffer.push(b'=');
        buffer.extend_from_slice(self.value.as_bytes());

        if let Some(path) = &self.path {
            buffer.extend_from_slice(b"; Path=");
            buffer.extend_from_slice(path.as_bytes());
        }
        if let Some(domain) = &self.domain {
            buffer.extend_from_slice(b"; Domain=");
            buffer.extend_from_slice(domain.as_bytes());
        }
        if let Some(expires) = &self.expires {
            buffer.extend_from_slice(b"; Expires=");
            buffer.extend_from_slice(expires.as_bytes());
        }
        if let Some(max_age) = self.max_age {
            buffer.extend_from_slice(b"; Max-Age=");
            buffer.extend_from_slice(max_age.to_string().as_bytes());
        }
        if self.secure {
            buffer.extend_from_slice(b"; Secure");
        }
        if self.http_only {
            buffer.extend_from_slice(b"; HttpOnly");
        }
        if let Some(policy) = self.same_site {
            buffer.extend_from_slice(b"; SameSite=");
            buffer.extend_from_slice(policy.as_str().as_bytes());
        }

        buffer.extend_from_slice(b"\r\n");
    }
}

/// HTTP response under construction.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Vec<(String, String)>,
    cookies: Vec<Cookie>,
    body: Option<Vec<u8>>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: StatusCode::Ok,
            headers: Vec::new(),
            cookies: Vec::new(),
            body: None,
        }
    }

    /// Overwrites the status code (defaults to `200 OK`).
    #[inline]
    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    #[inline(always)]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Sets a header, replacing any previous value stored under the exact
    /// same name. Replacement is case-sensitive by design; `Content-Type`
    /// and `content-type` are distinct entries here.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        let value = value.into();

        match self.headers.iter_mut().find(|(stored, _)| *stored == name) {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name, value)),
        }
        self
    }

    /// Returns the value of the exact-named header, if set.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(stored, _)| stored == name)
            .map(|(_, value)| value.as_str())
    }

    /// Sets the response body. Later body writes replace prior content.
    #[inline]
    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) -> &mut Self {
        self.body = Some(body.into());
        self
    }

    /// Sets a JSON body and the matching `Content-Type`.
    pub fn set_json_body(&mut self, json: impl Into<String>) -> &mut Self {
        self.set_header("Content-Type", "application/json");
        self.set_body(json.into().into_bytes())
    }

    /// Sets an HTML body and the matching `Content-Type`.
    pub fn set_html_body(&mut self, html: impl Into<String>) -> &mut Self {
        self.set_header("Content-Type", "text/html; charset=utf-8");
        self.set_body(html.into().into_bytes())
    }

    /// Sets a plain-text body and the matching `Content-Type`.
    pub fn set_text_body(&mut self, text: impl Into<String>) -> &mut Self {
        self.set_header("Content-Type", "text/plain; charset=utf-8");
        self.set_body(text.into().into_bytes())
    }

    /// Appends a cookie; output order follows insertion order.
    #[inline]
    pub fn set_cookie(&mut self, cookie: Cookie) -> &mut Self {
        self.cookies.push(cookie);
        self
    }

    #[inline]
    fn has_header(&self, name: &str) -> bool {
        self.headers
            .iter()
            .any(|(stored, _)| stored.eq_ignore_ascii_case(name))
    }

    /// Serializes the response into one owned byte sequence.
    ///
    /// Default headers (`Server`, `Date`, `Connection: close` and
    /// `Content-Length`) are emitted only when the handler has not set them
    /// itself.
    pub fn build(self) -> Vec<u8> {
        let body_len = self.body.as_ref().map_or(0, Vec::len);
        let mut buffer = Vec::with_capacity(128 + body_len);

        buffer.extend_from_slice(self.status.first_line());

        if !self.has_header("Server") {
            write_header(&mut buffer, "Server", SERVER_TOKEN);
        }
        if !self.has_header("Date") {
            let epoch = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |elapsed| elapsed.as_secs());
            write_header(&mut buffer, "Date", &epoch.to_string());
        }
        if !self.has_header("Connection") {
            write_header(&mut buffer, "Connection", "close");
        }

        for (name, value) in &self.headers {
            write_header(&mut buffer, name, value);
        }

        for cookie in &self.cookies {
            cookie.write_to(&mut buffer);
        }

        if !self.has_header("Content-Length") {
            write_header(&mut buffer, "Content-Length", &body_len.to_string());
        }

        buffer.extend_from_slice(b"\r\n");
        if let Some(body) = self.body {
            buffer.extend_from_slice(&body);
        }

        buffer
    }
}

#[inline]
fn write_header(buffer: &mut Vec<u8>, name: &str, value: &str) {
    buffer.extend_from_slice(name.as_bytes());
    buffer.extend_from_slice(b": ");
    buffer.extend_from_slice(value.as_bytes());
    buffer.extend_from_slice(b"\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::*;

    fn built(response: Response) -> String {
        str_op(&response.build()).to_owned()
    }

    #[test]
    fn default_build() {
        let raw = built(Response::new());

        assert!(raw.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(raw.contains(&format!("\r\nServer: {SERVER_TOKEN}\r\n")));
        assert!(raw.contains("\r\nDate: "));
        assert!(raw.contains("\r\nConnection: close\r\n"));
        assert!(raw.contains("\r\nContent-Length: 0\r\n"));
        assert!(raw.ends_with("\r\n\r\n"));
    }

    #[test]
    fn json_body() {
        let mut response = Response::new();
        response.set_json_body(r#"{"ok":true}"#);
        let raw = built(response);

        assert!(raw.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(raw.contains("\r\nContent-Type: application/json\r\n"));
        assert!(raw.contains("\r\nContent-Length: 11\r\n"));
        assert!(raw.ends_with("\r\n\r\n{\"ok\":true}"));
    }

    #[test]
    fn body_setters_replace() {
        let mut response = Response::new();
        response.set_html_body("<h1>old</h1>");
        response.set_text_body("new");
        let raw = built(response);

        assert!(raw.contains("\r\nContent-Type: text/plain; charset=utf-8\r\n"));
        assert!(!raw.contains("<h1>"));
        assert!(raw.ends_with("\r\n\r\nnew"));
    }

    #[test]
    fn header_replacement() {
        let mut response = Response::new();
        response.set_header("X-Trace", "one");
        response.set_header("X-Trace", "two");
        let raw = built(response);

        assert!(raw.contains("\r\nX-Trace: two\r\n"));
        assert_eq!(raw.matches("X-Trace").count(), 1);
    }

    #[test]
    fn explicit_defaults_suppress_generated() {
        let mut response = Response::new();
        response.set_header("Connection", "keep-alive");
        response.set_header("Server", "custom/9");
        let raw = built(response);

        assert!(raw.contains("\r\nConnection: keep-alive\r\n"));
        assert!(raw.contains("\r\nServer: custom/9\r\n"));
        assert!(!raw.contains("close"));
        assert!(!raw.contains(SERVER_TOKEN));
    }

    #[test]
    fn status_override() {
        let mut response = Response::new();
        response.set_status(StatusCode::Created);
        assert_eq!(response.status(), StatusCode::Created);
        assert!(built(response).starts_with("HTTP/1.1 201 Created\r\n"));
    }

    #[test]
    fn cookie_attribute_order() {
        let mut response = Response::new();
        response.set_cookie(
            Cookie::new("session", "abc123")
                .path("/")
                .domain("example.com")
                .max_age(3600)
                .secure()
                .http_only()
                .same_site(SameSite::Strict),
        );
        let raw = built(response);

        assert!(raw.contains(
            "\r\nSet-Cookie: session=abc123; Path=/; Domain=example.com; \
             Max-Age=3600; Secure; HttpOnly; SameSite=Strict\r\n"
        ));
    }

    #[test]
    fn cookies_preserve_order() {
        let mut response = Response::new();
        response.set_cookie(Cookie::new("first", "1"));
        response.set_cookie(Cookie::new("second", "2"));
        let raw = built(response);

        let first = raw.find("Set-Cookie: first=1").unwrap();
        let second = raw.find("Set-Cookie: second=2").unwrap();
        assert!(first < second);
    }

    #[test]
    fn exactly_one_blank_line() {
        let mut with_body = Response::new();
        with_body.set_text_body("no crlf in here");

        for response in [Response::new(), with_body] {
            let raw = response.build();
            let blanks = raw.windows(4).filter(|w| *w == b"\r\n\r\n").count();
            assert_eq!(blanks, 1);
        }
    }
}
