use std::{error, fmt};
use thiserror::Error;

/// Registration-time failures for routes and pipeline steps.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The route table already holds `max_routes` entries.
    #[error("route table is full ({0} routes)")]
    TooManyRoutes(usize),
    /// The pattern declares more `:name` segments than `max_route_params`.
    #[error("pattern exceeds the route parameter ceiling ({0})")]
    TooManyParams(usize),
    /// The pipeline already holds `max_middlewares` steps.
    #[error("middleware chain is full ({0} steps)")]
    TooManyMiddlewares(usize),
}

/// Classified failures raised while turning raw connection bytes into a
/// dispatched request.
///
/// Every variant maps to a pre-built HTTP response (see [`ErrorKind::as_http`]),
/// so the connection driver never allocates while reporting an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The header section never terminated with `CRLF CRLF`.
    InvalidRequest,
    /// The request line did not split into a valid method, target and version.
    InvalidRequestLine,
    /// A header line was structurally invalid or exceeded per-header limits.
    InvalidHeaderLine,
    /// More header lines than the configured ceiling.
    TooManyHeaders,
    /// The buffer was empty or otherwise structurally impossible to parse.
    InvalidRequestFormat,

    /// The whole request exceeded the configured request size limit.
    RequestTooLarge,
    /// The header section exceeded the configured header size limit.
    HeadersTooLarge,
    /// The declared or received body exceeded the configured body size limit.
    BodyTooLarge,

    /// No registered route matched the request path.
    NotFound,
    /// A route pattern matched the path, but under a different method.
    MethodNotAllowed,
    /// A handler or pipeline step failed, or an internal allocation failed.
    Internal,
}

macro_rules! http_errors {
    ($($name:ident: $status_code:expr, $len:literal => $json:literal; )*) => {
        /// Returns the complete pre-built HTTP response for this error.
        pub(crate) const fn as_http(&self) -> &'static [u8] {
            match self { $(
                Self::$name => concat!(
                    "HTTP/1.1 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: ", $len, "\r\n",
                    "content-type: application/json\r\n",
                    "\r\n",
                    $json
                ),
            )* }.as_bytes()
        }
    };
}

impl ErrorKind {
    http_errors! {
        InvalidRequest: "400 Bad Request", "34"
            => r#"{"error":"Bad Request","code":400}"#;
        InvalidRequestLine: "400 Bad Request", "34"
            => r#"{"error":"Bad Request","code":400}"#;
        InvalidHeaderLine: "400 Bad Request", "34"
            => r#"{"error":"Bad Request","code":400}"#;
        TooManyHeaders: "400 Bad Request", "34"
            => r#"{"error":"Bad Request","code":400}"#;
        InvalidRequestFormat: "400 Bad Request", "34"
            => r#"{"error":"Bad Request","code":400}"#;

        RequestTooLarge: "413 Payload Too Large", "40"
            => r#"{"error":"Payload Too Large","code":413}"#;
        HeadersTooLarge: "413 Payload Too Large", "40"
            => r#"{"error":"Payload Too Large","code":413}"#;
        BodyTooLarge: "413 Payload Too Large", "40"
            => r#"{"error":"Payload Too Large","code":413}"#;

        NotFound: "404 Not Found", "67"
            => r#"{"error":"Not Found","message":"No route matched the request path"}"#;
        MethodNotAllowed: "405 Method Not Allowed", "98"
            => r#"{"error":"Method Not Allowed","message":"The requested method is not supported for this resource"}"#;

        Internal: "500 Internal Server Error", "44"
            => r#"{"error":"Internal Server Error","code":500}"#;
    }
}

impl error::Error for ErrorKind {}
impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
