//! Server configuration: limits, timeouts and feature flags
//!
//! # Security-First Defaults
//!
//! Default limits are intentionally conservative to prevent:
//! - Resource exhaustion attacks
//! - Slowloris-style drip feeding (headers and bodies)
//! - Header flooding
//! - Unbounded connection growth
//!
//! # Examples
//!
//! ```no_run
//! use warden_http::{Config, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut config = Config::secure();
//!     config.port = 8443;
//!     config.max_connections = 500;
//!
//!     let server = Server::with_config(config).unwrap();
//!     server.listen().await.unwrap();
//! }
//! ```

use std::time::Duration;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

/// Error produced by [`Config::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Port 0 is not a bindable service port.
    #[error("port 0 is not a valid listening port")]
    InvalidPort,
    /// A limit that must be nonzero was set to zero.
    #[error("`{0}` must be greater than zero")]
    ZeroLimit(&'static str),
    /// The body progress threshold is a percentage and must not exceed 100.
    #[error("body_read_threshold_percent must be <= 100, got {0}")]
    InvalidThreshold(u32),
}

/// Verbosity threshold for the crate's structured logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Maps the configured level onto a `tracing` filter.
    ///
    /// `Critical` has no direct `tracing` equivalent and filters at `ERROR`.
    #[inline]
    pub const fn as_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warning => LevelFilter::WARN,
            LogLevel::Error | LogLevel::Critical => LevelFilter::ERROR,
        }
    }
}

/// The complete set of recognized server options.
///
/// Deeply immutable once the server starts: [`crate::Server`] takes the
/// config by value and never exposes it mutably afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP port to bind (default: `8080`). Port 0 fails validation.
    pub port: u16,
    /// Interface to bind (default: `127.0.0.1`).
    pub address: String,

    /// Admission ceiling for concurrent connections (default: `1000`).
    ///
    /// When reached, newly accepted sockets are dropped without queueing.
    /// Bounded memory takes priority over fairness to latecomers.
    pub max_connections: usize,

    /// Transport read deadline per read operation (default: `30000` ms).
    pub read_timeout_ms: u64,
    /// Transport write deadline for the whole response (default: `30000` ms).
    pub write_timeout_ms: u64,
    /// Reserved: the reference lifecycle closes after one exchange
    /// (default: `60000` ms).
    pub keepalive_timeout_ms: u64,

    /// Read chunk and [`crate::BufferPool`] slot size in bytes (default: `8192`).
    pub buffer_size: usize,
    /// BufferPool slot ceiling (default: `200`).
    pub max_buffers: usize,

    /// Route registration ceiling (default: `100`).
    pub max_routes: usize,
    /// Per-pattern `:param` ceiling (default: `20`).
    pub max_route_params: usize,
    /// Pipeline step registration ceiling (default: `50`).
    pub max_middlewares: usize,

    /// Hard ceiling on total connection lifetime (default: `30000` ms).
    pub connection_timeout_ms: u64,
    /// Surfaced for callers; not consulted by the reference timeout rules
    /// (default: `30000` ms).
    pub request_timeout_ms: u64,
    /// Deadline for receiving the complete header section (default: `10000` ms).
    pub header_timeout_ms: u64,
    /// Deadline for measurable body progress (default: `60000` ms).
    pub body_timeout_ms: u64,
    /// Maximum silence between reads (default: `5000` ms).
    pub idle_timeout_ms: u64,

    /// Whole-request size ceiling used by the size validators
    /// (default: `1 MiB`).
    pub max_request_size: usize,
    /// Header count ceiling (default: `100`).
    pub max_header_count: usize,
    /// Header section size ceiling in bytes (default: `8192`).
    pub max_header_size: usize,
    /// Request-target length ceiling in bytes (default: `2048`).
    pub max_uri_length: usize,
    /// Declared/received body size ceiling in bytes (default: `10 MiB`).
    pub max_body_size: usize,

    /// Fraction of the declared body that must arrive before
    /// `body_timeout_ms` to avoid a Slowloris verdict (default: `10`).
    pub body_read_threshold_percent: u32,

    /// Master switch for the size validators (default: `true`).
    pub enable_request_validation: bool,
    /// Master switch for the timeout engine (default: `true`).
    pub enable_timeout_protection: bool,

    /// Future hook; the reference always answers `connection: close`
    /// (default: `false`).
    pub enable_keep_alive: bool,
    /// Future hook (default: `false`).
    pub enable_compression: bool,
    /// Future hook (default: `false`).
    pub enable_cors: bool,

    /// Logging verbosity (default: `Info`).
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            address: String::from("127.0.0.1"),

            max_connections: 1000,

            read_timeout_ms: 30_000,
            write_timeout_ms: 30_000,
            keepalive_timeout_ms: 60_000,

            buffer_size: 8192,
            max_buffers: 200,

            max_routes: 100,
            max_route_params: 20,
            max_middlewares: 50,

            connection_timeout_ms: 30_000,
            request_timeout_ms: 30_000,
            header_timeout_ms: 10_000,
            body_timeout_ms: 60_000,
            idle_timeout_ms: 5_000,

            max_request_size: 1024 * 1024,
            max_header_count: 100,
            max_header_size: 8192,
            max_uri_length: 2048,
            max_body_size: 10 * 1024 * 1024,

            body_read_threshold_percent: 10,

            enable_request_validation: true,
            enable_timeout_protection: true,

            enable_keep_alive: false,
            enable_compression: false,
            enable_cors: false,

            log_level: LogLevel::Info,
        }
    }
}

impl Config {
    /// The default preset: balanced limits for general API workloads.
    #[inline]
    pub fn basic() -> Self {
        Self::default()
    }

    /// Hardened preset for internet-facing deployments.
    ///
    /// Tighter admission, smaller bodies, shorter header/idle deadlines.
    pub fn secure() -> Self {
        Self {
            max_connections: 250,
            max_body_size: 1024 * 1024,
            max_uri_length: 1024,
            max_header_count: 50,
            header_timeout_ms: 5_000,
            idle_timeout_ms: 3_000,
            body_timeout_ms: 30_000,
            ..Self::default()
        }
    }

    /// Development preset: verbose logging, generous deadlines.
    pub fn dev() -> Self {
        Self {
            max_connections: 100,
            connection_timeout_ms: 300_000,
            idle_timeout_ms: 60_000,
            header_timeout_ms: 60_000,
            log_level: LogLevel::Debug,
            ..Self::default()
        }
    }

    /// Checks the numeric invariants the rest of the crate relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.max_connections == 0 {
            return Err(ConfigError::ZeroLimit("max_connections"));
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::ZeroLimit("buffer_size"));
        }
        if self.max_header_size == 0 {
            return Err(ConfigError::ZeroLimit("max_header_size"));
        }
        if self.max_uri_length == 0 {
            return Err(ConfigError::ZeroLimit("max_uri_length"));
        }
        if self.body_read_threshold_percent > 100 {
            return Err(ConfigError::InvalidThreshold(
                self.body_read_threshold_percent,
            ));
        }

        Ok(())
    }

    #[inline(always)]
    pub(crate) fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    #[inline(always)]
    pub(crate) fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}
