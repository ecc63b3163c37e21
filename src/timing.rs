//! Per-connection timing facts and the timeout/validation engine.
//!
//! The engine is a pure function of `(ConnectionTiming, Config, now)`; the
//! driver polls it at every read-completion boundary and on timer wake. It
//! distinguishes a legitimately slow network from a Slowloris-style client
//! by demanding measurable body progress before the body deadline.

use crate::{config::Config, http::types::slice_to_usize};
use memchr::memmem;
use std::time::{Duration, Instant};

/// Timing facts for one connection.
///
/// Mutated only by the read path of the owning connection task; no locking.
#[derive(Debug, Clone)]
pub struct ConnectionTiming {
    pub(crate) start_time: Instant,
    pub(crate) last_read_time: Instant,
    pub(crate) headers_complete: bool,
    pub(crate) expected_body_length: Option<usize>,
    pub(crate) received_body_length: usize,
}

impl ConnectionTiming {
    pub fn new(now: Instant) -> Self {
        Self {
            start_time: now,
            last_read_time: now,
            headers_complete: false,
            expected_body_length: None,
            received_body_length: 0,
        }
    }

    /// Records a successful read completion.
    #[inline]
    pub fn record_read(&mut self, now: Instant) {
        self.last_read_time = now;
    }

    /// Marks the header section complete and fixes the expected body length.
    #[inline]
    pub fn headers_completed(&mut self, expected_body_length: usize) {
        self.headers_complete = true;
        self.expected_body_length = Some(expected_body_length);
    }

    #[inline]
    pub fn record_body_progress(&mut self, received: usize) {
        self.received_body_length = received;
    }
}

/// Advisory verdict produced by the engine and the size validators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    RequestTooLarge,
    TooManyHeaders,
    HeaderTooLarge,
    UriTooLong,
    BodyTooLarge,
    ProcessingTimeout,
    ConnectionTimeout,
    IdleTimeout,
}

/// Evaluates the timeout rules in order; the first violated rule wins.
///
/// Returns `Allowed` unconditionally when timeout protection is disabled.
pub fn check(timing: &ConnectionTiming, config: &Config, now: Instant) -> Verdict {
    if !config.enable_timeout_protection {
        return Verdict::Allowed;
    }

    let since_start = now.saturating_duration_since(timing.start_time);
    let since_read = now.saturating_duration_since(timing.last_read_time);

    if since_start > Duration::from_millis(config.connection_timeout_ms) {
        return Verdict::ConnectionTimeout;
    }
    if since_read > Duration::from_millis(config.idle_timeout_ms) {
        return Verdict::IdleTimeout;
    }
    if !timing.headers_complete
        && since_start > Duration::from_millis(config.header_timeout_ms)
    {
        return Verdict::ProcessingTimeout;
    }
    if timing.headers_complete {
        if let Some(expected) = timing.expected_body_length {
            if since_start > Duration::from_millis(config.body_timeout_ms) {
                let threshold =
                    expected as u64 * config.body_read_threshold_percent as u64 / 100;
                if (timing.received_body_length as u64) < threshold {
                    return Verdict::ProcessingTimeout;
                }
            }
        }
    }

    Verdict::Allowed
}

/// The earliest instant at which [`check`] could return a non-`Allowed`
/// verdict, or `None` when timeout protection is disabled.
///
/// The driver uses this to size the sleep arm of its read loop.
pub(crate) fn next_deadline(timing: &ConnectionTiming, config: &Config) -> Option<Instant> {
    if !config.enable_timeout_protection {
        return None;
    }

    let mut deadline =
        timing.start_time + Duration::from_millis(config.connection_timeout_ms);

    let idle = timing.last_read_time + Duration::from_millis(config.idle_timeout_ms);
    deadline = deadline.min(idle);

    if !timing.headers_complete {
        let header = timing.start_time + Duration::from_millis(config.header_timeout_ms);
        deadline = deadline.min(header);
    } else if timing.expected_body_length.is_some() {
        let body = timing.start_time + Duration::from_millis(config.body_timeout_ms);
        deadline = deadline.min(body);
    }

    Some(deadline)
}

// Size validators: independent pure predicates shared by the parser (header
// section size and count, URI length, declared body length) and the driver
// read path (accumulation guard, oversized declarations). Each is a no-op
// when request validation is disabled. `validate_request_size` is exposed
// for callers enforcing a whole-request budget; the read path bounds
// accumulation through `validate_body_size` instead.

pub fn validate_request_size(len: usize, config: &Config) -> Verdict {
    match config.enable_request_validation && len > config.max_request_size {
        true => Verdict::RequestTooLarge,
        false => Verdict::Allowed,
    }
}

pub fn validate_header_count(count: usize, config: &Config) -> Verdict {
    match config.enable_request_validation && count > config.max_header_count {
        true => Verdict::TooManyHeaders,
        false => Verdict::Allowed,
    }
}

pub fn validate_header_size(len: usize, config: &Config) -> Verdict {
    match config.enable_request_validation && len > config.max_header_size {
        true => Verdict::HeaderTooLarge,
        false => Verdict::Allowed,
    }
}

pub fn validate_uri_length(len: usize, config: &Config) -> Verdict {
    match config.enable_request_validation && len > config.max_uri_length {
        true => Verdict::UriTooLong,
        false => Verdict::Allowed,
    }
}

pub fn validate_body_size(len: usize, config: &Config) -> Verdict {
    match config.enable_request_validation && len > config.max_body_size {
        true => Verdict::BodyTooLarge,
        false => Verdict::Allowed,
    }
}

/// Extracts a `Content-Length` value from a raw header section without a
/// full parse.
///
/// Scans line by line up to the terminating blank line; the prefix match is
/// case-insensitive and the value is trimmed of spaces and tabs. Any
/// malformation yields `None`.
pub fn parse_content_length(head: &[u8]) -> Option<usize> {
    const PREFIX: &[u8] = b"content-length:";

    let end = memmem::find(head, b"\r\n\r\n").unwrap_or(head.len());
    let mut rest = &head[..end];

    while !rest.is_empty() {
        let (line, next) = match memmem::find(rest, b"\r\n") {
            Some(pos) => (&rest[..pos], &rest[pos + 2..]),
            None => (rest, &[][..]),
        };

        if line.len() >= PREFIX.len() && line[..PREFIX.len()].eq_ignore_ascii_case(PREFIX) {
            return slice_to_usize(trim_blank(&line[PREFIX.len()..]));
        }

        rest = next;
    }

    None
}

#[inline]
fn trim_blank(mut bytes: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = bytes {
        bytes = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = bytes {
        bytes = rest;
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn fresh_connection_is_allowed() {
        let base = Instant::now();
        let timing = ConnectionTiming::new(base);

        assert_eq!(check(&timing, &Config::default(), base), Verdict::Allowed);
        assert_eq!(
            check(&timing, &Config::default(), base + ms(100)),
            Verdict::Allowed
        );
    }

    #[test]
    fn connection_timeout_wins_first() {
        let base = Instant::now();
        let timing = ConnectionTiming::new(base);

        // Both rule 1 and rule 2 are violated; rule 1 is reported.
        assert_eq!(
            check(&timing, &Config::default(), base + ms(30_001)),
            Verdict::ConnectionTimeout
        );
    }

    #[test]
    fn idle_timeout() {
        let base = Instant::now();
        let mut timing = ConnectionTiming::new(base);
        timing.record_read(base);

        assert_eq!(
            check(&timing, &Config::default(), base + ms(5_001)),
            Verdict::IdleTimeout
        );

        // A read resets the idle clock.
        timing.record_read(base + ms(5_000));
        assert_eq!(
            check(&timing, &Config::default(), base + ms(9_000)),
            Verdict::Allowed
        );
    }

    #[test]
    fn header_deadline() {
        let config = Config {
            connection_timeout_ms: 1_000_000,
            idle_timeout_ms: 1_000_000,
            header_timeout_ms: 10_000,
            ..Config::default()
        };

        let base = Instant::now();
        let mut timing = ConnectionTiming::new(base);

        assert_eq!(
            check(&timing, &config, base + ms(10_001)),
            Verdict::ProcessingTimeout
        );

        // Once headers are in, rule 3 no longer applies.
        timing.headers_completed(0);
        timing.record_body_progress(0);
        assert_eq!(check(&timing, &config, base + ms(10_001)), Verdict::Allowed);
    }

    #[test]
    fn slowloris_body_progress() {
        let config = Config {
            connection_timeout_ms: 1_000_000,
            idle_timeout_ms: 1_000_000,
            body_timeout_ms: 1_000,
            body_read_threshold_percent: 10,
            ..Config::default()
        };

        let base = Instant::now();
        let mut timing = ConnectionTiming::new(base);
        timing.headers_completed(1000);

        // 5% received after the body deadline: drip-feed, cut it off.
        timing.record_body_progress(50);
        assert_eq!(
            check(&timing, &config, base + ms(1_001)),
            Verdict::ProcessingTimeout
        );

        // 10% received: enough measurable progress to keep waiting.
        timing.record_body_progress(100);
        assert_eq!(check(&timing, &config, base + ms(1_001)), Verdict::Allowed);
    }

    #[test]
    fn protection_switch() {
        let config = Config {
            enable_timeout_protection: false,
            ..Config::default()
        };

        let base = Instant::now();
        let timing = ConnectionTiming::new(base);

        assert_eq!(
            check(&timing, &config, base + ms(10_000_000)),
            Verdict::Allowed
        );
        assert_eq!(next_deadline(&timing, &config), None);
    }

    #[test]
    fn nearest_deadline() {
        let config = Config::default();
        let base = Instant::now();
        let mut timing = ConnectionTiming::new(base);

        // Headers pending: the 5s idle deadline is nearest.
        assert_eq!(next_deadline(&timing, &config), Some(base + ms(5_000)));

        // Headers complete with a body expected: idle still nearest, then
        // pushing the idle clock forward exposes the header/body deadlines.
        timing.headers_completed(100);
        timing.record_read(base + ms(58_000));
        assert_eq!(next_deadline(&timing, &config), Some(base + ms(30_000)));
    }

    #[test]
    fn validators() {
        let config = Config::default();

        #[rustfmt::skip]
        let cases = [
            (validate_request_size(1024 * 1024, &config),     Verdict::Allowed),
            (validate_request_size(1024 * 1024 + 1, &config), Verdict::RequestTooLarge),
            (validate_header_count(100, &config),             Verdict::Allowed),
            (validate_header_count(101, &config),             Verdict::TooManyHeaders),
            (validate_header_size(8192, &config),             Verdict::Allowed),
            (validate_header_size(8193, &config),             Verdict::HeaderTooLarge),
            (validate_uri_length(2048, &config),              Verdict::Allowed),
            (validate_uri_length(2049, &config),              Verdict::UriTooLong),
            (validate_body_size(10 * 1024 * 1024, &config),   Verdict::Allowed),
            (validate_body_size(10 * 1024 * 1024 + 1, &config), Verdict::BodyTooLarge),
        ];

        for (index, (verdict, expected)) in cases.into_iter().enumerate() {
            assert_eq!(verdict, expected, "case {index}");
        }

        let disabled = Config {
            enable_request_validation: false,
            ..Config::default()
        };
        assert_eq!(
            validate_body_size(usize::MAX, &disabled),
            Verdict::Allowed
        );
    }

    #[test]
    fn content_length_extraction() {
        #[rustfmt::skip]
        let cases: [(&[u8], Option<usize>); 10] = [
            (b"Content-Length: 42\r\n\r\n",                     Some(42)),
            (b"content-length: 42\r\n\r\n",                     Some(42)),
            (b"CONTENT-LENGTH:42\r\n\r\n",                      Some(42)),
            (b"Content-Length: \t 42 \t\r\n\r\n",               Some(42)),
            (b"Host: x\r\nContent-Length: 7\r\n\r\n",           Some(7)),
            (b"Content-Length: 0\r\n\r\n",                      Some(0)),

            (b"Content-Length: -1\r\n\r\n",                     None),
            (b"Content-Length: 12abc\r\n\r\n",                  None),
            (b"Host: x\r\n\r\n",                                None),
            // Anything after the blank line is body, not headers.
            (b"Host: x\r\n\r\nContent-Length: 9",               None),
        ];

        for (head, expected) in cases {
            assert_eq!(
                parse_content_length(head),
                expected,
                "head {:?}",
                String::from_utf8_lossy(head)
            );
        }
    }
}
