//! Per-connection read/parse/dispatch/write state machine.
//!
//! One accepted socket maps to one [`Exchange`], owned by exactly one task.
//! The lifecycle is one-shot: accumulate the request, dispatch it, write the
//! response, close. At every read completion and timer wake the timeout
//! engine may veto continuation.

use crate::{
    context::Context,
    errors::ErrorKind,
    http::{request::Request, response::Response},
    router::DispatchError,
    server::server_impl::Shared,
    timing::{self, ConnectionTiming, Verdict},
};
use memchr::memmem;
use std::{
    io,
    time::{Duration, Instant},
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    time::sleep,
};
use tracing::{debug, error, warn};

// Accumulation slack beyond max_body_size before the reader gives up.
const READ_OVERHEAD: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Reading,
    HeadersComplete,
    Dispatching,
    Writing,
    Closing,
}

/// Drives one connection from first byte to shutdown.
///
/// Errors are terminal for the connection and never propagate past this
/// function; the caller only has to release its admission permit.
pub(crate) async fn run<S>(shared: &Shared, stream: &mut S)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut exchange = Exchange::new(shared);

    loop {
        let step = match exchange.state {
            ConnState::Reading | ConnState::HeadersComplete => {
                exchange.read_step(stream).await
            }
            ConnState::Dispatching => {
                exchange.dispatch_step();
                Ok(())
            }
            ConnState::Writing => exchange.write_step(stream).await,
            ConnState::Closing => break,
        };

        if let Err(error) = step {
            warn!(%error, "transport error, closing connection");
            exchange.state = ConnState::Closing;
        }
    }

    // Close errors are warned and ignored; the peer is gone either way.
    if let Err(error) = stream.shutdown().await {
        warn!(%error, "error during connection shutdown");
    }

    exchange.finish();
}

struct Exchange<'a> {
    shared: &'a Shared,
    state: ConnState,
    buffer: Vec<u8>,
    chunk: Box<[u8]>,
    leased: bool,
    timing: ConnectionTiming,
    headers_end: Option<usize>,
    response_bytes: Option<Vec<u8>>,
}

impl<'a> Exchange<'a> {
    fn new(shared: &'a Shared) -> Self {
        let (chunk, leased) = match shared.buffers.acquire() {
            Some(slot) => (slot, true),
            None => (
                vec![0; shared.config.buffer_size].into_boxed_slice(),
                false,
            ),
        };

        Self {
            shared,
            state: ConnState::Reading,
            buffer: Vec::with_capacity(shared.config.buffer_size),
            chunk,
            leased,
            timing: ConnectionTiming::new(Instant::now()),
            headers_end: None,
            response_bytes: None,
        }
    }

    /// Returns the leased read chunk to the pool.
    fn finish(&mut self) {
        if self.leased {
            let chunk = std::mem::replace(&mut self.chunk, Vec::new().into_boxed_slice());
            self.shared.buffers.release(chunk);
            self.leased = false;
        }
    }

    /// How long the read loop may sleep before a timeout rule could fire.
    fn sleep_duration(&self) -> Duration {
        let read_timeout = self.shared.config.read_timeout();

        match timing::next_deadline(&self.timing, &self.shared.config) {
            // One extra millisecond so the wake lands past the deadline.
            Some(deadline) => {
                let until = deadline.saturating_duration_since(Instant::now());
                (until + Duration::from_millis(1)).min(read_timeout)
            }
            None => read_timeout,
        }
    }

    async fn read_step<S>(&mut self, stream: &mut S) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let wait = self.sleep_duration();

        let read = tokio::select! {
            biased;

            result = stream.read(&mut self.chunk) => Some(result?),
            _ = sleep(wait) => None,
        };
        let now = Instant::now();

        match read {
            Some(0) => {
                debug!("peer closed before request completion");
                self.state = ConnState::Closing;
                return Ok(());
            }
            Some(count) => {
                self.buffer.extend_from_slice(&self.chunk[..count]);
                self.timing.record_read(now);
                self.after_read();
            }
            None => {
                // Timer wake: nothing arrived within the transport deadline.
                if now.saturating_duration_since(self.timing.last_read_time)
                    >= self.shared.config.read_timeout()
                {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "read timeout"));
                }
            }
        }

        if self.state == ConnState::Reading || self.state == ConnState::HeadersComplete {
            match timing::check(&self.timing, &self.shared.config, now) {
                Verdict::Allowed => {}
                verdict => {
                    warn!(?verdict, "timing verdict, closing without response");
                    self.state = ConnState::Closing;
                }
            }
        }

        Ok(())
    }

    /// Re-examines the accumulated buffer after new bytes arrived.
    fn after_read(&mut self) {
        let config = &self.shared.config;

        // Accumulation guard: the body allowance plus fixed slack for the
        // request line and headers.
        let past_slack = self.buffer.len().saturating_sub(READ_OVERHEAD);
        if let Verdict::BodyTooLarge = timing::validate_body_size(past_slack, config) {
            warn!(total = self.buffer.len(), "request exceeded accumulation limit");
            self.response_bytes = Some(ErrorKind::RequestTooLarge.as_http().to_vec());
            self.state = ConnState::Writing;
            return;
        }

        if self.headers_end.is_none() {
            let Some(pos) = memmem::find(&self.buffer, b"\r\n\r\n") else {
                return;
            };

            self.headers_end = Some(pos);
            let expected =
                timing::parse_content_length(&self.buffer[..pos + 4]).unwrap_or(0);
            self.timing.headers_completed(expected);
            self.state = ConnState::HeadersComplete;

            // An oversized declaration fails in the parser; no point
            // waiting for a body we will reject.
            if let Verdict::BodyTooLarge = timing::validate_body_size(expected, config) {
                self.state = ConnState::Dispatching;
                return;
            }
        }

        self.update_body_progress();
    }

    fn update_body_progress(&mut self) {
        let Some(end) = self.headers_end else {
            return;
        };

        let received = self.buffer.len() - end - 4;
        self.timing.record_body_progress(received);

        if let Some(expected) = self.timing.expected_body_length {
            if received >= expected {
                self.state = ConnState::Dispatching;
            }
        }
    }

    /// Parse, route and serialize. Never suspends.
    fn dispatch_step(&mut self) {
        let shared = self.shared;

        let bytes = match Request::parse(&self.buffer, &shared.config) {
            Ok(request) => {
                let mut response = Response::new();
                let outcome = {
                    let mut ctx = Context::new(&request, &mut response);
                    shared.router.dispatch(&mut ctx, &shared.pipeline)
                };

                match outcome {
                    Ok(()) => response.build(),
                    Err(DispatchError::NotFound) => {
                        debug!(path = request.path(), "no route matched");
                        ErrorKind::NotFound.as_http().to_vec()
                    }
                    Err(DispatchError::MethodNotAllowed) => {
                        debug!(
                            method = request.method().as_str(),
                            path = request.path(),
                            "method not allowed"
                        );
                        ErrorKind::MethodNotAllowed.as_http().to_vec()
                    }
                    Err(DispatchError::Handler(failure)) => {
                        error!(%failure, path = request.path(), "handler failed");
                        ErrorKind::Internal.as_http().to_vec()
                    }
                }
            }
            Err(kind) => {
                debug!(?kind, "request rejected");
                kind.as_http().to_vec()
            }
        };

        self.response_bytes = Some(bytes);
        self.state = ConnState::Writing;
    }

    async fn write_step<S>(&mut self, stream: &mut S) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let bytes = self.response_bytes.take().unwrap_or_default();

        tokio::select! {
            biased;

            result = stream.write_all(&bytes) => result?,
            _ = sleep(self.shared.config.write_timeout()) => {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "write timeout"));
            }
        }

        debug!(bytes = bytes.len(), "response written");
        self.state = ConnState::Closing;
        Ok(())
    }
}
