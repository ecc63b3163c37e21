//! warden_http - Security-first asynchronous HTTP/1.1 server framework
//!
//! A connection-lifecycle engine that turns accepted TCP connections into
//! validated, dispatched request/response exchanges while defending against
//! slow-client resource exhaustion.
//!
//! # Features
//!
//! ## 🔒 Security & Protection
//! - **Slowloris defense built in** - per-connection deadlines for headers,
//!   idle gaps, total lifetime and measurable body progress.
//! - **Fully configurable limits** for request size, header count and size,
//!   URI length and body size, all enforced before allocation.
//! - **Admission control** - a bounded connection budget; sockets past the
//!   ceiling are dropped on the accept path, never queued.
//!
//! ## 🌐 Routing & Handling
//! - **Pattern router** with `:param` capture and `*` wildcards over
//!   percent-decoded path segments, first-match-wins ordering.
//! - **Middleware pipeline** - ordered steps with an explicit continuation;
//!   a step that never invokes it short-circuits the chain.
//! - **Per-request [`Context`]** bridging the parsed request, the response
//!   builder, route parameters and opaque handler state.
//!
//! ## 🏭 Production Ready
//! - **Canned error responses** - protocol violations answer from a
//!   pre-built table, no allocation on the error path.
//! - **One-shot lifecycle** - parse, dispatch, respond,
//!   `Connection: close`; no request smuggling surface.
//! - **Structured logging** via `tracing` at every driver decision point.
//!
//! # Quick Start
//!
//! ```no_run
//! use warden_http::{logging, Context, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     logging::init();
//!
//!     let mut server = Server::new("127.0.0.1", 8080).unwrap();
//!
//!     server
//!         .get("/hello/:name", |ctx: &mut Context| {
//!             let name = ctx.param("name").unwrap_or("world").to_owned();
//!             ctx.text(format!("Hello, {name}!"));
//!             Ok(())
//!         })
//!         .unwrap();
//!
//!     server.listen().await.unwrap();
//! }
//! ```
//!
//! # Presets
//!
//! [`Config::basic`], [`Config::secure`] and [`Config::dev`] mirror the
//! deployment modes most services need; start from one and override fields.

pub(crate) mod http {
    pub mod codec;
    pub mod query;
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod pool;
    pub(crate) mod server_impl;
}
pub(crate) mod context;
pub(crate) mod errors;
pub(crate) mod pipeline;
pub(crate) mod router;

pub mod config;
pub mod logging;
pub mod timing;

pub use crate::{
    config::{Config, ConfigError, LogLevel},
    context::Context,
    errors::{ErrorKind, RegistryError},
    http::{
        codec, query,
        request::Request,
        response::{Cookie, Response, SameSite},
        types::{Method, StatusCode},
    },
    pipeline::{HandlerError, Middleware, Next},
    router::Router,
    server::{
        pool::{BufferPool, ConnectionPermit, ConnectionPool},
        server_impl::Server,
    },
    timing::{ConnectionTiming, Verdict},
};
