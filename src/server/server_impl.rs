//! Server assembly: registration surface, listener setup and accept loop.

use crate::{
    config::{Config, ConfigError},
    context::Context,
    errors::RegistryError,
    http::types::Method,
    pipeline::{HandlerError, Middleware, Pipeline},
    router::Router,
    server::{
        connection,
        pool::{BufferPool, ConnectionPool},
    },
};
use socket2::{Domain, Protocol, Socket, Type};
use std::{io, net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Read-only state shared by every connection task once `listen()` begins.
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) router: Router,
    pub(crate) pipeline: Pipeline,
    pub(crate) buffers: BufferPool,
}

/// An HTTP/1.1 server with admission control and slow-client protection.
///
/// # Examples
///
/// ```no_run
/// use warden_http::{Context, Server};
///
/// #[tokio::main]
/// async fn main() {
///     let mut server = Server::new("127.0.0.1", 8080).unwrap();
///
///     server
///         .get("/hello", |ctx: &mut Context| {
///             ctx.json(r#"{"ok":true}"#);
///             Ok(())
///         })
///         .unwrap();
///
///     server.listen().await.unwrap();
/// }
/// ```
pub struct Server {
    config: Config,
    router: Router,
    pipeline: Pipeline,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server").field("config", &self.config).finish()
    }
}

impl Server {
    /// Creates a server bound to `address`:`port` with default limits.
    pub fn new(address: &str, port: u16) -> Result<Self, ConfigError> {
        let config = Config {
            address: address.to_owned(),
            port,
            ..Config::default()
        };

        Self::with_config(config)
    }

    /// Creates a server from a validated [`Config`].
    pub fn with_config(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            router: Router::new(config.max_routes, config.max_route_params),
            pipeline: Pipeline::new(config.max_middlewares),
            config,
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registers a handler for GET requests on `pattern`.
    pub fn get(
        &mut self,
        pattern: &str,
        handler: impl Fn(&mut Context<'_>) -> Result<(), HandlerError> + Send + Sync + 'static,
    ) -> Result<(), RegistryError> {
        self.router.route(Method::Get, pattern, handler)
    }

    /// Registers a handler for POST requests on `pattern`.
    pub fn post(
        &mut self,
        pattern: &str,
        handler: impl Fn(&mut Context<'_>) -> Result<(), HandlerError> + Send + Sync + 'static,
    ) -> Result<(), RegistryError> {
        self.router.route(Method::Post, pattern, handler)
    }

    /// Registers a handler for PUT requests on `pattern`.
    pub fn put(
        &mut self,
        pattern: &str,
        handler: impl Fn(&mut Context<'_>) -> Result<(), HandlerError> + Send + Sync + 'static,
    ) -> Result<(), RegistryError> {
        self.router.route(Method::Put, pattern, handler)
    }

    /// Registers a handler for DELETE requests on `pattern`.
    pub fn delete(
        &mut self,
        pattern: &str,
        handler: impl Fn(&mut Context<'_>) -> Result<(), HandlerError> + Send + Sync + 'static,
    ) -> Result<(), RegistryError> {
        self.router.route(Method::Delete, pattern, handler)
    }

    /// Registers a handler for an arbitrary method on `pattern`.
    pub fn route(
        &mut self,
        method: Method,
        pattern: &str,
        handler: impl Fn(&mut Context<'_>) -> Result<(), HandlerError> + Send + Sync + 'static,
    ) -> Result<(), RegistryError> {
        self.router.route(method, pattern, handler)
    }

    /// Appends a pipeline step; steps run in registration order before the
    /// route handler.
    pub fn middleware(
        &mut self,
        step: impl Middleware + 'static,
    ) -> Result<(), RegistryError> {
        self.pipeline.add(step)
    }

    /// Binds the listener and serves connections until the task is aborted.
    ///
    /// Route and pipeline registration freeze here: the registries move into
    /// shared read-only state. Each admitted connection becomes one spawned
    /// task holding one admission permit; sockets past `max_connections` are
    /// dropped on the accept path without queueing.
    pub async fn listen(self) -> io::Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.address, self.config.port)
            .parse()
            .map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error))?;

        let listener = bind_listener(addr)?;
        let pool = Arc::new(ConnectionPool::new(self.config.max_connections));
        let shared = Arc::new(Shared {
            buffers: BufferPool::new(self.config.max_buffers, self.config.buffer_size),
            router: self.router,
            pipeline: self.pipeline,
            config: self.config,
        });

        info!(%addr, max_connections = pool.capacity(), "listening");

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(error) => {
                    warn!(%error, "accept failed");
                    continue;
                }
            };

            let Some(permit) = pool.try_acquire() else {
                debug!(%peer, active = pool.active(), "admission rejected");
                drop(stream);
                continue;
            };

            if let Err(error) = stream.set_nodelay(true) {
                debug!(%error, "could not set TCP_NODELAY");
            }

            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                let mut stream = stream;
                connection::run(&shared, &mut stream).await;
                drop(permit);
            });
        }
    }
}

fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    TcpListener::from_std(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::LogLevel, errors::RegistryError, pipeline::Next};

    fn ok(ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        ctx.text("ok");
        Ok(())
    }

    #[test]
    fn construction_validates_config() {
        assert!(Server::new("127.0.0.1", 8080).is_ok());
        assert_eq!(
            Server::new("127.0.0.1", 0).unwrap_err(),
            ConfigError::InvalidPort
        );

        let bad = Config {
            max_connections: 0,
            ..Config::default()
        };
        assert!(Server::with_config(bad).is_err());
    }

    #[test]
    fn registration_surface() {
        let mut server = Server::new("127.0.0.1", 8080).unwrap();

        server.get("/a", ok).unwrap();
        server.post("/a", ok).unwrap();
        server.put("/a/:id", ok).unwrap();
        server.delete("/a/:id", ok).unwrap();
        server.route(Method::Patch, "/a/:id", ok).unwrap();

        server
            .middleware(|ctx: &mut Context<'_>, next: Next<'_>| {
                ctx.set_state("seen", "true");
                next.run(ctx)
            })
            .unwrap();

        assert_eq!(server.router.len(), 5);
        assert_eq!(server.pipeline.len(), 1);
    }

    #[test]
    fn registration_ceilings_apply() {
        let config = Config {
            max_routes: 1,
            max_middlewares: 1,
            ..Config::default()
        };
        let mut server = Server::with_config(config).unwrap();

        server.get("/only", ok).unwrap();
        assert_eq!(
            server.get("/extra", ok).unwrap_err(),
            RegistryError::TooManyRoutes(1)
        );

        server
            .middleware(|ctx: &mut Context<'_>, next: Next<'_>| next.run(ctx))
            .unwrap();
        assert_eq!(
            server
                .middleware(|ctx: &mut Context<'_>, next: Next<'_>| next.run(ctx))
                .unwrap_err(),
            RegistryError::TooManyMiddlewares(1)
        );
    }

    #[test]
    fn presets_build_servers() {
        for config in [Config::basic(), Config::secure(), Config::dev()] {
            let server = Server::with_config(config).unwrap();
            assert!(server.config().max_connections > 0);
        }

        assert_eq!(
            Server::with_config(Config::dev()).unwrap().config().log_level,
            LogLevel::Debug
        );
    }
}
