//! Server setup and the accept loop.
//!
//! # Examples
//!
//! ```no_run
//! use snake_http::{Controller, Response, Server, ServerConfig};
//!
//! let mut index = Controller::new("");
//! index.get("/", |_req| async { Ok(Response::text("hello")) });
//!
//! let mut server = Server::new(ServerConfig::default());
//! server.register(index).unwrap();
//! server.listen().unwrap();
//! ```

use crate::access_log::{AccessLog, Clock, SystemClock, TracingAccessLog};
use crate::config::{ServerConfig, TlsConfig};
use crate::controller::IntoController;
use crate::error::{ServerError, ServerResult};
use crate::http::{ReadLimits, Response};
use crate::pipeline::{ConnectionPipeline, ErrorHandler, Shared};
use crate::router::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpSocket};
use tokio::runtime::Builder;
use tokio::sync::Semaphore;

/// Collects controllers and hooks, then serves them.
pub struct Server {
    config: ServerConfig,
    router: Router,
    access_log: Arc<dyn AccessLog>,
    clock: Arc<dyn Clock>,
    on_error: Option<ErrorHandler>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: config.normalized(),
            router: Router::new(),
            access_log: Arc::new(TracingAccessLog),
            clock: Arc::new(SystemClock),
            on_error: None,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Adds every route of `controller`. An invalid template is a startup error.
    pub fn register<C: IntoController>(&mut self, controller: C) -> ServerResult<&mut Self> {
        self.router.register(controller)?;
        Ok(self)
    }

    /// Replaces the default JSON error response.
    pub fn on_error<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(ServerError) -> Response + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    pub fn access_log<L: AccessLog>(&mut self, access_log: L) -> &mut Self {
        self.access_log = Arc::new(access_log);
        self
    }

    pub fn clock<C: Clock>(&mut self, clock: C) -> &mut Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Freezes the route table. The returned service is cheap to clone.
    pub fn freeze(self) -> Service {
        let tls = self.config.tls.clone();
        let shared = Shared {
            router: self.router,
            limits: ReadLimits {
                max_head_size: self.config.max_head_size,
                read_chunk_size: self.config.read_chunk_size,
            },
            max_buffered_body: self.config.max_buffered_body,
            write_mode: self.config.write_mode,
            access_log: self.access_log,
            clock: self.clock,
            on_error: self.on_error,
        };
        Service {
            shared: Arc::new(shared),
            limit: Arc::new(Semaphore::new(self.config.max_connections)),
            tcp_no_delay: self.config.tcp_no_delay,
            tls,
        }
    }

    /// Starts a runtime with the configured worker count and serves forever.
    pub fn listen(self) -> ServerResult<()> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(self.config.worker_threads)
            .enable_all()
            .build()?;
        runtime.block_on(self.run())
    }

    /// Binds the configured address and serves on the current runtime.
    pub async fn run(self) -> ServerResult<()> {
        let listener = bind(&self.config)?;
        let service = self.freeze();
        service.serve(listener).await
    }
}

fn bind(config: &ServerConfig) -> ServerResult<TcpListener> {
    let socket = match config.address {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(config.reuse_addr)?;
    socket.bind(config.address)?;
    let listener = socket.listen(config.backlog)?;

    let local = listener.local_addr()?;
    let family = if local.is_ipv4() { "ipv4" } else { "ipv6" };
    let scheme = if config.tls.is_some() { "https" } else { "http" };
    tracing::info!(
        max_connections = config.max_connections,
        "Server started and listening on [{}] {}://{}",
        family,
        scheme,
        local
    );
    Ok(listener)
}

/// A frozen server, ready to accept connections.
#[derive(Clone)]
pub struct Service {
    shared: Arc<Shared>,
    limit: Arc<Semaphore>,
    tcp_no_delay: bool,
    tls: Option<TlsConfig>,
}

impl Service {
    /// Accepts connections until the listener fails.
    pub async fn serve(&self, listener: TcpListener) -> ServerResult<()> {
        self.serve_until(listener, std::future::pending::<()>()).await
    }

    /// Accepts connections until `shutdown` resolves. Connections already
    /// accepted run to completion on their own tasks.
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()>,
    {
        let acceptor = match &self.tls {
            Some(tls) => Some(tls.acceptor()?),
            None => None,
        };
        tokio::pin!(shutdown);

        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = Arc::clone(&self.limit).acquire_owned() => permit
                    .map_err(|_| ServerError::Internal("connection limit closed".to_string()))?,
            };

            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        tracing::warn!(error = %err, "accept failed");
                        continue;
                    }
                },
            };
            if let Err(err) = stream.set_nodelay(self.tcp_no_delay) {
                tracing::warn!(peer = %peer, error = %err, "failed to set TCP_NODELAY");
            }
            tracing::debug!(
                peer = %peer,
                available_permits = self.limit.available_permits(),
                "connection accepted"
            );

            let service = self.clone();
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let _permit = permit;
                match acceptor {
                    Some(acceptor) => match acceptor.accept(stream).await {
                        Ok(tls_stream) => service.serve_connection(tls_stream, Some(peer)).await,
                        Err(err) => {
                            tracing::warn!(peer = %peer, error = %err, "TLS handshake failed");
                        }
                    },
                    None => service.serve_connection(stream, Some(peer)).await,
                }
            });
        }

        tracing::info!("server stopped accepting connections");
        Ok(())
    }

    /// Runs the pipeline for one already established connection.
    pub async fn serve_connection<IO>(&self, io: IO, peer: Option<SocketAddr>)
    where
        IO: AsyncRead + AsyncWrite + Send + Unpin,
    {
        ConnectionPipeline::new(Arc::clone(&self.shared), peer)
            .run(io)
            .await
    }

    pub fn router(&self) -> &Router {
        &self.shared.router
    }
}
