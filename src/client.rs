//! Client lifecycle: configuration, handler registration, run and shutdown.

use crate::config::Config;
use crate::events::{EventKind, HandlerRegistry};
use crate::http::response::Response;
use crate::proxy::context::RequestContext;
use crate::proxy::forwarder::Forwarder;
use crate::server::listener;
use crate::server::stats::ProxyStats;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

/// Read-only state shared by every connection task.
pub(crate) struct Shared {
    pub registry: Arc<HandlerRegistry>,
    pub forwarder: Arc<Forwarder>,
    pub config: Config,
    pub stats: Arc<ProxyStats>,
}

/// The intercepting proxy.
///
/// Handlers are registered before `run`; from then on the registry and
/// configuration are immutable and read concurrently by all connection
/// tasks.
///
/// # Example
///
/// ```no_run
/// use warden::{Client, Config, Response};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let mut client = Client::new(Config::default());
///     client.on_request(|mut ctx| async move {
///         ctx.respond(Response::ok("intercepted"))?;
///         Ok(())
///     });
///     client.run().await
/// }
/// ```
pub struct Client {
    config: Config,
    registry: HandlerRegistry,
    stats: Arc<ProxyStats>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Client {
    pub fn new(config: Config) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            registry: HandlerRegistry::new(),
            stats: Arc::new(ProxyStats::default()),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Registers the handler for inbound requests. Last registration wins.
    ///
    /// Without one, every inbound request is answered with 404 and nothing
    /// is forwarded.
    pub fn on_request<F, Fut>(&mut self, handler: F)
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.registry.on_request(handler);
    }

    /// Registers the handler for forwarded responses. Last registration wins.
    ///
    /// Without one, upstream responses pass through unmodified.
    pub fn on_forward<F, Fut>(&mut self, handler: F)
    where
        F: Fn(Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Response>> + Send + 'static,
    {
        self.registry.on_forward(handler);
    }

    /// Returns a handle that triggers graceful shutdown from anywhere.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown_tx.clone())
    }

    /// Returns the live request counters. The handle stays valid after the
    /// client is consumed by `bind` or `run`.
    pub fn stats(&self) -> Arc<ProxyStats> {
        self.stats.clone()
    }

    /// Binds the configured address without serving yet.
    ///
    /// Useful when the caller needs the actual bound address (e.g., when
    /// configured with port 0).
    pub async fn bind(self) -> anyhow::Result<BoundClient> {
        let addr = self.config.listen_addr();
        let listener = TcpListener::bind(&addr).await?;
        info!("listening on {}", listener.local_addr()?);

        let Client {
            config,
            registry,
            stats,
            shutdown_tx,
            shutdown_rx,
        } = self;

        info!(
            request_handler = registry.has_handler(EventKind::Request),
            forward_handler = registry.has_handler(EventKind::Forward),
            "handlers registered"
        );

        let forwarder = Forwarder::new(config.connect_timeout(), config.request_timeout());
        let shared = Arc::new(Shared {
            registry: Arc::new(registry),
            forwarder: Arc::new(forwarder),
            config,
            stats,
        });

        Ok(BoundClient {
            listener,
            shared,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Binds and serves until shutdown is requested.
    pub async fn run(self) -> anyhow::Result<()> {
        self.bind().await?.serve().await
    }
}

/// A client bound to its listen address, ready to serve.
pub struct BoundClient {
    listener: TcpListener,
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl BoundClient {
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown_tx.clone())
    }

    pub fn stats(&self) -> Arc<ProxyStats> {
        self.shared.stats.clone()
    }

    /// Serves connections until a shutdown is triggered, then drains
    /// in-flight requests up to the configured grace period.
    pub async fn serve(self) -> anyhow::Result<()> {
        let BoundClient {
            listener,
            shared,
            shutdown_tx,
            shutdown_rx,
        } = self;

        let result = listener::run(listener, shared, shutdown_rx).await;
        drop(shutdown_tx);
        result
    }
}

/// Cheap clonable trigger for graceful shutdown.
#[derive(Clone)]
pub struct ShutdownHandle(watch::Sender<bool>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.0.send(true);
    }
}
