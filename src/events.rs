//! Handler registry for the two interception events.
//!
//! User code registers at most one asynchronous callback per event kind;
//! registering again replaces the previous callback. The registry is frozen
//! behind an `Arc` once the client starts serving, so dispatch reads it
//! without synchronization.

use crate::http::response::Response;
use crate::proxy::context::RequestContext;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Callback invoked with the context of each inbound request. The handler
/// decides the request's fate by calling `respond` or `forward` on it.
pub type RequestCallback = Arc<dyn Fn(RequestContext) -> BoxFuture<anyhow::Result<()>> + Send + Sync>;

/// Callback invoked with the upstream response of a forwarded request.
/// Whatever response it returns is committed back to the original client.
pub type ForwardCallback =
    Arc<dyn Fn(Response) -> BoxFuture<anyhow::Result<Response>> + Send + Sync>;

/// The two interception points the proxy exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Request,
    Forward,
}

/// One callback slot per event kind; last registration wins.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    on_request: Option<RequestCallback>,
    on_forward: Option<ForwardCallback>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the `request` event handler, replacing any previous one.
    pub fn on_request<F, Fut>(&mut self, handler: F)
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if self.on_request.is_some() {
            debug!(event = ?EventKind::Request, "replacing registered handler");
        }
        self.on_request = Some(Arc::new(move |ctx| Box::pin(handler(ctx))));
    }

    /// Registers the `forward` event handler, replacing any previous one.
    pub fn on_forward<F, Fut>(&mut self, handler: F)
    where
        F: Fn(Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Response>> + Send + 'static,
    {
        if self.on_forward.is_some() {
            debug!(event = ?EventKind::Forward, "replacing registered handler");
        }
        self.on_forward = Some(Arc::new(move |response| Box::pin(handler(response))));
    }

    pub fn has_handler(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::Request => self.on_request.is_some(),
            EventKind::Forward => self.on_forward.is_some(),
        }
    }

    pub(crate) fn request_handler(&self) -> Option<RequestCallback> {
        self.on_request.clone()
    }

    /// Runs the upstream response through the `forward` handler.
    ///
    /// Defaults to pass-through when no handler is registered. A handler
    /// failure is contained here and converted into a 500 response carrying
    /// the original correlation identifier.
    pub(crate) async fn dispatch_forward(&self, upstream: Response) -> Response {
        let Some(handler) = self.on_forward.clone() else {
            return upstream;
        };

        debug!(event = ?EventKind::Forward, "dispatching");
        let correlation_id = upstream.correlation_id();

        match handler(upstream).await {
            Ok(response) => response,
            Err(error) => {
                tracing::error!(error = %error, "forward handler failed");
                let mut builder = Response::internal_error().into_builder();
                if let Some(id) = correlation_id {
                    builder = builder.correlation_id(id);
                }
                builder.build()
            }
        }
    }
}
