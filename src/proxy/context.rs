//! Per-request lifecycle state machine.

use crate::error::WardenError;
use crate::events::HandlerRegistry;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::proxy::forwarder::Forwarder;
use std::sync::Arc;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Lifecycle of a request.
///
/// Exactly one terminal transition happens per request: either
/// `Pending -> Responded`, or `Pending -> Forwarding -> Forwarded`. Every
/// later attempt to finalize fails with [`WardenError::AlreadyFinalized`]
/// instead of being silently ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Pending,
    Responded,
    Forwarding,
    Forwarded,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Responded | LifecycleState::Forwarded)
    }
}

/// Handle given to the `request` handler for deciding a request's fate.
///
/// The context owns the request exclusively; the connection task that created
/// it waits on the reply channel for whichever response gets committed first.
pub struct RequestContext {
    request: Request,
    state: LifecycleState,
    reply: Option<oneshot::Sender<Response>>,
    forwarder: Arc<Forwarder>,
    registry: Arc<HandlerRegistry>,
}

impl RequestContext {
    pub(crate) fn new(
        request: Request,
        reply: oneshot::Sender<Response>,
        forwarder: Arc<Forwarder>,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        Self {
            request,
            state: LifecycleState::Pending,
            reply: Some(reply),
            forwarder,
            registry,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn correlation_id(&self) -> Uuid {
        self.request.correlation_id
    }

    /// Commits `response` as the final answer to this request.
    ///
    /// Legal only while the request is still pending.
    pub fn respond(&mut self, response: Response) -> Result<(), WardenError> {
        let reply = self.take_reply()?;
        self.state = LifecycleState::Responded;

        tracing::debug!(
            correlation = %self.request.correlation_id,
            status = response.status().as_u16(),
            "request responded"
        );

        if reply.send(response).is_err() {
            tracing::debug!(
                correlation = %self.request.correlation_id,
                "client went away before the response was committed"
            );
        }

        Ok(())
    }

    /// Forwards this request to `target` and commits whatever the forward
    /// pipeline produces.
    ///
    /// The outbound request is the original one unless `request_override`
    /// supplies a replacement; either way the exchange is tied to this
    /// request's correlation identifier. Forwarding is one-shot: once it
    /// starts, no second finalize can happen on this request.
    pub async fn forward(
        &mut self,
        target: &str,
        request_override: Option<Request>,
    ) -> Result<(), WardenError> {
        let reply = self.take_reply()?;
        self.state = LifecycleState::Forwarding;

        tracing::debug!(
            correlation = %self.request.correlation_id,
            target,
            "forwarding request"
        );

        let mut outgoing = request_override.unwrap_or_else(|| self.request.clone());
        outgoing.correlation_id = self.request.correlation_id;

        let upstream = self.forwarder.forward(target, &outgoing).await;
        let committed = self.registry.dispatch_forward(upstream).await;

        self.state = LifecycleState::Forwarded;

        if reply.send(committed).is_err() {
            tracing::debug!(
                correlation = %self.request.correlation_id,
                "client went away before the forwarded response was committed"
            );
        }

        Ok(())
    }

    fn take_reply(&mut self) -> Result<oneshot::Sender<Response>, WardenError> {
        if self.state != LifecycleState::Pending {
            return Err(WardenError::AlreadyFinalized { state: self.state });
        }
        self.reply
            .take()
            .ok_or(WardenError::AlreadyFinalized { state: self.state })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::{Method, RequestBuilder};
    use std::time::Duration;

    fn pending_context() -> (RequestContext, oneshot::Receiver<Response>) {
        let request = RequestBuilder::new()
            .method(Method::GET)
            .path("/")
            .build()
            .unwrap();
        let (tx, rx) = oneshot::channel();
        let forwarder = Arc::new(Forwarder::new(
            Duration::from_secs(1),
            Duration::from_secs(1),
        ));
        let registry = Arc::new(HandlerRegistry::new());
        (RequestContext::new(request, tx, forwarder, registry), rx)
    }

    #[tokio::test]
    async fn respond_commits_and_transitions() {
        let (mut ctx, rx) = pending_context();
        assert_eq!(ctx.state(), LifecycleState::Pending);

        ctx.respond(Response::ok("hello")).unwrap();

        assert_eq!(ctx.state(), LifecycleState::Responded);
        assert!(ctx.state().is_terminal());

        let committed = rx.await.unwrap();
        assert_eq!(committed.status().as_u16(), 200);
        assert_eq!(committed.body(), b"hello");
    }

    #[tokio::test]
    async fn second_respond_fails() {
        let (mut ctx, _rx) = pending_context();

        ctx.respond(Response::ok("first")).unwrap();
        let err = ctx.respond(Response::ok("second")).unwrap_err();

        assert!(matches!(
            err,
            WardenError::AlreadyFinalized {
                state: LifecycleState::Responded
            }
        ));
    }

    #[tokio::test]
    async fn forward_after_respond_fails() {
        let (mut ctx, _rx) = pending_context();

        ctx.respond(Response::ok("done")).unwrap();
        let err = ctx.forward("http://127.0.0.1:1", None).await.unwrap_err();

        assert!(matches!(err, WardenError::AlreadyFinalized { .. }));
    }

    #[tokio::test]
    async fn respond_after_forward_fails() {
        let (mut ctx, rx) = pending_context();

        // Unreachable target: the forward still completes, with a 502
        ctx.forward("http://127.0.0.1:1", None).await.unwrap();
        assert_eq!(ctx.state(), LifecycleState::Forwarded);

        let err = ctx.respond(Response::ok("late")).unwrap_err();
        assert!(matches!(
            err,
            WardenError::AlreadyFinalized {
                state: LifecycleState::Forwarded
            }
        ));

        let committed = rx.await.unwrap();
        assert_eq!(committed.status().as_u16(), 502);
        assert_eq!(committed.correlation_id(), Some(ctx.correlation_id()));
    }

    #[tokio::test]
    async fn respond_with_dropped_receiver_still_finalizes() {
        let (mut ctx, rx) = pending_context();
        drop(rx);

        // A vanished client is not an error for the handler
        ctx.respond(Response::ok("nobody home")).unwrap();
        assert_eq!(ctx.state(), LifecycleState::Responded);
    }
}
