use crate::proxy::context::LifecycleState;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the proxy core.
///
/// All of these are contained per-request: a failing connection never affects
/// another connection or the listener itself.
#[derive(Debug, Error)]
pub enum WardenError {
    /// The inbound bytes could not be parsed into a request. Answered with
    /// 400, no handler is invoked.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// A handler called `respond` or `forward` on a request that already
    /// reached a terminal state, or while a forward was in flight.
    #[error("request already finalized (state: {state:?})")]
    AlreadyFinalized { state: LifecycleState },

    /// The request handler finished without responding or forwarding.
    #[error("handler finished without responding or forwarding")]
    NotHandled,

    /// The forward target could not be parsed into a usable URL.
    #[error("invalid forward target '{0}'")]
    InvalidTarget(String),

    /// The upstream could not be reached or dropped the exchange. Converted
    /// into a synthesized 502 response.
    #[error("failed to reach upstream {target}: {message}")]
    ForwardConnect { target: String, message: String },

    /// The upstream exchange exceeded the configured deadline. Converted into
    /// a synthesized 504 response.
    #[error("upstream {target} timed out after {timeout:?}")]
    ForwardTimeout { target: String, timeout: Duration },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
