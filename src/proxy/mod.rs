//! Request interception and forwarding.
//!
//! `context` holds the per-request state machine handed to user handlers;
//! `forwarder` performs the outbound exchange when a handler chooses to
//! forward instead of answering directly.

pub mod context;
pub mod forwarder;

pub use context::{LifecycleState, RequestContext};
pub use forwarder::Forwarder;
