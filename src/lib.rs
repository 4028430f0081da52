//! Warden - Event-driven intercepting HTTP proxy
//!
//! Accepts inbound HTTP connections, hands each request to user-supplied
//! asynchronous handlers, and lets them either answer immediately or forward
//! the request upstream, optionally rewriting the upstream response before it
//! reaches the original caller.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod proxy;
pub mod server;

pub use client::{Client, ShutdownHandle};
pub use config::Config;
pub use error::WardenError;
pub use events::{EventKind, HandlerRegistry};
pub use http::request::{Method, Request, RequestBuilder};
pub use http::response::{Response, ResponseBuilder, StatusCode};
pub use proxy::context::{LifecycleState, RequestContext};
pub use server::stats::ProxyStats;
