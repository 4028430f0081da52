//! HTTP message model and wire handling.
//!
//! This module holds the value types and wire plumbing the proxy core is
//! built on:
//!
//! - **`headers`**: ordered, case-insensitive header multi-map
//! - **`request`**: inbound request representation with builder
//! - **`response`**: immutable response built through a builder
//! - **`parser`**: parses incoming HTTP/1.1 requests from byte buffers
//! - **`writer`**: serializes and writes responses back to the client

pub mod headers;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;

pub use headers::HeaderMap;
pub use request::{Method, Request, RequestBuilder};
pub use response::{Response, ResponseBuilder, StatusCode};
