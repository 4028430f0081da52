//! Upstream request forwarding.
//!
//! The forwarder performs one outbound HTTP/1.1 exchange on behalf of a
//! request: connect, send the rewritten request, read the reply. It never
//! fails outward; unreachable or slow upstreams become synthesized 502/504
//! responses that flow through the same `forward` event as real replies.

use crate::error::WardenError;
use crate::http::headers::HeaderMap;
use crate::http::request::Request;
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use bytes::{Buf, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use url::Url;
use uuid::Uuid;

const BUFFER_SIZE: usize = 8192;
const MAX_HEADER_BYTES: usize = 64 * 1024;

/// Headers scoped to a single hop, stripped in both directions.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| name.eq_ignore_ascii_case(h))
}

/// Issues outbound HTTP calls to handler-chosen targets.
pub struct Forwarder {
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl Forwarder {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            request_timeout,
        }
    }

    /// Forwards `request` to `target` and returns the response to commit.
    ///
    /// On failure the returned response is synthesized (502 for connection
    /// problems, 504 for timeouts). Either way it carries the correlation
    /// identifier of `request`. No retries happen here; retry policy belongs
    /// to handler code, against a fresh request.
    pub async fn forward(&self, target: &str, request: &Request) -> Response {
        match self.exchange(target, request).await {
            Ok(response) => {
                tracing::info!(
                    target,
                    status = response.status().as_u16(),
                    method = request.method.as_str(),
                    path = %request.path,
                    correlation = %request.correlation_id,
                    "request forwarded"
                );
                response
            }
            Err(error) => {
                tracing::warn!(
                    target,
                    error = %error,
                    method = request.method.as_str(),
                    path = %request.path,
                    correlation = %request.correlation_id,
                    "upstream exchange failed"
                );
                self.synthesize(&error, request.correlation_id)
            }
        }
    }

    async fn exchange(&self, target: &str, request: &Request) -> Result<Response, WardenError> {
        let url =
            Url::parse(target).map_err(|_| WardenError::InvalidTarget(target.to_string()))?;

        let host = url
            .host_str()
            .ok_or_else(|| WardenError::InvalidTarget(target.to_string()))?;
        let port = url.port().unwrap_or(match url.scheme() {
            "https" => 443,
            _ => 80,
        });

        let addr = format!("{}:{}", host, port);
        let stream = timeout(self.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| WardenError::ForwardTimeout {
                target: target.to_string(),
                timeout: self.connect_timeout,
            })?
            .map_err(|e| WardenError::ForwardConnect {
                target: target.to_string(),
                message: e.to_string(),
            })?;

        tracing::trace!(target, "connected to upstream");

        let wire = self.build_outbound(request, &url)?;

        timeout(
            self.request_timeout,
            self.send_and_receive(stream, wire, request.correlation_id),
        )
        .await
        .map_err(|_| WardenError::ForwardTimeout {
            target: target.to_string(),
            timeout: self.request_timeout,
        })?
        .map_err(|e| WardenError::ForwardConnect {
            target: target.to_string(),
            message: e.to_string(),
        })
    }

    /// Serializes the outbound request: original method, path and body, the
    /// `Host` header rewritten to the target authority, hop-by-hop headers
    /// stripped and `Connection: close` appended.
    ///
    /// Public so tests can assert the wire format without a live upstream.
    pub fn build_outbound(&self, request: &Request, target: &Url) -> Result<Vec<u8>, WardenError> {
        let host = target
            .host_str()
            .ok_or_else(|| WardenError::InvalidTarget(target.to_string()))?;
        let host_value = match target.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        // Target path prefix joined with the original path + query
        let mut path = target.path().trim_end_matches('/').to_string();
        path.push_str(&request.path_and_query());
        if path.is_empty() {
            path.push('/');
        }

        let mut buffer = Vec::new();

        buffer.extend_from_slice(
            format!("{} {} {}\r\n", request.method.as_str(), path, request.version).as_bytes(),
        );

        buffer.extend_from_slice(format!("Host: {}\r\n", host_value).as_bytes());

        for (key, value) in request.headers.iter() {
            if is_hop_by_hop(key) || key.eq_ignore_ascii_case("host") {
                continue;
            }
            buffer.extend_from_slice(format!("{}: {}\r\n", key, value).as_bytes());
        }

        // One exchange per upstream connection
        buffer.extend_from_slice(b"Connection: close\r\n");

        buffer.extend_from_slice(b"\r\n");

        if !request.body.is_empty() {
            buffer.extend_from_slice(&request.body);
        }

        Ok(buffer)
    }

    async fn send_and_receive(
        &self,
        mut stream: TcpStream,
        wire: Vec<u8>,
        correlation_id: Uuid,
    ) -> std::io::Result<Response> {
        stream.write_all(&wire).await?;
        stream.flush().await?;

        tracing::trace!("request sent to upstream");

        self.read_response(&mut stream, correlation_id).await
    }

    /// Reads the upstream status line, headers and body.
    async fn read_response(
        &self,
        stream: &mut TcpStream,
        correlation_id: Uuid,
    ) -> std::io::Result<Response> {
        let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

        loop {
            let n = stream.read_buf(&mut buffer).await?;

            if n == 0 {
                return Err(invalid("connection closed before complete response received"));
            }

            if let Some(headers_end) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
                let header_bytes = buffer.split_to(headers_end + 4);
                let (status, mut headers) = parse_response_head(&header_bytes)?;

                let chunked = headers
                    .get("Transfer-Encoding")
                    .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"));

                let body = if chunked {
                    // Transfer-Encoding is hop-by-hop and stripped below;
                    // Content-Length is recomputed from the decoded body.
                    headers.remove("Content-Length");
                    self.read_chunked_body(stream, &mut buffer).await?
                } else {
                    let content_length = headers
                        .get("Content-Length")
                        .and_then(|v| v.parse::<usize>().ok());
                    self.read_body(stream, &mut buffer, content_length).await?
                };

                let mut builder = ResponseBuilder::new(status).correlation_id(correlation_id);
                for (key, value) in headers.iter() {
                    if is_hop_by_hop(key) {
                        continue;
                    }
                    builder = builder.header(key, value);
                }

                return Ok(builder.body(body).build());
            }

            // Prevent unbounded header growth
            if buffer.len() > MAX_HEADER_BYTES {
                return Err(invalid("response headers too large"));
            }
        }
    }

    /// Reads the body: Content-Length bytes when declared, otherwise until
    /// the upstream closes the connection.
    async fn read_body(
        &self,
        stream: &mut TcpStream,
        buffer: &mut BytesMut,
        content_length: Option<usize>,
    ) -> std::io::Result<Vec<u8>> {
        let Some(content_length) = content_length else {
            let mut body = buffer.to_vec();
            buffer.clear();
            loop {
                let n = stream.read_buf(buffer).await?;
                if n == 0 {
                    break;
                }
                body.extend_from_slice(&buffer[..]);
                buffer.clear();
            }
            return Ok(body);
        };

        if content_length == 0 {
            return Ok(Vec::new());
        }

        let mut body = Vec::with_capacity(content_length);

        // Use whatever arrived with the headers first
        let from_buffer = buffer.len().min(content_length);
        body.extend_from_slice(&buffer[..from_buffer]);
        buffer.advance(from_buffer);

        while body.len() < content_length {
            let n = stream.read_buf(buffer).await?;
            if n == 0 {
                return Err(invalid("connection closed before complete body received"));
            }
            let take = buffer.len().min(content_length - body.len());
            body.extend_from_slice(&buffer[..take]);
            buffer.advance(take);
        }

        Ok(body)
    }

    /// Decodes a chunked transfer-encoded body into plain bytes.
    ///
    /// Chunk extensions are ignored and the trailer section is consumed and
    /// discarded.
    async fn read_chunked_body(
        &self,
        stream: &mut TcpStream,
        buffer: &mut BytesMut,
    ) -> std::io::Result<Vec<u8>> {
        let mut body = Vec::new();

        loop {
            let size_line = read_line(stream, buffer).await?;
            let size_field = size_line.split(';').next().unwrap_or("").trim();
            let size = usize::from_str_radix(size_field, 16)
                .map_err(|_| invalid("invalid chunk size"))?;

            if size == 0 {
                break;
            }

            // Chunk data plus its trailing CRLF
            while buffer.len() < size + 2 {
                if stream.read_buf(buffer).await? == 0 {
                    return Err(invalid("connection closed inside chunked body"));
                }
            }

            body.extend_from_slice(&buffer[..size]);
            buffer.advance(size);

            if &buffer[..2] != b"\r\n" {
                return Err(invalid("missing chunk terminator"));
            }
            buffer.advance(2);
        }

        // Trailer section runs until an empty line
        loop {
            if read_line(stream, buffer).await?.is_empty() {
                break;
            }
        }

        Ok(body)
    }

    fn synthesize(&self, error: &WardenError, correlation_id: Uuid) -> Response {
        let response = match error {
            WardenError::ForwardTimeout { .. } => Response::gateway_timeout(),
            _ => Response::bad_gateway(),
        };

        response.into_builder().correlation_id(correlation_id).build()
    }
}

/// Reads one CRLF-terminated line, returned without the terminator.
async fn read_line(stream: &mut TcpStream, buffer: &mut BytesMut) -> std::io::Result<String> {
    loop {
        if let Some(pos) = buffer.windows(2).position(|w| w == b"\r\n") {
            let line = buffer.split_to(pos);
            buffer.advance(2);
            return String::from_utf8(line.to_vec())
                .map_err(|_| invalid("invalid bytes in chunk framing"));
        }
        if stream.read_buf(buffer).await? == 0 {
            return Err(invalid("connection closed inside chunked body"));
        }
    }
}

fn parse_response_head(header_bytes: &[u8]) -> std::io::Result<(StatusCode, HeaderMap)> {
    let headers_str = std::str::from_utf8(header_bytes)
        .map_err(|_| invalid("invalid UTF-8 in response headers"))?;

    let mut lines = headers_str.lines();

    let status_line = lines.next().ok_or_else(|| invalid("empty response"))?;
    let mut parts = status_line.splitn(3, ' ');
    let _version = parts.next().ok_or_else(|| invalid("invalid status line"))?;
    let status_code: u16 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| invalid("invalid status code"))?;

    let mut headers = HeaderMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.append(key.trim(), value.trim());
        }
    }

    Ok((StatusCode(status_code), headers))
}

fn invalid(message: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message.to_string())
}
