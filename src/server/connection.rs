use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::client::Shared;
use crate::error::WardenError;
use crate::http::parser::{self, ParseError};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::writer::ResponseWriter;
use crate::proxy::context::RequestContext;

/// Drives one inbound connection through its request/response exchange.
///
/// One request per connection: read and parse, dispatch the `request` event
/// as its own task, wait for whichever response gets committed, write it and
/// close. Malformed bytes are answered with 400 without touching user code;
/// handler failures become 500. The client always receives a well-formed
/// response unless it disconnected first, in which case the handler task is
/// cancelled along with any upstream exchange it has in flight.
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    buffer: Vec<u8>,
    shared: Arc<Shared>,
}

enum ReadOutcome {
    Request(Box<Request>),
    Malformed(ParseError),
    Disconnected,
}

impl Connection {
    pub(crate) fn new(stream: TcpStream, peer: SocketAddr, shared: Arc<Shared>) -> Self {
        Self {
            stream,
            peer,
            buffer: Vec::with_capacity(4096),
            shared,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut request = match self.read_request().await? {
            ReadOutcome::Request(request) => *request,
            ReadOutcome::Malformed(error) => {
                tracing::warn!(
                    peer = %self.peer,
                    error = %WardenError::MalformedRequest(format!("{:?}", error)),
                    "rejecting request"
                );
                self.write_response(Response::bad_request()).await?;
                return Ok(());
            }
            ReadOutcome::Disconnected => return Ok(()),
        };

        request.remote = Some(self.peer);
        let correlation_id = request.correlation_id;
        self.shared.stats.request_received();

        tracing::debug!(
            peer = %self.peer,
            method = request.method.as_str(),
            path = %request.path,
            correlation = %correlation_id,
            "request received"
        );

        let Some(response) = self.dispatch(request).await else {
            tracing::debug!(
                peer = %self.peer,
                correlation = %correlation_id,
                "client disconnected before a response was committed"
            );
            return Ok(());
        };

        tracing::info!(
            peer = %self.peer,
            status = response.status().as_u16(),
            correlation = %correlation_id,
            "response committed"
        );

        self.write_response(response).await
    }

    /// Runs the `request` event and waits for the committed response.
    ///
    /// Returns `None` when the client disconnects before anything is
    /// committed; the handler task is aborted in that case, which also drops
    /// any upstream exchange it started.
    async fn dispatch(&mut self, request: Request) -> Option<Response> {
        let Some(handler) = self.shared.registry.request_handler() else {
            // No handler registered: default terminal response, no forward
            tracing::debug!(peer = %self.peer, "no request handler registered");
            return Some(Response::not_found());
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let ctx = RequestContext::new(
            request,
            reply_tx,
            self.shared.forwarder.clone(),
            self.shared.registry.clone(),
        );

        // The handler runs as its own unit of work so a panic inside it is
        // contained to this request.
        let handler_task = tokio::spawn(handler(ctx));
        let peer = self.peer;
        let stream = &mut self.stream;

        tokio::select! {
            outcome = reply_rx => match outcome {
                Ok(response) => Some(response),
                // Reply channel closed without a commit: the handler is done,
                // find out how it ended.
                Err(_) => Some(handler_outcome(peer, handler_task).await),
            },
            _ = wait_for_disconnect(stream) => {
                handler_task.abort();
                None
            }
        }
    }

    async fn read_request(&mut self) -> anyhow::Result<ReadOutcome> {
        loop {
            // Try parsing whatever we already have
            match parser::parse_request(&self.buffer) {
                Ok((request, consumed)) => {
                    self.buffer.drain(..consumed);
                    return Ok(ReadOutcome::Request(Box::new(request)));
                }

                Err(ParseError::Incomplete) => {
                    // Need more data, fall through to read
                }

                Err(error) => {
                    return Ok(ReadOutcome::Malformed(error));
                }
            }

            let mut temp = [0u8; 1024];
            let n = self.stream.read(&mut temp).await?;

            if n == 0 {
                // Client closed before sending a full request
                return Ok(ReadOutcome::Disconnected);
            }

            self.buffer.extend_from_slice(&temp[..n]);
        }
    }

    async fn write_response(&mut self, response: Response) -> anyhow::Result<()> {
        // One exchange per connection
        let response = if response.headers().contains("Connection") {
            response
        } else {
            response.into_builder().header("Connection", "close").build()
        };

        ResponseWriter::new(&response)
            .write_to_stream(&mut self.stream)
            .await
    }
}

/// Reply channel closed without a value: inspect how the handler ended.
async fn handler_outcome(
    peer: SocketAddr,
    handler_task: JoinHandle<anyhow::Result<()>>,
) -> Response {
    match handler_task.await {
        Ok(Ok(())) => {
            tracing::error!(peer = %peer, error = %WardenError::NotHandled, "handler bug");
            Response::internal_error()
        }
        Ok(Err(error)) => {
            tracing::error!(peer = %peer, error = %error, "request handler failed");
            Response::internal_error()
        }
        Err(join_error) => {
            tracing::error!(peer = %peer, error = %join_error, "request handler panicked");
            Response::internal_error()
        }
    }
}

/// Resolves once the peer closes its side of the connection.
///
/// Only one request is served per connection, so any bytes arriving after
/// the parsed request are discarded.
async fn wait_for_disconnect(stream: &mut TcpStream) {
    let mut drain = [0u8; 512];
    loop {
        match stream.read(&mut drain).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}
