//! One accepted connection, from request head to close.
//!
//! ```text
//! AwaitingHead -> AssemblingBody -> Dispatching -> WritingResponse -> Closed
//! ```
//!
//! A failure before the response head is written turns into an error
//! response; a failure after it only closes the connection.

mod assembler;
mod encoder;
mod writer;

pub use assembler::{BodyMode, Progress, RequestAssembler};
pub use encoder::{ResponseEncoder, ResponseSink};
pub use writer::{queued, DirectSink, QueuedSink};

use crate::access_log::{AccessLog, AccessRecord, Clock};
use crate::config::WriteMode;
use crate::error::{ServerError, ServerResult};
use crate::handler::{Handler, HttpResponse};
use crate::http::{FrameEncoder, Http1Reader, Method, ReadLimits, Request, RequestEvent, RequestHead, Response};
use crate::router::{Params, RouteMatch, Router};
use futures::FutureExt;
use std::io;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::io::{AsyncRead, AsyncWrite};

pub type ErrorHandler = Arc<dyn Fn(ServerError) -> Response + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    AwaitingHead,
    AssemblingBody,
    Dispatching,
    WritingResponse,
    Closed,
}

/// Read-only state shared by every connection of a server.
pub(crate) struct Shared {
    pub(crate) router: Router,
    pub(crate) limits: ReadLimits,
    pub(crate) max_buffered_body: usize,
    pub(crate) write_mode: WriteMode,
    pub(crate) access_log: Arc<dyn AccessLog>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) on_error: Option<ErrorHandler>,
}

#[derive(Debug, Default)]
struct Exchange {
    method: Option<Method>,
    uri: String,
}

pub struct ConnectionPipeline {
    shared: Arc<Shared>,
    peer: Option<SocketAddr>,
    state: ConnectionState,
}

impl ConnectionPipeline {
    pub(crate) fn new(shared: Arc<Shared>, peer: Option<SocketAddr>) -> Self {
        Self {
            shared,
            peer,
            state: ConnectionState::AwaitingHead,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn transition(&mut self, next: ConnectionState) {
        tracing::trace!(peer = ?self.peer, from = ?self.state, to = ?next, "connection state");
        self.state = next;
    }

    /// Serves exactly one request on `io` and closes it.
    pub async fn run<IO>(mut self, io: IO)
    where
        IO: AsyncRead + AsyncWrite + Send + Unpin,
    {
        let (read_half, write_half) = tokio::io::split(io);
        let mut reader = Http1Reader::new(read_half, self.shared.limits);
        let mut exchange = Exchange::default();

        let response = match self.respond(&mut reader, &mut exchange).await {
            Some(Ok(response)) => response,
            Some(Err(err)) => {
                tracing::debug!(peer = ?self.peer, uri = %exchange.uri, error = %err, "request failed");
                self.error_response(err)
            }
            None => {
                self.transition(ConnectionState::Closed);
                return;
            }
        };

        self.write(response, &exchange, write_half).await;
        self.transition(ConnectionState::Closed);
    }

    async fn respond<R>(
        &mut self,
        reader: &mut Http1Reader<R>,
        exchange: &mut Exchange,
    ) -> Option<HttpResponse>
    where
        R: AsyncRead + Unpin + Send,
    {
        let head = match reader.next_event().await? {
            RequestEvent::Head(head) => head,
            RequestEvent::Error(err) => return Some(Err(err)),
            _ => {
                return Some(Err(ServerError::BadRequest(
                    "expected a request head".to_string(),
                )))
            }
        };
        exchange.method = Some(head.method);
        exchange.uri = head.uri.clone();
        Some(self.handle(head, reader).await)
    }

    async fn handle<R>(&mut self, head: RequestHead, reader: &mut Http1Reader<R>) -> HttpResponse
    where
        R: AsyncRead + Unpin + Send,
    {
        let shared = Arc::clone(&self.shared);
        let RouteMatch { route, params } = shared.router.dispatch(head.method, head.path())?;

        self.transition(ConnectionState::AssemblingBody);
        let mut assembler = RequestAssembler::new(route.body_mode(), shared.max_buffered_body);
        let mut progress = assembler.push(RequestEvent::Head(head))?;
        let request = loop {
            match progress {
                Progress::Ready(request) => break request,
                Progress::Pending => {
                    let event = reader.next_event().await.unwrap_or_else(truncated);
                    progress = assembler.push(event)?;
                }
                Progress::Complete => {
                    return Err(ServerError::Internal("request completed before it was assembled".to_string()))
                }
            }
        };
        let request = self.prepare(request, params);

        self.transition(ConnectionState::Dispatching);
        match assembler.mode() {
            BodyMode::Buffered => invoke(route.handler(), request).await,
            BodyMode::Streaming => {
                let (response, fed) =
                    tokio::join!(invoke(route.handler(), request), feed(reader, &mut assembler));
                fed?;
                response
            }
        }
    }

    fn prepare(&self, mut request: Request, params: Params) -> Request {
        request.params = params;
        request.peer = self.peer;
        request
    }

    fn error_response(&self, err: ServerError) -> Response {
        match &self.shared.on_error {
            Some(handler) => handler(err),
            None => Response::error(err),
        }
    }

    async fn write<W>(&mut self, mut response: Response, exchange: &Exchange, writer: W)
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.transition(ConnectionState::WritingResponse);

        let now = self.shared.clock.now();
        if response.get_header("Date").is_none() {
            response.header("Date", httpdate::fmt_http_date(SystemTime::from(now)));
        }
        self.shared.access_log.record(&AccessRecord {
            peer: self.peer,
            method: exchange.method,
            status: response.status,
            uri: exchange.uri.clone(),
            timestamp: now,
        });

        let write_mode = self.shared.write_mode;
        let frames = FrameEncoder::new(exchange.method == Some(Method::HEAD));
        let encoder = ResponseEncoder::new(write_mode);

        let result = match write_mode {
            WriteMode::Pipelined => {
                let (mut sink, drain) = queued(writer, frames);
                let encode = async move {
                    let encoded = encoder.write(response, &mut sink).await;
                    drop(sink);
                    encoded
                };
                let (encoded, drained) = tokio::join!(encode, drain);
                encoded.and(drained)
            }
            WriteMode::Acknowledged => {
                let mut sink = DirectSink::new(writer, frames);
                let encoded = encoder.write(response, &mut sink).await;
                let closed = sink.close().await;
                encoded.and(closed)
            }
        };

        if let Err(err) = result {
            tracing::warn!(peer = ?self.peer, uri = %exchange.uri, error = %err, "response aborted");
        }
    }
}

/// Forwards the remaining body events to a streaming request.
async fn feed<R>(reader: &mut Http1Reader<R>, assembler: &mut RequestAssembler) -> ServerResult<()>
where
    R: AsyncRead + Unpin + Send,
{
    loop {
        let event = reader.next_event().await.unwrap_or_else(truncated);
        if let Progress::Complete = assembler.push(event)? {
            return Ok(());
        }
    }
}

async fn invoke(handler: &dyn Handler, request: Request) -> HttpResponse {
    match AssertUnwindSafe(async move { handler.handle(request).await })
        .catch_unwind()
        .await
    {
        Ok(response) => response,
        Err(panic) => {
            let message = if let Some(msg) = panic.downcast_ref::<&str>() {
                msg.to_string()
            } else if let Some(msg) = panic.downcast_ref::<String>() {
                msg.clone()
            } else {
                "Unknown panic".to_string()
            };
            tracing::warn!(panic = %message, "handler panicked");
            Err(ServerError::Panic(message))
        }
    }
}

fn truncated() -> RequestEvent {
    RequestEvent::Error(ServerError::Transport(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "connection closed during request",
    )))
}
