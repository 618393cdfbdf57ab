use crate::error::{ServerError, ServerResult};
use crate::http::codec::RequestEvent;
use crate::http::{ByteStream, ByteStreamSender, MessageBody, Request, RequestHead};
use bytes::BytesMut;

/// How a route wants its request body delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyMode {
    /// The whole body is collected before the handler runs.
    #[default]
    Buffered,
    /// The handler runs as soon as the head arrives and reads the body as a `ByteStream`.
    Streaming,
}

#[derive(Debug)]
pub enum Progress {
    /// More events are needed before a request can be handed out.
    Pending,
    Ready(Request),
    /// A streamed request already handed out has received its last fragment.
    Complete,
}

enum State {
    AwaitingHead,
    Buffering { head: RequestHead, body: BytesMut },
    Streaming { sender: ByteStreamSender },
    Finished,
}

/// Builds one [`Request`] out of protocol events.
pub struct RequestAssembler {
    mode: BodyMode,
    max_buffered_body: usize,
    state: State,
}

impl RequestAssembler {
    pub fn new(mode: BodyMode, max_buffered_body: usize) -> Self {
        Self {
            mode,
            max_buffered_body,
            state: State::AwaitingHead,
        }
    }

    pub fn mode(&self) -> BodyMode {
        self.mode
    }

    /// Feeds one event. Errors abort the request; a streaming consumer sees them as a stream error.
    pub fn push(&mut self, event: RequestEvent) -> ServerResult<Progress> {
        match (std::mem::replace(&mut self.state, State::Finished), event) {
            (State::AwaitingHead, RequestEvent::Head(head)) => match self.mode {
                BodyMode::Buffered => {
                    let capacity = head
                        .header("content-length")
                        .and_then(|len| len.parse::<usize>().ok())
                        .unwrap_or(0);
                    if capacity > self.max_buffered_body {
                        return Err(ServerError::PayloadTooLarge);
                    }
                    self.state = State::Buffering {
                        head,
                        body: BytesMut::with_capacity(capacity),
                    };
                    Ok(Progress::Pending)
                }
                BodyMode::Streaming => {
                    let (sender, stream) = ByteStream::channel();
                    self.state = State::Streaming { sender };
                    Ok(Progress::Ready(Request::new(head, MessageBody::Stream(stream))))
                }
            },
            (State::Buffering { head, mut body }, RequestEvent::Body(fragment)) => {
                if body.len() + fragment.len() > self.max_buffered_body {
                    return Err(ServerError::PayloadTooLarge);
                }
                body.extend_from_slice(&fragment);
                self.state = State::Buffering { head, body };
                Ok(Progress::Pending)
            }
            (State::Buffering { head, body }, RequestEvent::End) => {
                let body = if body.is_empty() {
                    MessageBody::Empty
                } else {
                    MessageBody::Buffer(body.freeze())
                };
                Ok(Progress::Ready(Request::new(head, body)))
            }
            (State::Streaming { sender }, RequestEvent::Body(fragment)) => {
                // The handler may stop reading early; remaining fragments are discarded.
                sender.send_chunk(fragment);
                self.state = State::Streaming { sender };
                Ok(Progress::Pending)
            }
            (State::Streaming { sender }, RequestEvent::End) => {
                sender.finish();
                Ok(Progress::Complete)
            }
            (State::Streaming { sender }, RequestEvent::Error(err)) => {
                sender.send_error(ServerError::Stream(err.to_string()));
                Err(err)
            }
            (_, RequestEvent::Error(err)) => Err(err),
            (_, event) => Err(ServerError::BadRequest(format!(
                "unexpected protocol event {}",
                describe(&event)
            ))),
        }
    }
}

impl Drop for RequestAssembler {
    fn drop(&mut self) {
        if let State::Streaming { sender } = &self.state {
            sender.send_error(ServerError::Stream("request aborted".to_string()));
        }
    }
}

fn describe(event: &RequestEvent) -> &'static str {
    match event {
        RequestEvent::Head(_) => "head",
        RequestEvent::Body(_) => "body",
        RequestEvent::End => "end",
        RequestEvent::Error(_) => "error",
    }
}
