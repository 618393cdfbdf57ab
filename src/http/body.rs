use crate::error::{ServerError, ServerResult};
use bytes::{Bytes, BytesMut};
use futures::channel::mpsc;
use futures::stream::{Stream, StreamExt};
use serde::Serialize;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Character sets a text body can be declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
    Latin1,
    Ascii,
}

impl Charset {
    /// Name used in `Content-Type` parameters.
    pub fn label(&self) -> &'static str {
        match self {
            Charset::Utf8 => "utf-8",
            Charset::Utf16Le => "utf-16le",
            Charset::Utf16Be => "utf-16be",
            Charset::Latin1 => "iso-8859-1",
            Charset::Ascii => "us-ascii",
        }
    }

    pub fn encode(&self, text: &str) -> ServerResult<Bytes> {
        match self {
            Charset::Utf8 => Ok(Bytes::copy_from_slice(text.as_bytes())),
            Charset::Utf16Le => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
            Charset::Utf16Be => Ok(text.encode_utf16().flat_map(u16::to_be_bytes).collect()),
            Charset::Latin1 => self.encode_single_byte(text, 0xff),
            Charset::Ascii => self.encode_single_byte(text, 0x7f),
        }
    }

    fn encode_single_byte(&self, text: &str, max: u32) -> ServerResult<Bytes> {
        let mut out = BytesMut::with_capacity(text.len());
        for c in text.chars() {
            let code = c as u32;
            if code > max {
                return Err(ServerError::Serialization(format!(
                    "character {:?} cannot be encoded as {}",
                    c,
                    self.label()
                )));
            }
            out.extend_from_slice(&[code as u8]);
        }
        Ok(out.freeze())
    }
}

/// A value that can be rendered as pretty-printed JSON when the response is written.
pub trait StructuredBody: Send + Sync {
    fn to_pretty_json(&self) -> serde_json::Result<Vec<u8>>;
}

impl<T> StructuredBody for T
where
    T: Serialize + Send + Sync,
{
    fn to_pretty_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }
}

/// One element of a [`ByteStream`].
#[derive(Debug)]
pub enum StreamElement {
    Chunk(Bytes),
    Error(ServerError),
    End,
}

/// A lazily produced sequence of body chunks terminated by `End` or `Error`.
///
/// A stream that is exhausted without yielding either terminal element is
/// treated as aborted by its producer.
pub struct ByteStream {
    inner: Pin<Box<dyn Stream<Item = StreamElement> + Send>>,
}

impl ByteStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = StreamElement> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Adapts a fallible chunk stream, appending `End` once it is exhausted.
    pub fn from_results<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: fmt::Display,
    {
        let elements = stream
            .map(|item| match item {
                Ok(chunk) => StreamElement::Chunk(chunk),
                Err(err) => StreamElement::Error(ServerError::stream(err)),
            })
            .chain(futures::stream::once(async { StreamElement::End }));
        Self::new(elements)
    }

    pub fn from_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Bytes>,
        I::IntoIter: Send + 'static,
    {
        let elements = futures::stream::iter(chunks.into_iter().map(StreamElement::Chunk))
            .chain(futures::stream::once(async { StreamElement::End }));
        Self::new(elements)
    }

    /// Creates a stream fed from the returned sender.
    pub fn channel() -> (ByteStreamSender, ByteStream) {
        let (tx, rx) = mpsc::unbounded();
        (ByteStreamSender { tx }, ByteStream::new(rx))
    }

    /// Drains the stream into one buffer.
    pub async fn read_all(mut self) -> ServerResult<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(element) = self.next().await {
            match element {
                StreamElement::Chunk(chunk) => buf.extend_from_slice(&chunk),
                StreamElement::Error(err) => return Err(err),
                StreamElement::End => return Ok(buf.freeze()),
            }
        }
        Err(ServerError::Stream("stream closed before end of body".to_string()))
    }
}

impl Stream for ByteStream {
    type Item = StreamElement;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ByteStream")
    }
}

/// Producer half of [`ByteStream::channel`]. Sends never wait for the consumer.
#[derive(Debug, Clone)]
pub struct ByteStreamSender {
    tx: mpsc::UnboundedSender<StreamElement>,
}

impl ByteStreamSender {
    /// Returns false once the consuming stream has been dropped.
    pub fn send_chunk(&self, chunk: Bytes) -> bool {
        self.tx.unbounded_send(StreamElement::Chunk(chunk)).is_ok()
    }

    pub fn send_error(&self, err: ServerError) -> bool {
        let sent = self.tx.unbounded_send(StreamElement::Error(err)).is_ok();
        self.tx.close_channel();
        sent
    }

    pub fn finish(&self) -> bool {
        let sent = self.tx.unbounded_send(StreamElement::End).is_ok();
        self.tx.close_channel();
        sent
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The body of a request or response.
pub enum MessageBody {
    Empty,
    Buffer(Bytes),
    Raw(Vec<u8>),
    Text { content: String, charset: Charset },
    Structured(Box<dyn StructuredBody>),
    Stream(ByteStream),
}

impl MessageBody {
    pub fn text<T: Into<String>>(content: T) -> Self {
        MessageBody::Text {
            content: content.into(),
            charset: Charset::Utf8,
        }
    }

    pub fn json<T>(value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        MessageBody::Structured(Box::new(value))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, MessageBody::Empty)
    }

    /// Bytes of an already buffered body, `None` for structured and streamed bodies.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            MessageBody::Empty => Some(&[]),
            MessageBody::Buffer(bytes) => Some(bytes),
            MessageBody::Raw(data) => Some(data),
            MessageBody::Text {
                content,
                charset: Charset::Utf8,
            } => Some(content.as_bytes()),
            _ => None,
        }
    }
}

impl Default for MessageBody {
    fn default() -> Self {
        MessageBody::Empty
    }
}

impl fmt::Debug for MessageBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageBody::Empty => f.write_str("Empty"),
            MessageBody::Buffer(bytes) => write!(f, "Buffer({} bytes)", bytes.len()),
            MessageBody::Raw(data) => write!(f, "Raw({} bytes)", data.len()),
            MessageBody::Text { content, charset } => f
                .debug_struct("Text")
                .field("content", content)
                .field("charset", charset)
                .finish(),
            MessageBody::Structured(_) => f.write_str("Structured"),
            MessageBody::Stream(stream) => write!(f, "Stream({:?})", stream),
        }
    }
}

impl From<Bytes> for MessageBody {
    fn from(bytes: Bytes) -> Self {
        MessageBody::Buffer(bytes)
    }
}

impl From<Vec<u8>> for MessageBody {
    fn from(data: Vec<u8>) -> Self {
        MessageBody::Raw(data)
    }
}

impl From<String> for MessageBody {
    fn from(content: String) -> Self {
        MessageBody::text(content)
    }
}

impl From<&str> for MessageBody {
    fn from(content: &str) -> Self {
        MessageBody::text(content)
    }
}

impl From<ByteStream> for MessageBody {
    fn from(stream: ByteStream) -> Self {
        MessageBody::Stream(stream)
    }
}
