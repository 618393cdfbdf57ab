use crate::config::WriteMode;
use crate::error::{ServerError, ServerResult};
use crate::http::{reason_phrase, Frame, MessageBody, Response, ResponseHead, StreamElement};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::StreamExt;

/// Destination for the frames of one response.
pub trait ResponseSink: Send {
    fn send(&mut self, frame: Frame) -> BoxFuture<'_, ServerResult<()>>;
    fn flush(&mut self) -> BoxFuture<'_, ServerResult<()>>;
}

/// Turns a [`Response`] into head, body and end frames.
///
/// The end frame is only sent after the whole body was produced. A failing
/// body (serialization error, stream error, stream dropped without end)
/// leaves the response without its terminating marker and the error is
/// returned to the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseEncoder {
    write_mode: WriteMode,
}

impl ResponseEncoder {
    pub fn new(write_mode: WriteMode) -> Self {
        Self { write_mode }
    }

    pub async fn write<S>(&self, response: Response, sink: &mut S) -> ServerResult<()>
    where
        S: ResponseSink + ?Sized,
    {
        let Response {
            status,
            headers,
            body,
        } = response;

        sink.send(Frame::Head(ResponseHead {
            status,
            reason: reason_phrase(status),
            headers,
        }))
        .await?;
        if self.write_mode == WriteMode::Acknowledged {
            sink.flush().await?;
        }

        match self.write_body(body, sink).await {
            Ok(()) => {
                sink.send(Frame::End).await?;
                sink.flush().await
            }
            Err(err) => {
                // Bytes already queued still go out before the connection closes.
                if let Err(flush_err) = sink.flush().await {
                    tracing::trace!(error = %flush_err, "flush after failed body");
                }
                Err(err)
            }
        }
    }

    async fn write_body<S>(&self, body: MessageBody, sink: &mut S) -> ServerResult<()>
    where
        S: ResponseSink + ?Sized,
    {
        match body {
            MessageBody::Empty => Ok(()),
            MessageBody::Buffer(bytes) => sink.send(Frame::Body(bytes)).await,
            MessageBody::Raw(bytes) => sink.send(Frame::Body(Bytes::from(bytes))).await,
            MessageBody::Text { content, charset } => {
                let encoded = charset.encode(&content)?;
                sink.send(Frame::Body(encoded)).await
            }
            MessageBody::Structured(value) => {
                let json = value.to_pretty_json()?;
                sink.send(Frame::Body(Bytes::from(json))).await
            }
            MessageBody::Stream(mut stream) => loop {
                match stream.next().await {
                    Some(StreamElement::Chunk(chunk)) => {
                        sink.send(Frame::Body(chunk)).await?;
                        if self.write_mode == WriteMode::Acknowledged {
                            sink.flush().await?;
                        }
                    }
                    Some(StreamElement::Error(err)) => return Err(err),
                    Some(StreamElement::End) => return Ok(()),
                    None => {
                        return Err(ServerError::Stream(
                            "body stream ended without a terminal element".to_string(),
                        ))
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{ByteStream, Charset};
    use futures::future;
    use serde::{Serialize, Serializer};

    #[derive(Debug, PartialEq)]
    enum Recorded {
        Head(u16),
        Chunk(Vec<u8>),
        End,
        Flush,
    }

    #[derive(Default)]
    struct RecordingSink {
        log: Vec<Recorded>,
    }

    impl RecordingSink {
        fn chunks(&self) -> Vec<u8> {
            self.log
                .iter()
                .filter_map(|entry| match entry {
                    Recorded::Chunk(bytes) => Some(bytes.clone()),
                    _ => None,
                })
                .flatten()
                .collect()
        }
    }

    impl ResponseSink for RecordingSink {
        fn send(&mut self, frame: Frame) -> BoxFuture<'_, ServerResult<()>> {
            self.log.push(match frame {
                Frame::Head(head) => Recorded::Head(head.status),
                Frame::Body(bytes) => Recorded::Chunk(bytes.to_vec()),
                Frame::End => Recorded::End,
            });
            Box::pin(future::ready(Ok(())))
        }

        fn flush(&mut self) -> BoxFuture<'_, ServerResult<()>> {
            self.log.push(Recorded::Flush);
            Box::pin(future::ready(Ok(())))
        }
    }

    async fn encode(response: Response) -> (RecordingSink, ServerResult<()>) {
        let mut sink = RecordingSink::default();
        let result = ResponseEncoder::default().write(response, &mut sink).await;
        (sink, result)
    }

    #[tokio::test]
    async fn empty_body_writes_head_and_end() {
        let (sink, result) = encode(Response::new(200)).await;
        assert!(result.is_ok());
        assert_eq!(sink.log, vec![Recorded::Head(200), Recorded::End, Recorded::Flush]);
    }

    #[tokio::test]
    async fn stream_chunks_in_order_then_end() {
        let stream = ByteStream::from_chunks(vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]);
        let (sink, result) = encode(Response::stream("text/plain", stream)).await;
        assert!(result.is_ok());
        assert_eq!(
            sink.log,
            vec![
                Recorded::Head(200),
                Recorded::Chunk(b"one".to_vec()),
                Recorded::Chunk(b"two".to_vec()),
                Recorded::End,
                Recorded::Flush,
            ]
        );
    }

    #[tokio::test]
    async fn stream_error_skips_terminator() {
        let stream = ByteStream::new(futures::stream::iter(vec![
            StreamElement::Chunk(Bytes::from_static(b"partial")),
            StreamElement::Error(ServerError::Stream("disk gone".to_string())),
            StreamElement::End,
        ]));
        let (sink, result) = encode(Response::stream("text/plain", stream)).await;
        assert!(matches!(result, Err(ServerError::Stream(msg)) if msg == "disk gone"));
        assert_eq!(
            sink.log,
            vec![Recorded::Head(200), Recorded::Chunk(b"partial".to_vec()), Recorded::Flush]
        );
    }

    #[tokio::test]
    async fn dropped_stream_is_an_error() {
        let (sender, stream) = ByteStream::channel();
        sender.send_chunk(Bytes::from_static(b"a"));
        drop(sender);
        let (sink, result) = encode(Response::stream("text/plain", stream)).await;
        assert!(matches!(result, Err(ServerError::Stream(_))));
        assert!(!sink.log.contains(&Recorded::End));
    }

    #[tokio::test]
    async fn acknowledged_mode_flushes_each_chunk() {
        let stream = ByteStream::from_chunks(vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
        let mut sink = RecordingSink::default();
        ResponseEncoder::new(WriteMode::Acknowledged)
            .write(Response::stream("text/plain", stream), &mut sink)
            .await
            .unwrap();
        assert_eq!(
            sink.log,
            vec![
                Recorded::Head(200),
                Recorded::Flush,
                Recorded::Chunk(b"a".to_vec()),
                Recorded::Flush,
                Recorded::Chunk(b"b".to_vec()),
                Recorded::Flush,
                Recorded::End,
                Recorded::Flush,
            ]
        );
    }

    #[tokio::test]
    async fn structured_body_is_pretty_json() {
        let value = serde_json::json!({ "news": ["a", "b"], "count": 2 });
        let (sink, result) = encode(Response::json(value.clone())).await;
        assert!(result.is_ok());
        let written = sink.chunks();
        assert!(String::from_utf8(written.clone()).unwrap().contains('\n'));
        let decoded: serde_json::Value = serde_json::from_slice(&written).unwrap();
        assert_eq!(decoded, value);
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("not representable"))
        }
    }

    #[tokio::test]
    async fn serialization_failure_aborts_write() {
        let (sink, result) = encode(Response::json(Unserializable)).await;
        assert!(matches!(result, Err(ServerError::Serialization(_))));
        assert_eq!(sink.log, vec![Recorded::Head(200), Recorded::Flush]);
    }

    #[tokio::test]
    async fn text_uses_declared_charset() {
        let (sink, result) = encode(Response::text_with_charset("hé", Charset::Latin1)).await;
        assert!(result.is_ok());
        assert_eq!(sink.chunks(), vec![b'h', 0xe9]);

        let (_, result) = encode(Response::text_with_charset("snake 🐍", Charset::Latin1)).await;
        assert!(matches!(result, Err(ServerError::Serialization(_))));
    }

    #[tokio::test]
    async fn buffer_and_raw_are_single_chunks() {
        let (sink, _) = encode(Response::bytes(Bytes::from_static(b"\x00\x01"))).await;
        assert_eq!(sink.log[1], Recorded::Chunk(vec![0, 1]));

        let mut response = Response::new(200);
        response.body(MessageBody::Raw(b"raw".to_vec()));
        let (sink, _) = encode(response).await;
        assert_eq!(sink.log[1], Recorded::Chunk(b"raw".to_vec()));
    }
}
