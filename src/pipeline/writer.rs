use crate::error::{ServerError, ServerResult};
use crate::http::{Frame, FrameEncoder};
use crate::pipeline::encoder::ResponseSink;
use bytes::BytesMut;
use futures::channel::mpsc;
use futures::future::{self, BoxFuture};
use futures::StreamExt;
use std::future::Future;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Writes every frame to the socket before returning.
pub struct DirectSink<W> {
    writer: W,
    encoder: FrameEncoder,
    buf: BytesMut,
}

impl<W> DirectSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W, encoder: FrameEncoder) -> Self {
        Self {
            writer,
            encoder,
            buf: BytesMut::with_capacity(8 * 1024),
        }
    }

    pub async fn close(mut self) -> ServerResult<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

impl<W> ResponseSink for DirectSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn send(&mut self, frame: Frame) -> BoxFuture<'_, ServerResult<()>> {
        Box::pin(async move {
            self.encoder.encode(frame, &mut self.buf);
            if !self.buf.is_empty() {
                self.writer.write_all(&self.buf).await?;
                self.buf.clear();
            }
            Ok(())
        })
    }

    fn flush(&mut self) -> BoxFuture<'_, ServerResult<()>> {
        Box::pin(async move {
            self.writer.flush().await?;
            Ok(())
        })
    }
}

/// Hands frames to a drain without waiting for the network.
#[derive(Debug)]
pub struct QueuedSink {
    tx: mpsc::UnboundedSender<Frame>,
}

impl ResponseSink for QueuedSink {
    fn send(&mut self, frame: Frame) -> BoxFuture<'_, ServerResult<()>> {
        let sent = self.tx.unbounded_send(frame).map_err(|_| {
            ServerError::Transport(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "connection writer has stopped",
            ))
        });
        Box::pin(future::ready(sent))
    }

    fn flush(&mut self) -> BoxFuture<'_, ServerResult<()>> {
        Box::pin(future::ready(Ok(())))
    }
}

/// Splits a writer into a non-blocking sink and the future that drains it.
///
/// The drain writes frames in the order they were sent. Once every sink is
/// dropped it flushes and shuts the writer down; the first write failure
/// stops it and makes further sends fail.
pub fn queued<W>(
    mut writer: W,
    mut encoder: FrameEncoder,
) -> (QueuedSink, impl Future<Output = ServerResult<()>> + Send)
where
    W: AsyncWrite + Unpin + Send,
{
    let (tx, mut rx) = mpsc::unbounded::<Frame>();
    let drain = async move {
        let mut buf = BytesMut::with_capacity(8 * 1024);
        while let Some(frame) = rx.next().await {
            encoder.encode(frame, &mut buf);
            if !buf.is_empty() {
                writer.write_all(&buf).await?;
                buf.clear();
            }
        }
        writer.flush().await?;
        writer.shutdown().await?;
        Ok(())
    };
    (QueuedSink { tx }, drain)
}
