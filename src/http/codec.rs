//! HTTP/1.1 framing over a byte stream.
//!
//! [`Http1Reader`] turns an incoming connection into [`RequestEvent`]s
//! (head, body fragments, end) and [`FrameEncoder`] serializes outgoing
//! [`Frame`]s. Every response is written with `Connection: close`.

use crate::error::ServerError;
use crate::http::request::{Method, RequestHead};
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use std::io::{self, ErrorKind};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

#[derive(Debug)]
pub enum RequestEvent {
    Head(RequestHead),
    Body(Bytes),
    End,
    Error(ServerError),
}

#[derive(Debug, Clone, Copy)]
pub struct ReadLimits {
    pub max_head_size: usize,
    pub read_chunk_size: usize,
}

impl Default for ReadLimits {
    fn default() -> Self {
        Self {
            max_head_size: 16 * 1024,
            read_chunk_size: 8 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Head,
    Fixed(u64),
    ChunkSize,
    ChunkData(u64),
    Done,
}

pub struct Http1Reader<R> {
    reader: BufReader<R>,
    limits: ReadLimits,
    state: ReadState,
}

impl<R: AsyncRead + Unpin> Http1Reader<R> {
    pub fn new(reader: R, limits: ReadLimits) -> Self {
        Self {
            reader: BufReader::new(reader),
            limits,
            state: ReadState::Head,
        }
    }

    /// Next protocol event, or `None` once the request is complete or the
    /// peer closed the connection before sending a request line.
    pub async fn next_event(&mut self) -> Option<RequestEvent> {
        let result = match self.state {
            ReadState::Done => return None,
            ReadState::Head => match self.read_head().await {
                Ok(Some(head)) => Ok(RequestEvent::Head(head)),
                Ok(None) => {
                    self.state = ReadState::Done;
                    return None;
                }
                Err(err) => Err(err),
            },
            ReadState::Fixed(0) => {
                self.state = ReadState::Done;
                Ok(RequestEvent::End)
            }
            ReadState::Fixed(remaining) => self.read_fixed(remaining).await,
            ReadState::ChunkSize => self.read_chunk_size().await,
            ReadState::ChunkData(remaining) => self.read_chunk_data(remaining).await,
        };

        Some(result.unwrap_or_else(|err| {
            self.state = ReadState::Done;
            RequestEvent::Error(err)
        }))
    }

    async fn read_head(&mut self) -> Result<Option<RequestHead>, ServerError> {
        let mut budget = self.limits.max_head_size as u64;

        let request_line = loop {
            match self.read_line(&mut budget).await? {
                None => return Ok(None),
                // Stray CRLFs ahead of the request line are ignored.
                Some(line) if line.is_empty() => continue,
                Some(line) => break line,
            }
        };

        let mut parts = request_line.split_whitespace();
        let method: Method = parts
            .next()
            .ok_or_else(|| bad_request("missing method"))?
            .parse()?;
        let uri = parts
            .next()
            .ok_or_else(|| bad_request("missing request target"))?
            .to_string();
        let version = parts.next().unwrap_or("HTTP/1.0").to_string();
        if !version.starts_with("HTTP/1.") {
            return Err(bad_request(&format!("unsupported protocol version {}", version)));
        }

        let mut headers = HashMap::new();
        loop {
            let line = self
                .read_line(&mut budget)
                .await?
                .ok_or_else(|| ServerError::Transport(ErrorKind::UnexpectedEof.into()))?;
            if line.is_empty() {
                break;
            }
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| bad_request("malformed header line"))?;
            headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        self.state = body_state(&headers)?;

        Ok(Some(RequestHead {
            method,
            uri,
            version,
            headers,
        }))
    }

    /// Reads one CRLF- or LF-terminated line without its terminator.
    async fn read_line(&mut self, budget: &mut u64) -> Result<Option<String>, ServerError> {
        let mut line = String::new();
        let read = (&mut self.reader)
            .take(*budget)
            .read_line(&mut line)
            .await
            .map_err(|err| match err.kind() {
                ErrorKind::InvalidData => bad_request("request head is not valid UTF-8"),
                _ => ServerError::Transport(err),
            })?;

        if read == 0 {
            if *budget == 0 {
                return Err(bad_request("request head too large"));
            }
            return Ok(None);
        }
        *budget -= read as u64;

        if !line.ends_with('\n') {
            if *budget == 0 {
                return Err(bad_request("request head too large"));
            }
            return Err(ServerError::Transport(ErrorKind::UnexpectedEof.into()));
        }
        let trimmed = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }

    async fn read_fragment(&mut self, remaining: u64) -> Result<Bytes, ServerError> {
        let want = remaining.min(self.limits.read_chunk_size.max(1) as u64) as usize;
        let mut buf = vec![0u8; want];
        let read = self.reader.read(&mut buf).await?;
        if read == 0 {
            return Err(ServerError::Transport(io::Error::new(
                ErrorKind::UnexpectedEof,
                "connection closed before end of body",
            )));
        }
        buf.truncate(read);
        Ok(Bytes::from(buf))
    }

    async fn read_fixed(&mut self, remaining: u64) -> Result<RequestEvent, ServerError> {
        let fragment = self.read_fragment(remaining).await?;
        self.state = ReadState::Fixed(remaining - fragment.len() as u64);
        Ok(RequestEvent::Body(fragment))
    }

    async fn read_chunk_size(&mut self) -> Result<RequestEvent, ServerError> {
        let mut budget = self.limits.max_head_size as u64;
        let line = self
            .read_line(&mut budget)
            .await?
            .ok_or_else(|| ServerError::Transport(ErrorKind::UnexpectedEof.into()))?;
        let size = line.split(';').next().unwrap_or("").trim();
        let size = u64::from_str_radix(size, 16)
            .map_err(|_| bad_request("invalid chunk size"))?;

        if size == 0 {
            // Trailer fields are read and discarded.
            loop {
                let trailer = self
                    .read_line(&mut budget)
                    .await?
                    .ok_or_else(|| ServerError::Transport(ErrorKind::UnexpectedEof.into()))?;
                if trailer.is_empty() {
                    break;
                }
            }
            self.state = ReadState::Done;
            return Ok(RequestEvent::End);
        }

        self.state = ReadState::ChunkData(size);
        self.read_chunk_data(size).await
    }

    async fn read_chunk_data(&mut self, remaining: u64) -> Result<RequestEvent, ServerError> {
        let fragment = self.read_fragment(remaining).await?;
        let left = remaining - fragment.len() as u64;
        if left == 0 {
            let mut crlf = [0u8; 2];
            self.reader.read_exact(&mut crlf).await?;
            if &crlf != b"\r\n" {
                return Err(bad_request("chunk not terminated by CRLF"));
            }
            self.state = ReadState::ChunkSize;
        } else {
            self.state = ReadState::ChunkData(left);
        }
        Ok(RequestEvent::Body(fragment))
    }
}

fn body_state(headers: &HashMap<String, String>) -> Result<ReadState, ServerError> {
    if let Some(encoding) = headers.get("transfer-encoding") {
        if encoding
            .rsplit(',')
            .next()
            .map(|last| last.trim().eq_ignore_ascii_case("chunked"))
            .unwrap_or(false)
        {
            return Ok(ReadState::ChunkSize);
        }
        return Err(bad_request("unsupported transfer encoding"));
    }
    match headers.get("content-length") {
        Some(length) => length
            .trim()
            .parse::<u64>()
            .map(ReadState::Fixed)
            .map_err(|_| bad_request("invalid content-length")),
        None => Ok(ReadState::Fixed(0)),
    }
}

fn bad_request(msg: &str) -> ServerError {
    ServerError::BadRequest(msg.to_string())
}

#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: &'static str,
    pub headers: Vec<(String, String)>,
}

#[derive(Debug)]
pub enum Frame {
    Head(ResponseHead),
    Body(Bytes),
    End,
}

/// Serializes response frames. Without an explicit `Content-Length` the body
/// is chunked and the end frame is the zero-length chunk.
#[derive(Debug, Default)]
pub struct FrameEncoder {
    suppress_body: bool,
    chunked: bool,
}

impl FrameEncoder {
    /// `suppress_body` drops all body bytes, as required for `HEAD` responses.
    pub fn new(suppress_body: bool) -> Self {
        Self {
            suppress_body,
            chunked: false,
        }
    }

    pub fn encode(&mut self, frame: Frame, dst: &mut BytesMut) {
        match frame {
            Frame::Head(head) => self.encode_head(head, dst),
            Frame::Body(chunk) => {
                if self.suppress_body || chunk.is_empty() {
                    return;
                }
                if self.chunked {
                    dst.put_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
                    dst.put_slice(&chunk);
                    dst.put_slice(b"\r\n");
                } else {
                    dst.put_slice(&chunk);
                }
            }
            Frame::End => {
                if self.chunked {
                    dst.put_slice(b"0\r\n\r\n");
                }
            }
        }
    }

    fn encode_head(&mut self, head: ResponseHead, dst: &mut BytesMut) {
        let bodiless = head.status < 200 || head.status == 204 || head.status == 304;
        let has_length = head
            .headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-length"));
        if bodiless {
            self.suppress_body = true;
        }
        self.chunked = !self.suppress_body && !has_length;

        dst.put_slice(format!("HTTP/1.1 {} {}\r\n", head.status, head.reason).as_bytes());
        for (name, value) in &head.headers {
            if name.eq_ignore_ascii_case("connection") || name.eq_ignore_ascii_case("transfer-encoding") {
                continue;
            }
            dst.put_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        if self.chunked {
            dst.put_slice(b"Transfer-Encoding: chunked\r\n");
        }
        dst.put_slice(b"Connection: close\r\n\r\n");
    }
}
