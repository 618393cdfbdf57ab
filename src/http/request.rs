use crate::error::{ServerError, ServerResult};
use crate::http::body::{ByteStream, MessageBody};
use crate::router::Params;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

#[derive(Eq, Hash, PartialEq, Copy, Clone, Debug)]
pub enum Method {
    GET,
    POST,
    PUT,
    DELETE,
    HEAD,
    CONNECT,
    OPTIONS,
    TRACE,
    PATCH,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::CONNECT => "CONNECT",
            Method::OPTIONS => "OPTIONS",
            Method::TRACE => "TRACE",
            Method::PATCH => "PATCH",
        }
    }
}

impl FromStr for Method {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Method::GET),
            "POST" => Ok(Method::POST),
            "PUT" => Ok(Method::PUT),
            "DELETE" => Ok(Method::DELETE),
            "HEAD" => Ok(Method::HEAD),
            "CONNECT" => Ok(Method::CONNECT),
            "OPTIONS" => Ok(Method::OPTIONS),
            "TRACE" => Ok(Method::TRACE),
            "PATCH" => Ok(Method::PATCH),
            other => Err(ServerError::BadRequest(format!("unsupported method `{}`", other))),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request line and headers as delivered by the protocol reader.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: String,
    pub version: String,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
}

impl RequestHead {
    /// The URI without its query string.
    pub fn path(&self) -> &str {
        self.uri.split('?').next().unwrap_or("/")
    }

    pub fn query_string(&self) -> Option<&str> {
        self.uri.split_once('?').map(|(_, query)| query)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub uri: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub params: Params,
    pub headers: HashMap<String, String>,
    pub body: MessageBody,
    pub peer: Option<SocketAddr>,
}

impl Request {
    pub fn new(head: RequestHead, body: MessageBody) -> Self {
        let path = head.path().to_string();
        let query = head.query_string().map(parse_query).unwrap_or_default();
        Request {
            method: head.method,
            uri: head.uri,
            path,
            query,
            params: Params::default(),
            headers: head.headers,
            body,
            peer: None,
        }
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Buffered body bytes. Fails for streamed bodies, which must be read with [`Request::take_stream`].
    pub fn bytes(&self) -> ServerResult<&[u8]> {
        self.body.as_bytes().ok_or_else(|| {
            ServerError::BadRequest("request body is not buffered".to_string())
        })
    }

    pub fn text(&self) -> ServerResult<String> {
        Ok(String::from_utf8_lossy(self.bytes()?).into_owned())
    }

    pub fn json<T>(&self) -> ServerResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(self.bytes()?)
            .map_err(|e| ServerError::BadRequest(format!("invalid JSON body: {}", e)))
    }

    /// Takes the body as a stream, leaving `Empty` behind. Buffered bodies become a one-chunk stream.
    pub fn take_stream(&mut self) -> ByteStream {
        match std::mem::take(&mut self.body) {
            MessageBody::Stream(stream) => stream,
            MessageBody::Buffer(bytes) => ByteStream::from_chunks(Some(bytes)),
            MessageBody::Raw(data) => ByteStream::from_chunks(Some(Bytes::from(data))),
            MessageBody::Empty => ByteStream::from_chunks(None),
            other => {
                self.body = other;
                ByteStream::from_chunks(None)
            }
        }
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            let value = parts.next().unwrap_or("");
            Some((decode(key), decode(value)))
        })
        .collect()
}

fn decode(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    match urlencoding::decode(&raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw,
    }
}
