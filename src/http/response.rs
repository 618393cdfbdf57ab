use crate::error::ServerError;
use crate::http::body::{ByteStream, Charset, MessageBody};
use crate::http::Method;
use bytes::Bytes;
use serde::Serialize;

#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: MessageBody,
}

impl Response {
    pub fn new(status: u16) -> Response {
        Response {
            status,
            headers: Vec::new(),
            body: MessageBody::Empty,
        }
    }

    // Chainable status setter
    pub fn status(&mut self, status: u16) -> &mut Self {
        self.status = status;
        self
    }

    pub fn body<B: Into<MessageBody>>(&mut self, body: B) -> &mut Self {
        self.body = body.into();
        self
    }

    /// Sets a header, replacing any existing value with the same case-insensitive name.
    pub fn header<K: AsRef<str>, V: AsRef<str>>(&mut self, name: K, value: V) -> &mut Self {
        let name = name.as_ref();
        let value = value.as_ref().to_string();
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name.to_string(), value)),
        }
        self
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn reason(&self) -> &'static str {
        reason_phrase(self.status)
    }

    // Static constructors for common responses
    pub fn ok() -> Response {
        Response::new(200)
    }

    pub fn json<T>(value: T) -> Response
    where
        T: Serialize + Send + Sync + 'static,
    {
        let mut response = Response::new(200);
        response
            .header("Content-Type", "application/json; charset=utf-8")
            .body(MessageBody::json(value));
        response
    }

    pub fn text<T: Into<String>>(content: T) -> Response {
        Response::text_with_charset(content, Charset::Utf8)
    }

    pub fn text_with_charset<T: Into<String>>(content: T, charset: Charset) -> Response {
        let mut response = Response::new(200);
        response
            .header("Content-Type", format!("text/plain; charset={}", charset.label()))
            .body(MessageBody::Text {
                content: content.into(),
                charset,
            });
        response
    }

    pub fn bytes<B: Into<Bytes>>(content: B) -> Response {
        let mut response = Response::new(200);
        response
            .header("Content-Type", "application/octet-stream")
            .body(MessageBody::Buffer(content.into()));
        response
    }

    pub fn stream(content_type: &str, stream: ByteStream) -> Response {
        let mut response = Response::new(200);
        response
            .header("Content-Type", content_type)
            .body(MessageBody::Stream(stream));
        response
    }

    pub fn no_content() -> Response {
        Response::new(204)
    }

    pub fn not_found() -> Response {
        Response::error(ServerError::NotFound)
    }

    pub fn method_not_allowed(allowed_methods: &[Method]) -> Response {
        Response::error(ServerError::MethodNotAllowed {
            allowed: allowed_methods.to_vec(),
        })
    }

    /// Minimal JSON error response; 405s also carry an `Allow` header.
    pub fn error(err: ServerError) -> Response {
        let status = err.status_code();
        let mut response = Response::json(serde_json::json!({
            "error": {
                "message": err.to_string(),
                "status": status
            }
        }));
        response.status(status);
        if let ServerError::MethodNotAllowed { allowed } = &err {
            let allow = allowed
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            response.header("Allow", allow);
        }
        response
    }

    pub fn file_download(&mut self, filename: &str, content_type: &str) -> &mut Self {
        self.header("Content-Type", content_type)
            .header("Content-Disposition", format!("attachment; filename=\"{}\"", filename))
    }
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
