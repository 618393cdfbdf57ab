use crate::config::TlsError;
use crate::http::Method;
use std::io;
use thiserror::Error;

/// Reasons a route template is rejected at registration time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("route template is empty")]
    Empty,

    #[error("route template `{0}` contains an empty segment")]
    EmptySegment(String),

    #[error("route template `{0}` has a wildcard that is not the final segment")]
    MisplacedWildcard(String),

    #[error("route template `{template}` declares parameter `{name}` more than once")]
    DuplicateParameter { template: String, name: String },

    #[error("route template `{template}` has an invalid parameter segment `{segment}`")]
    InvalidParameterName { template: String, segment: String },
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid route pattern: {0}")]
    InvalidPattern(#[from] PatternError),

    #[error("Not found")]
    NotFound,

    #[error("Method not allowed")]
    MethodNotAllowed { allowed: Vec<Method> },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large")]
    PayloadTooLarge,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Panic: {0}")]
    Panic(String),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),
}

impl ServerError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::BadRequest(_) => 400,
            ServerError::NotFound => 404,
            ServerError::MethodNotAllowed { .. } => 405,
            ServerError::PayloadTooLarge => 413,
            ServerError::InvalidPattern(_)
            | ServerError::Serialization(_)
            | ServerError::Stream(_)
            | ServerError::Transport(_)
            | ServerError::Internal(_)
            | ServerError::Panic(_)
            | ServerError::Tls(_) => 500,
        }
    }

    pub fn stream<E: std::fmt::Display>(err: E) -> Self {
        ServerError::Stream(err.to_string())
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::Serialization(err.to_string())
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
