//! # snake-http
//!
//! A minimalist HTTP server framework: controllers declare route patterns
//! and handlers, the engine matches each request to the most specific route
//! and writes the handler's response body back, including live streams.
//!
//! ## Features
//!
//! - Route templates with literal, `{named}` and trailing `*` segments
//! - Buffered or streamed request bodies per route
//! - Empty, byte, text, JSON and streaming response bodies
//! - One request per connection, always closed after the response
//! - Access log through `tracing`, optional TLS through `rustls`
//!
//! ## Quick Start
//!
//! ```no_run
//! use snake_http::{json, Controller, Response, Server, ServerConfig};
//!
//! let mut news = Controller::new("/news");
//! news.get("/{query}", |req: snake_http::Request| async move {
//!     let query = req.param("query").unwrap_or_default().to_string();
//!     Ok(Response::json(json!({ "query": query })))
//! });
//!
//! let mut server = Server::new(ServerConfig::default());
//! server.register(news).unwrap();
//! server.listen().unwrap();
//! ```
//!
//! ## Streaming responses
//!
//! ```rust
//! use snake_http::{ByteStream, Response};
//! use bytes::Bytes;
//!
//! let body = ByteStream::from_chunks(vec![Bytes::from("a"), Bytes::from("b")]);
//! let response = Response::stream("text/plain", body);
//! assert_eq!(response.status, 200);
//! ```

pub mod access_log;
pub mod config;
pub mod controller;
pub mod error;
pub mod handler;
pub mod http;
pub mod pipeline;
pub mod router;
pub mod server;
pub extern crate serde_json;

pub use access_log::{AccessLog, AccessRecord, Clock, SystemClock, TracingAccessLog};
pub use config::{ServerConfig, TlsConfig, TlsError, WriteMode};
pub use controller::{Controller, IntoController};
pub use error::{PatternError, ServerError, ServerResult};
pub use handler::{Handler, HttpResponse, IntoResponse};
pub use http::{ByteStream, ByteStreamSender, Charset, MessageBody, Method, Request, Response, StreamElement};
pub use pipeline::{BodyMode, ConnectionState};
pub use router::{Methods, Params, RoutePattern, Router};
pub use server::{Server, Service};

// Reexport serde_json
pub use serde_json::{json, Value};
