//! Access logging.
//!
//! One line per response, written when the response head is emitted:
//!
//! ```text
//! [127.0.0.1:52814] [October 14, 2026 at 3:04:05 PM] [GET] [200] /news/today
//! ```
//!
//! The clock is an explicit dependency so timestamps can be pinned in tests.

use crate::http::Method;
use chrono::{DateTime, Local};
use std::net::SocketAddr;
use std::sync::Arc;

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

#[derive(Debug, Clone)]
pub struct AccessRecord {
    pub peer: Option<SocketAddr>,
    /// `None` when the request line could not be parsed.
    pub method: Option<Method>,
    pub status: u16,
    pub uri: String,
    pub timestamp: DateTime<Local>,
}

impl AccessRecord {
    pub fn line(&self) -> String {
        let (ip, port) = match self.peer {
            Some(addr) => (addr.ip().to_string(), addr.port()),
            None => ("-".to_string(), 0),
        };
        let method = self.method.map(|m| m.as_str()).unwrap_or("-");
        format!(
            "[{}:{}] [{}] [{}] [{}] {}",
            ip,
            port,
            self.timestamp.format("%B %-d, %Y at %-I:%M:%S %p"),
            method,
            self.status,
            self.uri
        )
    }
}

pub trait AccessLog: Send + Sync + 'static {
    fn record(&self, record: &AccessRecord);
}

/// Emits access lines as `info` events under the `snake_http::access` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAccessLog;

impl AccessLog for TracingAccessLog {
    fn record(&self, record: &AccessRecord) {
        tracing::info!(target: "snake_http::access", "{}", record.line());
    }
}

impl<L: AccessLog + ?Sized> AccessLog for Arc<L> {
    fn record(&self, record: &AccessRecord) {
        (**self).record(record)
    }
}
