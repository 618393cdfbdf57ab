#![allow(dead_code)]

use chrono::{DateTime, Local, TimeZone};
use snake_http::{AccessLog, AccessRecord, Clock, Service};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub fn peer() -> SocketAddr {
    "127.0.0.1:52814".parse().unwrap()
}

/// Writes `request` on a fresh in-memory connection and returns everything
/// the server wrote before closing it.
pub async fn exchange(service: &Service, request: &[u8]) -> Vec<u8> {
    let (mut client, server) = tokio::io::duplex(64 * 1024);
    let service = service.clone();
    let task = tokio::spawn(async move { service.serve_connection(server, Some(peer())).await });

    client.write_all(request).await.unwrap();
    client.shutdown().await.unwrap();
    let mut out = Vec::new();
    client.read_to_end(&mut out).await.unwrap();
    task.await.unwrap();
    out
}

pub struct Parsed {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Parsed {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_chunked(&self) -> bool {
        self.header("transfer-encoding") == Some("chunked")
    }
}

pub fn parse(raw: &[u8]) -> Parsed {
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response head terminator");
    let head = std::str::from_utf8(&raw[..split]).unwrap();
    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap();
    let status = status_line.split(' ').nth(1).unwrap().parse().unwrap();
    let headers = lines
        .map(|line| {
            let (key, value) = line.split_once(": ").unwrap();
            (key.to_string(), value.to_string())
        })
        .collect();
    Parsed {
        status,
        headers,
        body: raw[split + 4..].to_vec(),
    }
}

/// Decodes a chunked body. Returns the payload and whether the
/// zero-length terminating chunk was present.
pub fn dechunk(mut body: &[u8]) -> (Vec<u8>, bool) {
    let mut out = Vec::new();
    loop {
        let line_end = match body.windows(2).position(|w| w == b"\r\n") {
            Some(pos) => pos,
            None => return (out, false),
        };
        let size = usize::from_str_radix(std::str::from_utf8(&body[..line_end]).unwrap(), 16).unwrap();
        body = &body[line_end + 2..];
        if size == 0 {
            return (out, body == b"\r\n");
        }
        if body.len() < size + 2 {
            out.extend_from_slice(body);
            return (out, false);
        }
        out.extend_from_slice(&body[..size]);
        body = &body[size + 2..];
    }
}

#[derive(Clone, Default)]
pub struct RecordingLog {
    records: Arc<Mutex<Vec<AccessRecord>>>,
}

impl RecordingLog {
    pub fn records(&self) -> Vec<AccessRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl AccessLog for RecordingLog {
    fn record(&self, record: &AccessRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}

pub struct FixedClock(pub DateTime<Local>);

impl FixedClock {
    pub fn new() -> Self {
        FixedClock(Local.with_ymd_and_hms(2026, 10, 14, 15, 4, 5).unwrap())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        self.0
    }
}
