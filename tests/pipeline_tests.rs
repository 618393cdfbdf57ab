mod common;

use bytes::Bytes;
use common::{dechunk, exchange, parse, FixedClock, RecordingLog};
use serde::Deserialize;
use snake_http::handler::sync;
use snake_http::{
    json, ByteStream, Controller, Method, Methods, Request, Response, Server, ServerConfig,
    ServerError, Service, StreamElement, WriteMode,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn get_example() -> Controller {
    let mut get = Controller::new("/get");
    get.add_route("/", Methods::ANY, |_req| async {
        Ok(Response::json(json!({
            "code": 200,
            "method": "GET",
            "message": "success"
        })))
    });
    get.get("/empty", |_req| async { Ok(Response::ok()) });
    get.get("/sized", |_req| async {
        let mut response = Response::text("fixed");
        response.header("Content-Length", "5");
        Ok(response)
    });
    get.add_route("/panic", Method::GET, sync(|_req| panic!("handler blew up")));
    get.get("/fail", |_req| async {
        Err(ServerError::BadRequest("missing field".to_string()))
    });
    get
}

fn stream_example() -> Controller {
    let mut stream = Controller::new("/stream");
    stream.get("/two", |_req| async {
        let body = ByteStream::from_chunks(vec![Bytes::from("first,"), Bytes::from("second")]);
        Ok(Response::stream("text/plain", body))
    });
    stream.get("/broken", |_req| async {
        let body = ByteStream::new(futures::stream::iter(vec![
            StreamElement::Chunk(Bytes::from("partial")),
            StreamElement::Error(ServerError::Stream("producer failed".to_string())),
        ]));
        Ok(Response::stream("text/plain", body))
    });
    stream.get("/live", |_req| async {
        let (sender, body) = ByteStream::channel();
        tokio::spawn(async move {
            for n in 0..3 {
                sender.send_chunk(Bytes::from(format!("tick {}\n", n)));
                tokio::task::yield_now().await;
            }
            sender.finish();
        });
        Ok(Response::stream("text/plain", body))
    });
    stream
}

#[derive(Debug, Deserialize)]
struct Greeting {
    name: String,
}

fn post_example() -> Controller {
    let mut post = Controller::new("/post");
    post.post("/request", |req: Request| async move {
        let greeting: Greeting = req.json()?;
        Ok(Response::json(json!({
            "code": 200,
            "method": "POST",
            "message": format!("hello {}", greeting.name)
        })))
    });
    post
}

fn file_example() -> Controller {
    let mut file = Controller::new("/download/file");
    file.add_streaming_route("/", Methods::ANY, |mut req: Request| async move {
        let received = req.take_stream().read_all().await?;
        Ok(Response::json(json!({ "received": received.len() })))
    });
    file
}

fn service_with(config: ServerConfig) -> (Service, RecordingLog) {
    let log = RecordingLog::default();
    let mut server = Server::new(config);
    server
        .register(get_example())
        .unwrap()
        .register(stream_example())
        .unwrap()
        .register(post_example())
        .unwrap()
        .register(file_example())
        .unwrap();
    server.access_log(log.clone()).clock(FixedClock::new());
    (server.freeze(), log)
}

fn service() -> Service {
    service_with(ServerConfig::default()).0
}

#[tokio::test]
async fn structured_body_round_trips() {
    let raw = exchange(&service(), b"GET /get HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    let response = parse(&raw);
    assert_eq!(response.status, 200);
    assert_eq!(response.header("connection"), Some("close"));
    assert_eq!(response.header("content-type"), Some("application/json; charset=utf-8"));
    assert!(response.header("date").is_some());

    let (body, terminated) = dechunk(&response.body);
    assert!(terminated);
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value, json!({ "code": 200, "method": "GET", "message": "success" }));
}

#[tokio::test]
async fn empty_body_is_zero_length_and_closed() {
    let raw = exchange(&service(), b"GET /get/empty HTTP/1.1\r\n\r\n").await;
    let response = parse(&raw);
    assert_eq!(response.status, 200);
    assert!(response.is_chunked());
    assert_eq!(response.body, b"0\r\n\r\n");
}

#[tokio::test]
async fn explicit_content_length_is_sent_verbatim() {
    let raw = exchange(&service(), b"GET /get/sized HTTP/1.1\r\n\r\n").await;
    let response = parse(&raw);
    assert!(!response.is_chunked());
    assert_eq!(response.header("content-length"), Some("5"));
    assert_eq!(response.body, b"fixed");
}

#[tokio::test]
async fn head_request_carries_no_body() {
    let raw = exchange(&service(), b"HEAD /get HTTP/1.1\r\n\r\n").await;
    let response = parse(&raw);
    assert_eq!(response.status, 200);
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn stream_chunks_arrive_in_order_with_terminator() {
    let raw = exchange(&service(), b"GET /stream/two HTTP/1.1\r\n\r\n").await;
    let response = parse(&raw);
    assert_eq!(response.body, b"6\r\nfirst,\r\n6\r\nsecond\r\n0\r\n\r\n");
}

#[tokio::test]
async fn live_stream_from_another_task() {
    let raw = exchange(&service(), b"GET /stream/live HTTP/1.1\r\n\r\n").await;
    let (body, terminated) = dechunk(&parse(&raw).body);
    assert!(terminated);
    assert_eq!(body, b"tick 0\ntick 1\ntick 2\n");
}

#[tokio::test]
async fn stream_error_truncates_without_terminator() {
    let raw = exchange(&service(), b"GET /stream/broken HTTP/1.1\r\n\r\n").await;
    let response = parse(&raw);
    assert_eq!(response.status, 200);
    let (body, terminated) = dechunk(&response.body);
    assert_eq!(body, b"partial");
    assert!(!terminated);
}

#[tokio::test]
async fn acknowledged_mode_writes_the_same_bytes() {
    let (ack, _) = service_with(ServerConfig::default().write_mode(WriteMode::Acknowledged));
    let pipelined = exchange(&service(), b"GET /stream/two HTTP/1.1\r\n\r\n").await;
    let acknowledged = exchange(&ack, b"GET /stream/two HTTP/1.1\r\n\r\n").await;
    assert_eq!(parse(&pipelined).body, parse(&acknowledged).body);

    let broken = exchange(&ack, b"GET /stream/broken HTTP/1.1\r\n\r\n").await;
    assert!(!dechunk(&parse(&broken).body).1);
}

#[tokio::test]
async fn buffered_json_request_body() {
    let body = br#"{"name":"snake"}"#;
    let request = format!(
        "POST /post/request HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        std::str::from_utf8(body).unwrap()
    );
    let raw = exchange(&service(), request.as_bytes()).await;
    let response = parse(&raw);
    assert_eq!(response.status, 200);
    let value: serde_json::Value = serde_json::from_slice(&dechunk(&response.body).0).unwrap();
    assert_eq!(value["message"], "hello snake");
}

#[tokio::test]
async fn invalid_json_is_bad_request() {
    let raw = exchange(
        &service(),
        b"POST /post/request HTTP/1.1\r\nContent-Length: 3\r\n\r\n{{{",
    )
    .await;
    assert_eq!(parse(&raw).status, 400);
}

#[tokio::test]
async fn chunked_upload_to_streaming_route() {
    let raw = exchange(
        &service(),
        b"PUT /download/file HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nabcd\r\n3\r\nefg\r\n0\r\n\r\n",
    )
    .await;
    let response = parse(&raw);
    assert_eq!(response.status, 200);
    let value: serde_json::Value = serde_json::from_slice(&dechunk(&response.body).0).unwrap();
    assert_eq!(value["received"], 7);
}

#[tokio::test]
async fn oversized_buffered_body_is_rejected() {
    let (small, _) = service_with(ServerConfig::default().max_buffered_body(4));
    let raw = exchange(
        &small,
        b"POST /post/request HTTP/1.1\r\nContent-Length: 16\r\n\r\n{\"name\":\"snake\"}",
    )
    .await;
    assert_eq!(parse(&raw).status, 413);
}

#[tokio::test]
async fn streaming_route_ignores_buffer_limit() {
    let (small, _) = service_with(ServerConfig::default().max_buffered_body(4));
    let raw = exchange(
        &small,
        b"POST /download/file HTTP/1.1\r\nContent-Length: 10\r\n\r\n0123456789",
    )
    .await;
    let value: serde_json::Value = serde_json::from_slice(&dechunk(&parse(&raw).body).0).unwrap();
    assert_eq!(value["received"], 10);
}

#[tokio::test]
async fn routing_errors_become_responses() {
    let raw = exchange(&service(), b"GET /nowhere HTTP/1.1\r\n\r\n").await;
    let response = parse(&raw);
    assert_eq!(response.status, 404);
    let value: serde_json::Value = serde_json::from_slice(&dechunk(&response.body).0).unwrap();
    assert_eq!(value["error"]["status"], 404);

    let raw = exchange(&service(), b"DELETE /post/request HTTP/1.1\r\n\r\n").await;
    let response = parse(&raw);
    assert_eq!(response.status, 405);
    assert_eq!(response.header("allow"), Some("POST"));
}

#[tokio::test]
async fn malformed_request_is_bad_request() {
    let raw = exchange(&service(), b"BREW /pot HTTP/1.1\r\n\r\n").await;
    assert_eq!(parse(&raw).status, 400);

    let raw = exchange(&service(), b"GET /get HTTP/1.1\r\nno colon here\r\n\r\n").await;
    assert_eq!(parse(&raw).status, 400);
}

#[tokio::test]
async fn handler_errors_and_panics() {
    let raw = exchange(&service(), b"GET /get/fail HTTP/1.1\r\n\r\n").await;
    assert_eq!(parse(&raw).status, 400);

    let raw = exchange(&service(), b"GET /get/panic HTTP/1.1\r\n\r\n").await;
    let response = parse(&raw);
    assert_eq!(response.status, 500);
    let value: serde_json::Value = serde_json::from_slice(&dechunk(&response.body).0).unwrap();
    assert_eq!(value["error"]["message"], "Panic: handler blew up");
}

#[tokio::test]
async fn custom_error_hook() {
    let mut server = Server::new(ServerConfig::default());
    server.on_error(|err| {
        let mut response = Response::text(format!("oops: {}", err));
        response.status(err.status_code());
        response
    });
    let service = server.freeze();

    let raw = exchange(&service, b"GET /anything HTTP/1.1\r\n\r\n").await;
    let response = parse(&raw);
    assert_eq!(response.status, 404);
    assert_eq!(dechunk(&response.body).0, b"oops: Not found");
}

#[tokio::test]
async fn closed_before_request_writes_nothing() {
    let (service, log) = service_with(ServerConfig::default());
    let raw = exchange(&service, b"").await;
    assert!(raw.is_empty());
    assert!(log.records().is_empty());
}

#[tokio::test]
async fn access_log_records_each_response() {
    let (service, log) = service_with(ServerConfig::default());
    exchange(&service, b"GET /news/today?lang=en HTTP/1.1\r\n\r\n").await;
    exchange(&service, b"GET /stream/broken HTTP/1.1\r\n\r\n").await;

    let records = log.records();
    assert_eq!(records.len(), 2);
    assert_eq!(
        records[0].line(),
        "[127.0.0.1:52814] [October 14, 2026 at 3:04:05 PM] [GET] [404] /news/today?lang=en"
    );
    // Logged when the head goes out, even though the body fails later.
    assert_eq!(records[1].status, 200);
    assert_eq!(records[1].method, Some(Method::GET));
}

fn counted_uploads(hits: Arc<AtomicUsize>) -> Service {
    let mut upload = Controller::new("/upload");
    let buffered = Arc::clone(&hits);
    upload.post("/buffered", move |_req| {
        buffered.fetch_add(1, Ordering::SeqCst);
        async { Ok(Response::no_content()) }
    });
    // Answers without reading its body; a failed upload still wins.
    upload.add_streaming_route("/streamed", Method::POST, |_req| async {
        Ok(Response::text("stored"))
    });

    let mut server = Server::new(ServerConfig::default());
    server.register(upload).unwrap();
    server.freeze()
}

#[tokio::test]
async fn truncated_buffered_body_never_reaches_the_handler() {
    let hits = Arc::new(AtomicUsize::new(0));
    let service = counted_uploads(Arc::clone(&hits));

    let raw = exchange(
        &service,
        b"POST /upload/buffered HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc",
    )
    .await;
    let response = parse(&raw);
    assert_eq!(response.status, 500);
    let value: serde_json::Value = serde_json::from_slice(&dechunk(&response.body).0).unwrap();
    assert!(value["error"]["message"]
        .as_str()
        .unwrap()
        .starts_with("Transport error"));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn truncated_streamed_upload_replaces_the_handler_response() {
    let service = counted_uploads(Arc::new(AtomicUsize::new(0)));

    let raw = exchange(
        &service,
        b"POST /upload/streamed HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc",
    )
    .await;
    let response = parse(&raw);
    assert_eq!(response.status, 500);
    assert_ne!(dechunk(&response.body).0, b"stored");
}

#[tokio::test]
async fn zero_read_chunk_size_still_reads_bodies() {
    let mut config = ServerConfig::default();
    config.read_chunk_size = 0;
    let (service, _) = service_with(config);

    let raw = exchange(
        &service,
        b"POST /post/request HTTP/1.1\r\nContent-Length: 16\r\n\r\n{\"name\":\"snake\"}",
    )
    .await;
    let response = parse(&raw);
    assert_eq!(response.status, 200);
    let value: serde_json::Value = serde_json::from_slice(&dechunk(&response.body).0).unwrap();
    assert_eq!(value["message"], "hello snake");
}
