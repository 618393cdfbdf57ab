//! Streams request bodies to disk while they arrive.
//!
//! ```text
//! cargo run --example upload
//! curl -i -T archive.zip http://127.0.0.1:8889/download/file
//! ```

use bytes::Bytes;
use futures::StreamExt;
use snake_http::{json, ByteStream, Controller, Methods, Request, Response, ServerError, Server, ServerConfig, StreamElement};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn store(mut req: Request) -> snake_http::HttpResponse {
    let target = std::env::temp_dir().join("file.zip");
    let mut file = tokio::fs::File::create(&target).await?;
    let mut body = req.take_stream();
    let mut written = 0usize;

    loop {
        match body.next().await {
            Some(StreamElement::Chunk(chunk)) => {
                file.write_all(&chunk).await?;
                written += chunk.len();
            }
            Some(StreamElement::Error(err)) => return Err(err),
            Some(StreamElement::End) => break,
            None => return Err(ServerError::Stream("upload aborted".to_string())),
        }
    }
    file.flush().await?;
    tracing::info!(path = %target.display(), bytes = written, "upload stored");

    let mut response = Response::json(json!({
        "code": 200,
        "method": "File",
        "message": "success",
        "bytes": written
    }));
    response.header("Content-Type", "application/json");
    Ok(response)
}

/// Streams a stored file back in fixed-size chunks.
async fn fetch(_req: Request) -> snake_http::HttpResponse {
    let target: PathBuf = std::env::temp_dir().join("file.zip");
    let data = tokio::fs::read(&target).await.map_err(|_| ServerError::NotFound)?;
    let chunks: Vec<Bytes> = data.chunks(16 * 1024).map(Bytes::copy_from_slice).collect();
    let mut response = Response::stream("application/zip", ByteStream::from_chunks(chunks));
    response.file_download("file.zip", "application/zip");
    Ok(response)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snake_http=info,upload=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut file = Controller::new("/download/file");
    file.add_streaming_route("/", [snake_http::Method::PUT, snake_http::Method::POST], store)
        .add_route("/", Methods::from(snake_http::Method::GET), fetch);

    let config = ServerConfig::default().address("127.0.0.1:8889".parse::<SocketAddr>()?);
    let mut server = Server::new(config);
    server.register(file)?;
    server.listen()?;
    Ok(())
}
