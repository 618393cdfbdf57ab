use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig as RustlsConfig;
use std::fs::File;
use std::io::BufReader;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_rustls::TlsAcceptor;

/// How streamed response chunks are handed to the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Chunks are queued as they arrive; the body stream never waits for the network.
    #[default]
    Pipelined,
    /// Each chunk is written and flushed before the next one is pulled from the stream.
    Acknowledged,
}

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates found in {0}")]
    NoCertificates(PathBuf),

    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),

    #[error("invalid TLS configuration: {0}")]
    Rustls(#[from] rustls::Error),
}

/// TLS configuration for HTTPS support
#[derive(Debug, Clone)]
pub struct TlsConfig {
    cert_file: PathBuf,
    key_file: PathBuf,
}

impl TlsConfig {
    pub fn new<P: AsRef<Path>>(cert_file: P, key_file: P) -> Self {
        Self {
            cert_file: cert_file.as_ref().to_path_buf(),
            key_file: key_file.as_ref().to_path_buf(),
        }
    }

    pub fn acceptor(&self) -> Result<TlsAcceptor, TlsError> {
        let certs = self.load_certs()?;
        let key = self.load_key()?;
        let config = RustlsConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?;
        Ok(TlsAcceptor::from(Arc::new(config)))
    }

    fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
        File::open(path)
            .map(BufReader::new)
            .map_err(|source| TlsError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    fn load_certs(&self) -> Result<Vec<CertificateDer<'static>>, TlsError> {
        let mut reader = Self::open(&self.cert_file)?;
        let certs: Vec<_> = rustls_pemfile::certs(&mut reader)
            .filter_map(|result| result.ok())
            .collect();
        if certs.is_empty() {
            return Err(TlsError::NoCertificates(self.cert_file.clone()));
        }
        Ok(certs)
    }

    fn load_key(&self) -> Result<PrivateKeyDer<'static>, TlsError> {
        let mut reader = Self::open(&self.key_file)?;
        rustls_pemfile::private_key(&mut reader)
            .map_err(|source| TlsError::Io {
                path: self.key_file.clone(),
                source,
            })?
            .ok_or_else(|| TlsError::NoPrivateKey(self.key_file.clone()))
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: SocketAddr,
    pub backlog: u32,
    pub reuse_addr: bool,
    pub tcp_no_delay: bool,
    pub max_connections: usize,
    pub worker_threads: usize,
    pub max_buffered_body: usize,
    pub max_head_size: usize,
    pub read_chunk_size: usize,
    pub write_mode: WriteMode,
    pub tls: Option<TlsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::from((Ipv4Addr::LOCALHOST, 8888)),
            backlog: 256,
            reuse_addr: true,
            tcp_no_delay: true,
            max_connections: 1024,
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            max_buffered_body: 2 * 1024 * 1024,
            max_head_size: 16 * 1024,
            read_chunk_size: 8 * 1024,
            write_mode: WriteMode::Pipelined,
            tls: None,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address<A: Into<SocketAddr>>(mut self, address: A) -> Self {
        self.address = address.into();
        self
    }

    pub fn backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn reuse_addr(mut self, reuse_addr: bool) -> Self {
        self.reuse_addr = reuse_addr;
        self
    }

    pub fn tcp_no_delay(mut self, tcp_no_delay: bool) -> Self {
        self.tcp_no_delay = tcp_no_delay;
        self
    }

    pub fn max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    pub fn worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads.max(1);
        self
    }

    pub fn max_buffered_body(mut self, max_buffered_body: usize) -> Self {
        self.max_buffered_body = max_buffered_body;
        self
    }

    pub fn max_head_size(mut self, max_head_size: usize) -> Self {
        self.max_head_size = max_head_size;
        self
    }

    pub fn read_chunk_size(mut self, read_chunk_size: usize) -> Self {
        self.read_chunk_size = read_chunk_size.max(1);
        self
    }

    pub fn write_mode(mut self, write_mode: WriteMode) -> Self {
        self.write_mode = write_mode;
        self
    }

    /// Applies the setters' lower bounds to fields that were assigned directly.
    pub(crate) fn normalized(mut self) -> Self {
        self.max_connections = self.max_connections.max(1);
        self.worker_threads = self.worker_threads.max(1);
        self.read_chunk_size = self.read_chunk_size.max(1);
        self
    }

    /// Configure TLS for HTTPS support
    pub fn tls<P: AsRef<Path>>(mut self, cert_file: P, key_file: P) -> Self {
        self.tls = Some(TlsConfig::new(cert_file, key_file));
        self
    }
}
