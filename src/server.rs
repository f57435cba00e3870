//! Minimal HTTP/1.1 front end for the demo archive endpoint.
//!
//! `GET /zip/{name}.zip?size=N` streams a [`DemoSource`] archive of `N`
//! entries using chunked transfer encoding. Response headers are only sent
//! once the first chunk exists, so a failure before any byte was produced
//! becomes a `500` carrying the error message. A failure after streaming
//! began cannot be reported in-band: the connection is dropped without the
//! terminating chunk and the client is left with a truncated archive.
//!
//! The request parser is minimal: only the request line is interpreted,
//! headers are skipped, request bodies are not read and every connection
//! serves exactly one request (`Connection: close`).

use anyhow::{Context, Result, bail};
use futures_util::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::demo::DemoSource;
use crate::generator::{DEFAULT_CHUNK_SIZE, GeneratorConfig, ZipGenerator};
use crate::stream::{ArchiveStream, DEFAULT_HIGH_WATER};

/// Entry count used when `size` is missing or invalid
pub const DEFAULT_SIZE: usize = 500;

/// Upper bound on the request line plus headers
const MAX_HEAD_SIZE: u64 = 8 * 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub default_size: usize,
    pub chunk_size: usize,
    pub high_water: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            default_size: DEFAULT_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            high_water: DEFAULT_HIGH_WATER,
        }
    }
}

/// Outcome of routing a request line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Archive { name: String, size: usize },
    NotFound,
    MethodNotAllowed,
}

/// Map a method and request target onto a [`Route`]
pub fn route(method: &str, target: &str, default_size: usize) -> Route {
    let (path, query) = target.split_once('?').unwrap_or((target, ""));

    let name = path
        .strip_prefix("/zip/")
        .and_then(|rest| rest.strip_suffix(".zip"))
        .filter(|name| !name.is_empty() && !name.contains('/'));
    let Some(name) = name else {
        return Route::NotFound;
    };
    if method != "GET" {
        return Route::MethodNotAllowed;
    }

    Route::Archive {
        name: name.to_string(),
        size: size_param(query, default_size),
    }
}

fn size_param(query: &str, default_size: usize) -> usize {
    let raw = query
        .split('&')
        .find_map(|pair| pair.strip_prefix("size="));

    match raw.map(str::parse::<usize>) {
        Some(Ok(size)) => size,
        Some(Err(_)) => {
            log::warn!("Wrong format given for size, using default ({default_size})");
            default_size
        }
        None => default_size,
    }
}

/// Bind `config.addr` and serve until the listener fails
pub async fn run(config: ServerConfig) -> Result<()> {
    let listener = TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("cannot bind {}", config.addr))?;
    log::info!("HTTP server started on {}", listener.local_addr()?);
    serve(listener, config).await
}

/// Accept connections on an already bound listener
pub async fn serve(listener: TcpListener, config: ServerConfig) -> Result<()> {
    let config = Arc::new(config);
    loop {
        let (socket, peer) = listener.accept().await?;
        let config = Arc::clone(&config);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(socket, &config).await {
                log::warn!("connection from {peer} ended with error: {err:#}");
            }
        });
    }
}

async fn handle_connection(mut socket: TcpStream, config: &ServerConfig) -> Result<()> {
    let (method, target) = read_request_head(&mut socket).await?;
    log::debug!("{method} {target}");

    match route(&method, &target, config.default_size) {
        Route::Archive { name, size } => stream_archive(socket, config, &name, size).await,
        Route::NotFound => respond(&mut socket, "404 Not Found", "not found\n").await,
        Route::MethodNotAllowed => {
            respond(&mut socket, "405 Method Not Allowed", "method not allowed\n").await
        }
    }
}

/// Read the request line and skip the headers, returning method and target
async fn read_request_head(socket: &mut TcpStream) -> Result<(String, String)> {
    let mut reader = BufReader::new(socket).take(MAX_HEAD_SIZE);

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await? == 0 {
        bail!("connection closed before request line");
    }

    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            bail!("request head incomplete or larger than {MAX_HEAD_SIZE} bytes");
        }
        if line == "\r\n" || line == "\n" {
            break;
        }
    }

    let mut parts = request_line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(method), Some(target)) => Ok((method.to_string(), target.to_string())),
        _ => bail!("malformed request line: {:?}", request_line.trim_end()),
    }
}

async fn respond(socket: &mut TcpStream, status: &str, body: &str) -> Result<()> {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain; charset=utf-8\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await?;
    Ok(())
}

async fn stream_archive(
    mut socket: TcpStream,
    config: &ServerConfig,
    name: &str,
    size: usize,
) -> Result<()> {
    let generator = ZipGenerator::new(
        DemoSource::new(size),
        GeneratorConfig {
            chunk_size: config.chunk_size,
            ..GeneratorConfig::default()
        },
    );
    let mut chunks = ArchiveStream::subscribe(&generator, config.high_water)?;

    let first = match chunks.next().await {
        Some(Ok(chunk)) => chunk,
        Some(Err(err)) => {
            log::error!("{name}.zip failed before streaming: {err}");
            return respond(&mut socket, "500 Internal Server Error", &format!("{err}\n")).await;
        }
        None => bytes::Bytes::new(),
    };

    // Quotes would terminate the filename parameter early
    let filename = name.replace('"', "");
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/zip\r\n\
         Content-Disposition: attachment; filename=\"{filename}.zip\"\r\n\
         Transfer-Encoding: chunked\r\nConnection: close\r\n\r\n"
    );
    socket.write_all(head.as_bytes()).await?;
    write_chunk(&mut socket, &first).await?;

    let mut total = first.len() as u64;
    while let Some(item) = chunks.next().await {
        match item {
            Ok(chunk) => {
                total += chunk.len() as u64;
                write_chunk(&mut socket, &chunk).await?;
            }
            Err(err) => {
                log::error!("aborting {name}.zip after {total} bytes were sent: {err}");
                // No terminating chunk: the client sees a truncated body
                return Err(err.into());
            }
        }
    }

    socket.write_all(b"0\r\n\r\n").await?;
    socket.shutdown().await?;
    log::info!("served {name}.zip: {size} entries, {total} bytes");
    Ok(())
}

async fn write_chunk(socket: &mut TcpStream, chunk: &[u8]) -> Result<()> {
    if chunk.is_empty() {
        return Ok(());
    }
    socket
        .write_all(format!("{:x}\r\n", chunk.len()).as_bytes())
        .await?;
    socket.write_all(chunk).await?;
    socket.write_all(b"\r\n").await?;
    Ok(())
}
