#![allow(dead_code)] // Each test binary uses a different slice of this helper

//! Minimal scriptable HTTP/1.1 server for integration tests
//!
//! Serves a fixed byte body over a `tokio::net::TcpListener`, one
//! connection per request (`Connection: close`). Behavior is scripted per
//! server: honor or ignore `Range` requests, answer fixed error statuses,
//! fail the first N GETs, reject HEAD, and throttle the body so tests can
//! pause or cancel mid-flight. Every request's method and `Range` header
//! are captured for assertions.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// How the server answers GET requests
#[derive(Clone)]
pub enum Mode {
    /// Serve the body, honoring `Range: bytes=N-` with 206
    Ranged,
    /// Serve the full body with 200, ignoring any `Range` header
    IgnoreRange,
    /// Always answer with this status and an empty body
    Status(u16),
    /// Answer `status` for the first `failures` GETs, then serve normally
    FlakyThenOk { failures: usize, status: u16 },
}

pub struct ServerOptions {
    pub mode: Mode,
    pub body: Vec<u8>,
    /// Write the body in `chunk`-byte pieces with a delay between them
    pub throttle: Option<(usize, Duration)>,
    /// Answer HEAD requests with 500 instead of headers
    pub reject_head: bool,
}

impl ServerOptions {
    pub fn new(mode: Mode, body: Vec<u8>) -> Self {
        Self {
            mode,
            body,
            throttle: None,
            reject_head: false,
        }
    }
}

/// A captured request
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub range: Option<String>,
}

struct Shared {
    options: ServerOptions,
    requests: Mutex<Vec<SeenRequest>>,
    get_count: AtomicUsize,
    active_gets: AtomicUsize,
    peak_gets: AtomicUsize,
}

pub struct TestServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    accept_loop: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(options: ServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shared = Arc::new(Shared {
            options,
            requests: Mutex::new(Vec::new()),
            get_count: AtomicUsize::new(0),
            active_gets: AtomicUsize::new(0),
            peak_gets: AtomicUsize::new(0),
        });

        let accept_shared = Arc::clone(&shared);
        let accept_loop = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let shared = Arc::clone(&accept_shared);
                tokio::spawn(async move {
                    let _ = handle_connection(stream, shared).await;
                });
            }
        });

        Self {
            addr,
            shared,
            accept_loop,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Every request seen so far, in arrival order
    pub fn requests(&self) -> Vec<SeenRequest> {
        self.shared.requests.lock().unwrap().clone()
    }

    /// Range headers of the GET requests seen so far
    pub fn get_ranges(&self) -> Vec<Option<String>> {
        self.requests()
            .into_iter()
            .filter(|request| request.method == "GET")
            .map(|request| request.range)
            .collect()
    }

    pub fn get_count(&self) -> usize {
        self.shared.get_count.load(Ordering::SeqCst)
    }

    /// Highest number of GET bodies in flight at once
    pub fn peak_concurrent_gets(&self) -> usize {
        self.shared.peak_gets.load(Ordering::SeqCst)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}

async fn handle_connection(mut stream: TcpStream, shared: Arc<Shared>) -> std::io::Result<()> {
    let (method, range) = read_request_head(&mut stream).await?;
    shared.requests.lock().unwrap().push(SeenRequest {
        method: method.clone(),
        range: range.clone(),
    });

    if method == "HEAD" {
        if shared.options.reject_head {
            write_simple(&mut stream, 500, "Internal Server Error", 0).await?;
        } else {
            write_simple(&mut stream, 200, "OK", shared.options.body.len()).await?;
        }
        return stream.shutdown().await;
    }

    // Everything below is a GET
    let get_index = shared.get_count.fetch_add(1, Ordering::SeqCst);

    let mode = shared.options.mode.clone();
    let (status, serve_body) = match mode {
        Mode::Status(status) => (status, false),
        Mode::FlakyThenOk { failures, status } if get_index < failures => (status, false),
        _ => (200, true),
    };

    if !serve_body {
        write_simple(&mut stream, status, reason_for(status), 0).await?;
        return stream.shutdown().await;
    }

    let body = &shared.options.body;
    let total = body.len();
    let honor_range = matches!(shared.options.mode, Mode::Ranged | Mode::FlakyThenOk { .. });
    let start = match (&range, honor_range) {
        (Some(spec), true) => parse_range_start(spec).unwrap_or(0).min(total),
        _ => 0,
    };

    let slice = &body[start..];
    let mut head = String::new();
    if start > 0 {
        head.push_str("HTTP/1.1 206 Partial Content\r\n");
        head.push_str(&format!(
            "Content-Range: bytes {}-{}/{}\r\n",
            start,
            total.saturating_sub(1),
            total
        ));
    } else {
        head.push_str("HTTP/1.1 200 OK\r\n");
    }
    if honor_range {
        head.push_str("Accept-Ranges: bytes\r\n");
    }
    head.push_str(&format!("Content-Length: {}\r\n", slice.len()));
    head.push_str("Connection: close\r\n\r\n");
    stream.write_all(head.as_bytes()).await?;

    let in_flight = shared.active_gets.fetch_add(1, Ordering::SeqCst) + 1;
    shared.peak_gets.fetch_max(in_flight, Ordering::SeqCst);
    let body_result = write_body(&mut stream, slice, shared.options.throttle).await;
    shared.active_gets.fetch_sub(1, Ordering::SeqCst);
    body_result?;

    stream.shutdown().await
}

async fn write_body(
    stream: &mut TcpStream,
    slice: &[u8],
    throttle: Option<(usize, Duration)>,
) -> std::io::Result<()> {
    match throttle {
        None => stream.write_all(slice).await,
        Some((chunk_size, delay)) => {
            for chunk in slice.chunks(chunk_size.max(1)) {
                stream.write_all(chunk).await?;
                stream.flush().await?;
                tokio::time::sleep(delay).await;
            }
            Ok(())
        }
    }
}

async fn read_request_head(stream: &mut TcpStream) -> std::io::Result<(String, Option<String>)> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|window| window == b"\r\n\r\n") {
        let read = stream.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        head.extend_from_slice(&buf[..read]);
        if head.len() > 64 * 1024 {
            break;
        }
    }

    let text = String::from_utf8_lossy(&head);
    let mut lines = text.lines();
    let request_line = lines.next().unwrap_or_default();
    let method = request_line
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string();
    let range = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("range"))
        .map(|(_, value)| value.trim().to_string());
    Ok((method, range))
}

/// Parse `bytes=N-` into N
fn parse_range_start(spec: &str) -> Option<usize> {
    spec.strip_prefix("bytes=")?
        .split('-')
        .next()?
        .parse()
        .ok()
}

fn reason_for(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}

async fn write_simple(
    stream: &mut TcpStream,
    status: u16,
    reason: &str,
    content_length: usize,
) -> std::io::Result<()> {
    let head = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Length: {content_length}\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(head.as_bytes()).await
}

/// Deterministic pseudo-random body for transfer tests
pub fn patterned_body(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| {
            let x = i as u64;
            (x.wrapping_mul(2654435761).wrapping_add(x >> 8) & 0xff) as u8
        })
        .collect()
}
