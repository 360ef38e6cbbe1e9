//! Test origin: an HTTP server serving a deterministic blob with
//! single-range semantics, request counting, and injectable failure modes

#![allow(dead_code)]

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// How the origin answers requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginMode {
    /// Serve single ranges normally.
    Ranges,
    /// Ignore `Range` headers entirely and answer 200 with the whole blob.
    NoRanges,
    /// Serve the one-byte probe range but fail every other range with 400.
    FailChunks,
    /// Answer every request with 500.
    ServerError,
}

pub struct OriginBuilder {
    content: Bytes,
    mode: OriginMode,
    delay: Option<Duration>,
    required_header: Option<(String, String)>,
}

impl OriginBuilder {
    pub fn mode(mut self, mode: OriginMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sleep this long before answering each request.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Answer 500 to any request missing this header, so a passing transfer
    /// proves every subrequest carried it.
    pub fn require_header(mut self, name: &str, value: &str) -> Self {
        self.required_header = Some((name.to_string(), value.to_string()));
        self
    }

    pub async fn start(self) -> Origin {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test origin");
        let addr = listener.local_addr().expect("test origin addr");
        let requests = Arc::new(AtomicUsize::new(0));

        let state = Arc::new(OriginState {
            content: self.content,
            mode: self.mode,
            delay: self.delay,
            required_header: self.required_header,
            requests: Arc::clone(&requests),
        });

        let accept_loop = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let io = TokioIo::new(stream);
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(req, state).await }
                    });
                    let _ = http1::Builder::new().serve_connection(io, service).await;
                });
            }
        });

        Origin {
            url: format!("http://{}/blob", addr),
            requests,
            accept_loop,
        }
    }
}

pub struct Origin {
    pub url: String,
    requests: Arc<AtomicUsize>,
    accept_loop: tokio::task::JoinHandle<()>,
}

impl Origin {
    pub fn builder(content: Vec<u8>) -> OriginBuilder {
        OriginBuilder {
            content: Bytes::from(content),
            mode: OriginMode::Ranges,
            delay: None,
            required_header: None,
        }
    }

    /// Serve a blob with plain single-range semantics.
    pub async fn serve(content: Vec<u8>) -> Origin {
        Origin::builder(content).start().await
    }

    /// Number of requests the origin has started handling.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Drop for Origin {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}

struct OriginState {
    content: Bytes,
    mode: OriginMode,
    delay: Option<Duration>,
    required_header: Option<(String, String)>,
    requests: Arc<AtomicUsize>,
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<OriginState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if let Some(delay) = state.delay {
        tokio::time::sleep(delay).await;
    }

    if let Some((name, value)) = &state.required_header {
        let present = req
            .headers()
            .get(name.as_str())
            .and_then(|v| v.to_str().ok())
            .map(|v| v == value)
            .unwrap_or(false);
        if !present {
            return Ok(status_only(StatusCode::INTERNAL_SERVER_ERROR));
        }
    }

    let size = state.content.len() as u64;
    let range = req
        .headers()
        .get("range")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match state.mode {
        OriginMode::ServerError => Ok(status_only(StatusCode::INTERNAL_SERVER_ERROR)),
        OriginMode::NoRanges => Ok(full_response(&state.content, false)),
        OriginMode::Ranges | OriginMode::FailChunks => match range {
            None => Ok(full_response(&state.content, true)),
            Some(value) => {
                if state.mode == OriginMode::FailChunks && value != "bytes=0-0" {
                    return Ok(status_only(StatusCode::BAD_REQUEST));
                }
                match parse_single_range(&value, size) {
                    Some((start, end)) => {
                        let body = state.content.slice(start as usize..=end as usize);
                        let response = Response::builder()
                            .status(StatusCode::PARTIAL_CONTENT)
                            .header("accept-ranges", "bytes")
                            .header("content-length", body.len())
                            .header("content-range", format!("bytes {}-{}/{}", start, end, size))
                            .body(Full::new(body))
                            .expect("build 206 response");
                        Ok(response)
                    }
                    None => {
                        let response = Response::builder()
                            .status(StatusCode::RANGE_NOT_SATISFIABLE)
                            .header("content-range", format!("bytes */{}", size))
                            .body(Full::new(Bytes::new()))
                            .expect("build 416 response");
                        Ok(response)
                    }
                }
            }
        },
    }
}

fn full_response(content: &Bytes, advertise_ranges: bool) -> Response<Full<Bytes>> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header("content-length", content.len());
    if advertise_ranges {
        builder = builder.header("accept-ranges", "bytes");
    }
    builder
        .body(Full::new(content.clone()))
        .expect("build 200 response")
}

fn status_only(status: StatusCode) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()))
        .expect("build status response")
}

/// Minimal `bytes=N-M` parsing: the client resolves open-ended and suffix
/// forms before any request reaches the wire, so subrequests always carry a
/// bounded pair.
fn parse_single_range(value: &str, size: u64) -> Option<(u64, u64)> {
    let rest = value.strip_prefix("bytes=")?;
    let (start, end) = rest.split_once('-')?;
    let start: u64 = start.parse().ok()?;
    let end: u64 = if end.is_empty() {
        size.checked_sub(1)?
    } else {
        end.parse().ok()?
    };
    if start >= size || start > end {
        return None;
    }
    Some((start, end.min(size - 1)))
}

/// Deterministic position-dependent bytes: any gap, duplication, or
/// reordering in a transfer shows up as a mismatch.
pub fn blob(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(31) ^ (i >> 8)) as u8)
        .collect()
}
