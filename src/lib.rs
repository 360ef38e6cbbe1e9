//! Parallel HTTP Range Fetching
//!
//! `ranged` turns a single GET for a large resource into many concurrent
//! byte-range subrequests and reassembles them into one ordered body stream.
//! The surface is that of an ordinary HTTP client — submit a request, read a
//! response body — while the transfer is fanned out across a bounded worker
//! pool underneath.
//!
//! # Overview
//!
//! A ranged request is fetched in four steps:
//!
//! 1. A probe request discovers the total content length and whether the
//!    origin serves ranges (`GET` with `Range: bytes=0-0` by default, since
//!    some origins mishandle HEAD).
//! 2. The byte interval is partitioned into fixed-size chunks aligned to
//!    multiples of the chunk size from zero, which keeps chunk boundaries
//!    stable across transfers and friendly to intermediate caches and CDNs.
//! 3. Up to `workers` chunks are fetched concurrently; their bodies are
//!    delivered strictly in byte order into a pipe with a one-frame buffer,
//!    so a slow reader pauses the workers instead of buffering unbounded
//!    data.
//! 4. The response handed back is synthesized from the probe's headers with
//!    the pipe as its body. Dropping it cancels every in-flight subrequest.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use ranged::RangedClient;
//!
//! # async fn run() -> Result<(), ranged::FetchError> {
//! // 1 MiB chunks, 8 concurrent workers.
//! let client = RangedClient::new(reqwest::Client::new(), 1 << 20, 8)?;
//!
//! let response = client.get("https://example.com/large.bin").await?;
//! let bytes = response.bytes().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Callers that need per-request control build a [`RangedRequest`] and send
//! it with [`execute`]:
//!
//! ```rust,no_run
//! use ranged::{execute, RangedRequest};
//! use http::Method;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), ranged::FetchError> {
//! let client = reqwest::Client::new();
//! let request = RangedRequest::new(Method::GET, "https://example.com/large.bin", 1 << 20, 8)?
//!     .continue_without_range(true)
//!     .timeout(Duration::from_secs(300));
//! let response = execute(&client, request).await?;
//! # Ok(())
//! # }
//! ```
//!
//! A caller-supplied `Range` header narrows the transfer to that sub-range:
//! the response is a `206 Partial Content` with a synthesized
//! `Content-Range`, and only the chunks covering the sub-range are fetched.
//! Multiple ranges are not supported. `HEAD` requests pass through to the
//! inner client untouched.
//!
//! # Architecture
//!
//! - [`chunk`]: aligned interval partitioning and RFC 7233 `Range` /
//!   `Content-Range` formatting and parsing
//! - [`probe`]: the preliminary request that discovers length and range
//!   support
//! - `pipeline` (internal): the ordered bounded-concurrency executor
//!   (parallel fetch, serial in-order delivery, cooperative backpressure and
//!   cancellation)
//! - [`client`]: [`execute`], the [`RoundTrip`] transport trait,
//!   [`RangedTransport`] and [`RangedClient`]
//! - [`metrics`]: per-host Prometheus counters, gauges, and histograms
//! - [`config`]: [`RangedConfig`] with YAML loading
//!
//! # Metrics
//!
//! Transfers record into the process-wide [`Metrics`] handle (or one
//! supplied per request), labeled by request host:
//!
//! ```text
//! ranged_http_requests_fetching{host}
//! ranged_http_requests_total{host,range}
//! ranged_http_request_chunks_fetching{host,stage}
//! ranged_http_request_chunks_total{host}
//! ranged_http_request_chunk_duration_seconds{host}
//! ranged_http_request_chunk_bytes{host}
//! ```
//!
//! # Error Handling
//!
//! All failures are [`FetchError`]. Errors found before the body exists —
//! invalid arguments, a malformed `Range`, an origin without range support —
//! return from [`execute`] directly. A failure inside a running transfer
//! cancels the pipeline and surfaces on the next read of the body; closing
//! the body early is not an error.

pub mod chunk;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod probe;
pub mod request;

mod pipeline;
mod response;

pub use chunk::{chunks, parse_content_range, parse_range, Chunk};
pub use client::{execute, RangedClient, RangedTransport, RoundTrip};
pub use config::RangedConfig;
pub use error::{FetchError, Result};
pub use metrics::{HostMetrics, Metrics};
pub use probe::ProbeMethod;
pub use request::RangedRequest;
