//! The ranged request data model

use crate::config::RangedConfig;
use crate::error::{FetchError, Result};
use crate::metrics::Metrics;
use crate::probe::ProbeMethod;
use http::{HeaderMap, Method};
use reqwest::{IntoUrl, Request, Url};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A request to be fetched in chunks
///
/// Wraps an ordinary body-less [`reqwest::Request`] with the fan-out
/// parameters: chunk size, worker count, the no-range fallback toggle, the
/// probe method, an optional whole-transfer timeout, and the cancellation
/// token that scopes the transfer.
///
/// # Example
/// ```rust,no_run
/// use ranged::RangedRequest;
/// use http::Method;
///
/// # fn main() -> Result<(), ranged::FetchError> {
/// let request = RangedRequest::new(
///     Method::GET,
///     "https://example.com/large.bin",
///     1024 * 1024, // 1 MiB chunks
///     8,           // 8 concurrent workers
/// )?
/// .continue_without_range(true);
/// # Ok(())
/// # }
/// ```
pub struct RangedRequest {
    pub(crate) request: Request,
    pub(crate) chunk_size: u64,
    pub(crate) workers: u32,
    pub(crate) continue_without_range: bool,
    pub(crate) probe_method: ProbeMethod,
    pub(crate) timeout: Option<Duration>,
    pub(crate) cancel: CancellationToken,
    pub(crate) metrics: Arc<Metrics>,
}

impl RangedRequest {
    /// Create a new ranged request
    ///
    /// # Arguments
    /// * `method` - Request method; `HEAD` passes through without chunking
    /// * `url` - Resource URL
    /// * `chunk_size` - Size of each chunk in bytes, at least 1
    /// * `workers` - Maximum number of chunks in flight, at least 1
    ///
    /// # Returns
    /// * `Err(FetchError::InvalidArgument)` if `chunk_size` or `workers` is zero
    pub fn new(method: Method, url: impl IntoUrl, chunk_size: u64, workers: u32) -> Result<Self> {
        let url = url.into_url()?;
        Self::from_request(Request::new(method, url), chunk_size, workers)
    }

    /// Wrap an existing request
    ///
    /// The request must not carry a body: chunk subrequests cannot replay
    /// one, so a request with a body is rejected with
    /// [`FetchError::InvalidArgument`].
    pub fn from_request(request: Request, chunk_size: u64, workers: u32) -> Result<Self> {
        if chunk_size == 0 || workers == 0 {
            return Err(FetchError::InvalidArgument);
        }
        if request.body().is_some() {
            return Err(FetchError::InvalidArgument);
        }
        Ok(RangedRequest {
            request,
            chunk_size,
            workers,
            continue_without_range: false,
            probe_method: ProbeMethod::default(),
            timeout: None,
            cancel: CancellationToken::new(),
            metrics: Metrics::global(),
        })
    }

    /// Create a new ranged request from a [`RangedConfig`]
    pub fn from_config(method: Method, url: impl IntoUrl, config: &RangedConfig) -> Result<Self> {
        config.validate()?;
        let mut request = Self::new(method, url, config.chunk_size, config.workers)?;
        request.continue_without_range = config.continue_without_range;
        request.probe_method = config.probe_method;
        request.timeout = config.timeout();
        Ok(request)
    }

    /// Serve the origin's plain response when it does not support range
    /// requests, instead of failing with
    /// [`FetchError::RangeUnsupported`](crate::FetchError::RangeUnsupported).
    ///
    /// If the request carried a `Range` header, the fallback response is the
    /// origin's answer to the probe and holds the whole body, not the
    /// requested range; the caller is responsible for discarding bytes it did
    /// not ask for.
    pub fn continue_without_range(mut self, enabled: bool) -> Self {
        self.continue_without_range = enabled;
        self
    }

    /// Select how the origin is probed for range support
    pub fn probe_method(mut self, method: ProbeMethod) -> Self {
        self.probe_method = method;
        self
    }

    /// Bound the whole transfer, probe included. When the deadline passes the
    /// pipeline is cancelled and the body reader observes
    /// [`FetchError::Cancelled`](crate::FetchError::Cancelled).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Scope the transfer to a caller-owned cancellation token
    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The token that cancels this transfer
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Record this transfer into a caller-owned metrics handle instead of the
    /// process-wide one
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// The request method
    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// The request URL
    pub fn url(&self) -> &Url {
        self.request.url()
    }

    /// The request headers
    pub fn headers(&self) -> &HeaderMap {
        self.request.headers()
    }

    /// Mutable access to the request headers
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.request.headers_mut()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.workers == 0 {
            return Err(FetchError::InvalidArgument);
        }
        Ok(())
    }

    /// Host label used for this request's metrics, `host:port` when the URL
    /// names a port.
    pub(crate) fn metrics_host(&self) -> String {
        let url = self.request.url();
        match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        }
    }
}
