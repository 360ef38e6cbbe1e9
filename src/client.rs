//! Sending ranged requests: the `execute` entry point and the transport
//! wrappers that bolt ranged fetching onto an ordinary client

use crate::chunk;
use crate::config::RangedConfig;
use crate::error::{FetchError, Result};
use crate::pipeline;
use crate::probe::{self, Probed};
use crate::request::RangedRequest;
use crate::response;
use async_trait::async_trait;
use http::header::RANGE;
use http::{Method, StatusCode};
use reqwest::{Client, IntoUrl, Request, Response};
use std::sync::Arc;
use tracing::debug;

/// Send a ranged request on the given client and return the assembled
/// response.
///
/// The resource is probed for range support, partitioned into aligned
/// chunks, and fetched by up to `workers` concurrent subrequests whose
/// bodies are delivered to the response body strictly in byte order. The
/// caller reads the body lazily; reading slowly pauses the workers, and
/// dropping the response cancels them.
///
/// `HEAD` requests pass through to the client untouched. Errors discovered
/// before the body exists are returned here; errors in a running transfer
/// surface on the next read of the body.
///
/// # Example
/// ```rust,no_run
/// use ranged::{execute, RangedRequest};
/// use http::Method;
///
/// # async fn run() -> Result<(), ranged::FetchError> {
/// let client = reqwest::Client::new();
/// let request = RangedRequest::new(Method::GET, "https://example.com/big.iso", 1 << 20, 8)?;
/// let response = execute(&client, request).await?;
/// let bytes = response.bytes().await?;
/// # Ok(())
/// # }
/// ```
pub async fn execute(client: &Client, request: RangedRequest) -> Result<Response> {
    request.validate()?;

    if request.method() == Method::HEAD {
        // A HEAD response has no body to fan out; pass the request through.
        return client
            .execute(request.request)
            .await
            .map_err(FetchError::from);
    }

    let cancel = request.cancel.clone();
    if let Some(timeout) = request.timeout {
        // Whole-transfer deadline: fire the shared token when it passes.
        let watchdog = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = watchdog.cancelled() => {}
                _ = tokio::time::sleep(timeout) => watchdog.cancel(),
            }
        });
    }

    let host = request.metrics_host();
    let metrics = request.metrics.host(&host);

    let probed = probe::probe(client, &request.request, request.probe_method, &cancel).await?;
    let (total, version, headers) = match probed {
        Probed::Unranged(probe_response) => {
            if !request.continue_without_range {
                return Err(FetchError::RangeUnsupported {
                    status: StatusCode::OK,
                });
            }
            debug!("origin ignored the probe, continuing without ranges");
            metrics.request_finished_without_range();
            return match probe_response {
                // The probe was a GET the origin answered in full; hand its
                // response over unchanged.
                Some(response) => Ok(response),
                // A HEAD probe leaves no body to reuse; fetch it plainly.
                None => {
                    let plain = request.request.try_clone().ok_or(FetchError::InvalidArgument)?;
                    client.execute(plain).await.map_err(FetchError::from)
                }
            };
        }
        Probed::Ranged {
            total,
            version,
            headers,
        } => (total, version, headers),
    };

    // A caller-supplied Range narrows the fetched interval to one sub-range.
    let caller_range = match request.headers().get(RANGE) {
        Some(value) => {
            let value = value
                .to_str()
                .map_err(|e| FetchError::InvalidRange(e.to_string()))?;
            let mut ranges = chunk::parse_range(value, total)?;
            if ranges.len() > 1 {
                return Err(FetchError::MultipleRangesUnsupported);
            }
            ranges.pop()
        }
        None => None,
    };

    let plan = match caller_range {
        Some(range) => chunk::chunks(request.chunk_size, range.start, range.start + range.length),
        None => chunk::chunks(request.chunk_size, 0, total),
    };

    let body = pipeline::spawn(
        client.clone(),
        request.request,
        plan,
        request.workers,
        cancel,
        metrics,
    );
    response::assemble(version, headers, total, caller_range, body)
}

/// A single-operation transport capability: send a request, get a response.
///
/// [`RangedTransport`] implements it with chunked fetching; embedders can
/// substitute their own implementation (or wrap this one) and hand it to
/// [`RangedClient::with_transport`].
#[async_trait]
pub trait RoundTrip: Send + Sync {
    /// Send a request and return its response
    async fn round_trip(&self, request: Request) -> Result<Response>;
}

/// A transport that fetches every request in chunks through an inner client
pub struct RangedTransport {
    client: Client,
    config: RangedConfig,
}

impl RangedTransport {
    /// Wrap a client so requests sent through this transport are fetched in
    /// chunks
    ///
    /// # Returns
    /// * `Err(FetchError::InvalidArgument)` if `chunk_size` or `workers` is zero
    pub fn new(client: Client, chunk_size: u64, workers: u32) -> Result<Self> {
        Self::from_config(
            client,
            RangedConfig {
                chunk_size,
                workers,
                ..Default::default()
            },
        )
    }

    /// Wrap a client with a full [`RangedConfig`]
    pub fn from_config(client: Client, config: RangedConfig) -> Result<Self> {
        config.validate()?;
        Ok(RangedTransport { client, config })
    }
}

#[async_trait]
impl RoundTrip for RangedTransport {
    async fn round_trip(&self, request: Request) -> Result<Response> {
        let mut ranged =
            RangedRequest::from_request(request, self.config.chunk_size, self.config.workers)?;
        ranged.continue_without_range = self.config.continue_without_range;
        ranged.probe_method = self.config.probe_method;
        ranged.timeout = self.config.timeout();
        execute(&self.client, ranged).await
    }
}

/// A convenience client whose transport fetches requests in chunks
///
/// # Example
/// ```rust,no_run
/// use ranged::RangedClient;
///
/// # async fn run() -> Result<(), ranged::FetchError> {
/// let client = RangedClient::new(reqwest::Client::new(), 1 << 20, 8)?;
/// let response = client.get("https://example.com/big.iso").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RangedClient {
    transport: Arc<dyn RoundTrip>,
}

impl RangedClient {
    /// Create a client that fetches requests in `chunk_size`-byte chunks with
    /// up to `workers` concurrent subrequests
    pub fn new(client: Client, chunk_size: u64, workers: u32) -> Result<Self> {
        Ok(RangedClient {
            transport: Arc::new(RangedTransport::new(client, chunk_size, workers)?),
        })
    }

    /// Create a client on top of an arbitrary transport
    pub fn with_transport(transport: Arc<dyn RoundTrip>) -> Self {
        RangedClient { transport }
    }

    /// Fetch a URL with a ranged GET
    pub async fn get(&self, url: impl IntoUrl) -> Result<Response> {
        let url = url.into_url()?;
        self.transport.round_trip(Request::new(Method::GET, url)).await
    }

    /// Send a prepared request through the ranged transport
    pub async fn execute(&self, request: Request) -> Result<Response> {
        self.transport.round_trip(request).await
    }
}
