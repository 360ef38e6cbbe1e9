//! Prometheus metrics for ranged requests
//!
//! Metrics are labeled with and grouped by request host. Host records are
//! created lazily on first use and never evicted. The pipeline only writes;
//! exposition is left to the embedding application, which can either mount
//! [`Metrics::registry`] into its own gatherer or serve [`Metrics::export`]
//! directly.

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Stage label for chunks waiting on the origin.
const STAGE_FETCH: &str = "do";
/// Stage label for chunks being copied into the body pipe.
const STAGE_COPY: &str = "copy";

static GLOBAL: Lazy<Arc<Metrics>> =
    Lazy::new(|| Arc::new(Metrics::new().expect("failed to create metrics registry")));

/// Handle to the metric families recorded by ranged transfers
///
/// Callers may own distinct handles with distinct registries; requests use
/// the process-wide [`Metrics::global`] handle unless one is supplied via
/// [`RangedRequest::with_metrics`](crate::RangedRequest::with_metrics).
pub struct Metrics {
    registry: Registry,

    /// Ranged requests currently in flight
    requests_fetching: IntGaugeVec,

    /// Ranged requests completed, by whether the origin served ranges
    requests_total: IntCounterVec,

    /// Chunk subrequests currently in flight, by pipeline stage
    chunks_fetching: IntGaugeVec,

    /// Chunk subrequests completed
    chunks_total: IntCounterVec,

    /// Wall-clock duration of a chunk from dispatch to delivery
    chunk_duration_seconds: HistogramVec,

    /// Body bytes delivered per chunk
    chunk_bytes: HistogramVec,

    hosts: RwLock<HashMap<String, Arc<HostMetrics>>>,
}

impl Metrics {
    /// Create a new handle backed by a private registry
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(&Registry::new())
    }

    /// Create a new handle registered into an existing registry
    pub fn with_registry(registry: &Registry) -> Result<Self, prometheus::Error> {
        let requests_fetching = IntGaugeVec::new(
            Opts::new(
                "ranged_http_requests_fetching",
                "Number of ranged requests currently being fetched",
            ),
            &["host"],
        )?;
        registry.register(Box::new(requests_fetching.clone()))?;

        let requests_total = IntCounterVec::new(
            Opts::new(
                "ranged_http_requests_total",
                "Total number of ranged requests completed",
            ),
            &["host", "range"], // range: whether the origin served range requests
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let chunks_fetching = IntGaugeVec::new(
            Opts::new(
                "ranged_http_request_chunks_fetching",
                "Number of chunk subrequests currently in flight",
            ),
            &["host", "stage"], // stage: do (origin fetch), copy (body delivery)
        )?;
        registry.register(Box::new(chunks_fetching.clone()))?;

        let chunks_total = IntCounterVec::new(
            Opts::new(
                "ranged_http_request_chunks_total",
                "Total number of chunk subrequests completed",
            ),
            &["host"],
        )?;
        registry.register(Box::new(chunks_total.clone()))?;

        let chunk_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "ranged_http_request_chunk_duration_seconds",
                "Duration of a chunk subrequest from dispatch to delivery",
            )
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
            &["host"],
        )?;
        registry.register(Box::new(chunk_duration_seconds.clone()))?;

        let chunk_bytes = HistogramVec::new(
            HistogramOpts::new(
                "ranged_http_request_chunk_bytes",
                "Body bytes delivered per chunk subrequest",
            )
            .buckets(prometheus::exponential_buckets(1024.0, 4.0, 10)?),
            &["host"],
        )?;
        registry.register(Box::new(chunk_bytes.clone()))?;

        Ok(Metrics {
            registry: registry.clone(),
            requests_fetching,
            requests_total,
            chunks_fetching,
            chunks_total,
            chunk_duration_seconds,
            chunk_bytes,
            hosts: RwLock::new(HashMap::new()),
        })
    }

    /// The process-wide handle used by requests that do not carry their own
    pub fn global() -> Arc<Metrics> {
        Arc::clone(&GLOBAL)
    }

    /// The registry this handle records into
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Look up the metric record for a host, creating it on first use
    pub fn host(&self, host: &str) -> Arc<HostMetrics> {
        if let Some(record) = self.hosts.read().expect("host metrics lock").get(host) {
            return Arc::clone(record);
        }

        let mut hosts = self.hosts.write().expect("host metrics lock");
        // Another writer may have won the race between the read and the write
        // lock; keep whichever record landed first.
        Arc::clone(hosts.entry(host.to_string()).or_insert_with(|| {
            Arc::new(HostMetrics {
                requests_fetching: self.requests_fetching.with_label_values(&[host]),
                requests_total: self.requests_total.with_label_values(&[host, "true"]),
                requests_total_no_range: self.requests_total.with_label_values(&[host, "false"]),
                chunks_fetching_fetch: self.chunks_fetching.with_label_values(&[host, STAGE_FETCH]),
                chunks_fetching_copy: self.chunks_fetching.with_label_values(&[host, STAGE_COPY]),
                chunks_total: self.chunks_total.with_label_values(&[host]),
                chunk_duration_seconds: self.chunk_duration_seconds.with_label_values(&[host]),
                chunk_bytes: self.chunk_bytes.with_label_values(&[host]),
            })
        }))
    }

    /// Render the registry in the Prometheus text exposition format
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Per-host metric record shared by every transfer to that host
///
/// All updates go through atomic operations on the bound children; no locks
/// are taken after creation.
pub struct HostMetrics {
    requests_fetching: IntGauge,
    requests_total: IntCounter,
    requests_total_no_range: IntCounter,
    chunks_fetching_fetch: IntGauge,
    chunks_fetching_copy: IntGauge,
    chunks_total: IntCounter,
    chunk_duration_seconds: Histogram,
    chunk_bytes: Histogram,
}

impl HostMetrics {
    pub(crate) fn request_started(&self) {
        self.requests_fetching.inc();
    }

    pub(crate) fn request_finished(&self) {
        self.requests_fetching.dec();
        self.requests_total.inc();
    }

    /// A request that completed against an origin without range support.
    pub(crate) fn request_finished_without_range(&self) {
        self.requests_total_no_range.inc();
    }

    pub(crate) fn chunk_fetch_started(&self) {
        self.chunks_fetching_fetch.inc();
    }

    pub(crate) fn chunk_fetch_finished(&self) {
        self.chunks_fetching_fetch.dec();
    }

    pub(crate) fn chunk_copy_started(&self) {
        self.chunks_fetching_copy.inc();
    }

    pub(crate) fn chunk_copy_finished(&self) {
        self.chunks_fetching_copy.dec();
    }

    /// Record a delivered chunk
    pub(crate) fn observe_chunk(&self, elapsed: Duration, bytes: u64) {
        self.chunk_duration_seconds.observe(elapsed.as_secs_f64());
        self.chunk_bytes.observe(bytes as f64);
        self.chunks_total.inc();
    }
}
