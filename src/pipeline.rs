//! The fetch pipeline: an ordered bounded-concurrency executor that fetches
//! chunks in parallel and delivers their bodies strictly in plan order
//!
//! Each chunk runs a two-phase task. The fetch phase (a spawned task racing
//! the cancellation token) issues the subrequest and completes in whatever
//! order the origin answers. The deliver phase is driven by a single
//! coordinator that consumes fetch results in plan order and copies each body
//! into the pipe, so the caller always observes bytes in offset order. The
//! pipe is a capacity-one channel: sends suspend until the reader drains,
//! which is what propagates backpressure from a slow caller through the
//! coordinator to the bounded fetch window.

use crate::chunk::Chunk;
use crate::error::{FetchError, Result};
use crate::metrics::HostMetrics;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use http::header::RANGE;
use http::{HeaderValue, StatusCode};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Read end of the pipe, handed to the caller as the response body.
///
/// Yields body frames in offset order and terminates after yielding an
/// error. Dropping it cancels the whole pipeline, so closing the response
/// body early stops all in-flight subrequests.
pub(crate) struct RemoteBody {
    receiver: mpsc::Receiver<Result<Bytes>>,
    cancel: CancellationToken,
    done: bool,
}

impl RemoteBody {
    pub(crate) fn new(receiver: mpsc::Receiver<Result<Bytes>>, cancel: CancellationToken) -> Self {
        RemoteBody {
            receiver,
            cancel,
            done: false,
        }
    }
}

impl Stream for RemoteBody {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match this.receiver.poll_recv(cx) {
            Poll::Ready(Some(Err(err))) => {
                this.done = true;
                Poll::Ready(Some(Err(err)))
            }
            other => other,
        }
    }
}

impl Drop for RemoteBody {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Launch the pipeline for a planned transfer and return the pipe's read end.
pub(crate) fn spawn(
    client: reqwest::Client,
    template: reqwest::Request,
    plan: Vec<Chunk>,
    workers: u32,
    cancel: CancellationToken,
    metrics: Arc<HostMetrics>,
) -> RemoteBody {
    let (sender, receiver) = mpsc::channel(1);
    metrics.request_started();
    tokio::spawn(run(
        client,
        template,
        plan,
        workers,
        cancel.clone(),
        metrics,
        sender,
    ));
    RemoteBody::new(receiver, cancel)
}

/// Supervise the transfer: schedule up to `workers` fetches in plan order and
/// drive the deliver phases serially.
async fn run(
    client: reqwest::Client,
    template: reqwest::Request,
    plan: Vec<Chunk>,
    workers: u32,
    cancel: CancellationToken,
    metrics: Arc<HostMetrics>,
    sender: mpsc::Sender<Result<Bytes>>,
) {
    debug!(
        "fetching {} chunks with {} workers from {}",
        plan.len(),
        workers,
        template.url()
    );

    // Lazily spawning through `buffered` keeps at most `workers` chunks in
    // flight while yielding completed fetches in submission order.
    let mut deliveries = stream::iter(plan.into_iter().map(|chunk| {
        let client = client.clone();
        let request = subrequest(&template, chunk);
        let cancel = cancel.clone();
        let metrics = Arc::clone(&metrics);
        async move {
            let request = request?;
            let handle = tokio::spawn(fetch_chunk(client, request, cancel, metrics));
            match handle.await {
                Ok(result) => result,
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(_) => Err(FetchError::Cancelled),
            }
        }
    }))
    .buffered(workers as usize);

    while let Some(fetched) = deliveries.next().await {
        match fetched {
            Ok(fetched) => {
                metrics.chunk_copy_started();
                let delivered = deliver(fetched.response, &sender, &cancel).await;
                metrics.chunk_copy_finished();
                match delivered {
                    Ok(bytes) => {
                        metrics.observe_chunk(fetched.started.elapsed(), bytes);
                    }
                    Err(DeliverError::Cancelled) => {
                        // A reader that dropped the body no longer receives;
                        // any other cancellation surfaces on its next read.
                        debug!("chunk delivery cancelled");
                        let _ = sender.send(Err(FetchError::Cancelled)).await;
                        break;
                    }
                    Err(DeliverError::Closed) => {
                        // The reader dropped the body: a normal early close,
                        // not an error. Stop the remaining workers.
                        debug!("body closed by reader, stopping pipeline");
                        cancel.cancel();
                        break;
                    }
                    Err(DeliverError::Failed(err)) => {
                        warn!("chunk body copy failed: {}", err);
                        cancel.cancel();
                        let _ = sender.send(Err(err)).await;
                        break;
                    }
                }
            }
            Err(err) => {
                cancel.cancel();
                if !err.is_cancelled() {
                    warn!("chunk fetch failed: {}", err);
                }
                let _ = sender.send(Err(err)).await;
                break;
            }
        }
    }

    // Terminal state: dropping the sender closes the pipe, so the reader sees
    // end-of-stream (or the error sent above) once it drains.
    metrics.request_finished();
}

/// A chunk whose fetch phase has completed and whose body is ready to be
/// delivered.
struct FetchedChunk {
    response: reqwest::Response,
    started: Instant,
}

/// Fetch phase: issue the subrequest and validate the status, leaving the
/// body unread for the deliver phase.
async fn fetch_chunk(
    client: reqwest::Client,
    request: reqwest::Request,
    cancel: CancellationToken,
    metrics: Arc<HostMetrics>,
) -> Result<FetchedChunk> {
    metrics.chunk_fetch_started();
    let started = Instant::now();
    let result = tokio::select! {
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        result = client.execute(request) => result.map_err(FetchError::from),
    };
    metrics.chunk_fetch_finished();

    let response = result?;
    let status = response.status();
    if status != StatusCode::PARTIAL_CONTENT {
        return Err(FetchError::RangeUnsupported { status });
    }
    Ok(FetchedChunk { response, started })
}

enum DeliverError {
    Cancelled,
    Closed,
    Failed(FetchError),
}

/// Deliver phase: copy the chunk's body into the pipe frame by frame.
///
/// Returns the number of bytes delivered. Sends suspend until the reader
/// consumes, so a slow caller stalls the coordinator here.
async fn deliver(
    mut response: reqwest::Response,
    sender: &mpsc::Sender<Result<Bytes>>,
    cancel: &CancellationToken,
) -> std::result::Result<u64, DeliverError> {
    let mut delivered = 0u64;
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return Err(DeliverError::Cancelled),
            frame = response.chunk() => frame,
        };
        match frame {
            Ok(Some(bytes)) => {
                delivered += bytes.len() as u64;
                let sent = tokio::select! {
                    _ = cancel.cancelled() => return Err(DeliverError::Cancelled),
                    sent = sender.send(Ok(bytes)) => sent,
                };
                if sent.is_err() {
                    return Err(DeliverError::Closed);
                }
            }
            Ok(None) => return Ok(delivered),
            Err(err) => return Err(DeliverError::Failed(FetchError::from(err))),
        }
    }
}

/// Clone the caller's request for one chunk, replacing only the `Range`
/// header. Method and remaining headers carry over unchanged.
fn subrequest(template: &reqwest::Request, chunk: Chunk) -> Result<reqwest::Request> {
    let mut request = template.try_clone().ok_or(FetchError::InvalidArgument)?;
    let header = chunk
        .range_header()
        .ok_or_else(|| FetchError::InvalidRange(format!("chunk {:?} spans no bytes", chunk)))?;
    let value =
        HeaderValue::from_str(&header).map_err(|e| FetchError::Assembly(e.to_string()))?;
    request.headers_mut().insert(RANGE, value);
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use http::Method;

    fn test_body() -> (mpsc::Sender<Result<Bytes>>, RemoteBody) {
        let (sender, receiver) = mpsc::channel(1);
        let body = RemoteBody::new(receiver, CancellationToken::new());
        (sender, body)
    }

    #[tokio::test]
    async fn test_remote_body_yields_frames_in_order() {
        let (sender, mut body) = test_body();
        tokio::spawn(async move {
            for frame in ["first", "second", "third"] {
                sender.send(Ok(Bytes::from(frame))).await.unwrap();
            }
        });

        assert_eq!(body.next().await.unwrap().unwrap(), Bytes::from("first"));
        assert_eq!(body.next().await.unwrap().unwrap(), Bytes::from("second"));
        assert_eq!(body.next().await.unwrap().unwrap(), Bytes::from("third"));
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn test_remote_body_terminates_after_error() {
        let (sender, mut body) = test_body();
        sender.send(Err(FetchError::RangeNoOverlap)).await.unwrap();

        assert!(matches!(
            body.next().await,
            Some(Err(FetchError::RangeNoOverlap))
        ));
        assert!(body.next().await.is_none());
        // Still drained even though the sender is alive.
        assert!(body.next().await.is_none());
        drop(sender);
    }

    #[tokio::test]
    async fn test_remote_body_drop_cancels_pipeline() {
        let (_sender, body) = test_body();
        let cancel = body.cancel.clone();
        assert!(!cancel.is_cancelled());
        drop(body);
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn test_subrequest_sets_range_header() {
        let template = reqwest::Request::new(Method::GET, "http://example.com/".parse().unwrap());
        let request = subrequest(&template, Chunk::new(100, 50)).unwrap();
        assert_eq!(request.headers()[RANGE], "bytes=100-149");
    }

    #[test]
    fn test_subrequest_replaces_caller_range() {
        let mut template =
            reqwest::Request::new(Method::GET, "http://example.com/".parse().unwrap());
        template
            .headers_mut()
            .insert(RANGE, HeaderValue::from_static("bytes=42-"));
        let request = subrequest(&template, Chunk::new(0, 10)).unwrap();
        assert_eq!(request.headers()[RANGE], "bytes=0-9");
    }

    #[test]
    fn test_subrequest_rejects_empty_chunk() {
        let template = reqwest::Request::new(Method::GET, "http://example.com/".parse().unwrap());
        assert!(matches!(
            subrequest(&template, Chunk::new(0, 0)),
            Err(FetchError::InvalidRange(_))
        ));
    }
}
