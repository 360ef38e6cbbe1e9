//! Origin probing: one preliminary request that discovers total content
//! length and whether the origin serves range requests

use crate::chunk;
use crate::error::{FetchError, Result};
use http::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use http::{HeaderMap, HeaderValue, Method, StatusCode, Version};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How to probe the origin for range support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeMethod {
    /// `GET` with `Range: bytes=0-0`. The default: some origins answer HEAD
    /// incorrectly or not at all, and a one-byte range GET also yields the
    /// total length via `Content-Range` in the same round trip.
    #[default]
    RangeGet,

    /// `HEAD`, judging support from `Accept-Ranges: bytes` and
    /// `Content-Length`. Use this for origins where a GET carries side
    /// effects the probe must not trigger.
    Head,
}

/// Outcome of probing the origin
pub(crate) enum Probed {
    /// The origin serves ranges. Carries the total content length and the
    /// probe response's version and headers, which template the synthesized
    /// response.
    Ranged {
        total: u64,
        version: Version,
        headers: HeaderMap,
    },
    /// The origin ignored the probe and answered 200. A range-GET probe
    /// carries its own full-body response for the fallback path; a HEAD
    /// probe has no body to reuse.
    Unranged(Option<reqwest::Response>),
}

/// Send the probe and classify the origin's answer.
///
/// 206 means ranges are supported and `Content-Range` carries the total
/// length; 200 means the probe was ignored; anything else fails with
/// [`FetchError::UnexpectedStatus`].
pub(crate) async fn probe(
    client: &reqwest::Client,
    template: &reqwest::Request,
    method: ProbeMethod,
    cancel: &CancellationToken,
) -> Result<Probed> {
    let mut request = template.try_clone().ok_or(FetchError::InvalidArgument)?;
    match method {
        ProbeMethod::RangeGet => {
            *request.method_mut() = Method::GET;
            request
                .headers_mut()
                .insert(RANGE, HeaderValue::from_static("bytes=0-0"));
        }
        ProbeMethod::Head => {
            *request.method_mut() = Method::HEAD;
            // The caller's Range is resolved locally against the discovered
            // length; it must not influence the probe's answer.
            request.headers_mut().remove(RANGE);
        }
    }

    debug!(
        "probing url={} method={:?}",
        request.url(),
        request.method()
    );
    let response = tokio::select! {
        _ = cancel.cancelled() => return Err(FetchError::Cancelled),
        result = client.execute(request) => result.map_err(FetchError::from)?,
    };

    let status = response.status();
    match method {
        ProbeMethod::RangeGet => match status {
            StatusCode::PARTIAL_CONTENT => {
                let total = total_from_content_range(response.headers())?;
                debug!("probe found range support, total={}", total);
                Ok(Probed::Ranged {
                    total,
                    version: response.version(),
                    headers: response.headers().clone(),
                })
            }
            StatusCode::OK => {
                debug!("probe answered 200, origin ignored the range");
                Ok(Probed::Unranged(Some(response)))
            }
            other => {
                warn!("probe answered unexpected status {}", other);
                Err(FetchError::UnexpectedStatus(other))
            }
        },
        ProbeMethod::Head => match status {
            StatusCode::OK => {
                let supports_range = response
                    .headers()
                    .get(ACCEPT_RANGES)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.eq_ignore_ascii_case("bytes"))
                    .unwrap_or(false);
                let total = response
                    .headers()
                    .get(CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok());
                match (supports_range, total) {
                    (true, Some(total)) => {
                        debug!("HEAD probe found range support, total={}", total);
                        Ok(Probed::Ranged {
                            total,
                            version: response.version(),
                            headers: response.headers().clone(),
                        })
                    }
                    _ => {
                        debug!("HEAD probe found no usable range support");
                        Ok(Probed::Unranged(None))
                    }
                }
            }
            other => {
                warn!("HEAD probe answered unexpected status {}", other);
                Err(FetchError::UnexpectedStatus(other))
            }
        },
    }
}

/// Extract the total content length from a 206 probe's `Content-Range`.
fn total_from_content_range(headers: &HeaderMap) -> Result<u64> {
    let header = headers
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            FetchError::InvalidRange("probe response is missing Content-Range".to_string())
        })?;
    let (_, total) = chunk::parse_content_range(header)?;
    Ok(total)
}
