//! Assembly of the synthesized response handed back to the caller

use crate::chunk::Chunk;
use crate::error::{FetchError, Result};
use crate::pipeline::RemoteBody;
use http::header::{CONTENT_LENGTH, CONTENT_RANGE};
use http::{HeaderMap, HeaderValue, StatusCode, Version};

/// Build the response the caller reads from.
///
/// The probe response's version and headers form the skeleton. Without a
/// caller range the response is a plain `200 OK` whose `Content-Length` is
/// the full content size; with one it is `206 Partial Content` carrying a
/// synthesized `Content-Range` and the sub-range's length. Either way the
/// body is the pipeline pipe, so the advertised length always matches the
/// bytes the pipeline emits for the planned interval.
pub(crate) fn assemble(
    version: Version,
    mut headers: HeaderMap,
    total: u64,
    caller_range: Option<Chunk>,
    body: RemoteBody,
) -> Result<reqwest::Response> {
    // The probe's own Content-Range and Content-Length describe its one-byte
    // answer, not the assembled body.
    headers.remove(CONTENT_RANGE);
    headers.remove(CONTENT_LENGTH);

    let (status, content_length) = match caller_range {
        Some(range) => {
            let header = range.content_range_header(total).ok_or_else(|| {
                FetchError::Assembly(format!(
                    "range {:?} does not fit content of {} bytes",
                    range, total
                ))
            })?;
            let value = HeaderValue::from_str(&header)
                .map_err(|e| FetchError::Assembly(e.to_string()))?;
            headers.insert(CONTENT_RANGE, value);
            (StatusCode::PARTIAL_CONTENT, range.length)
        }
        None => (StatusCode::OK, total),
    };
    headers.insert(CONTENT_LENGTH, HeaderValue::from(content_length));

    let mut builder = http::Response::builder().status(status).version(version);
    if let Some(map) = builder.headers_mut() {
        *map = headers;
    }
    let response = builder
        .body(reqwest::Body::wrap_stream(body))
        .map_err(|e| FetchError::Assembly(e.to_string()))?;
    Ok(reqwest::Response::from(response))
}
