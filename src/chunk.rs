//! Chunk math: aligned partitioning of a byte interval and RFC 7233
//! `Range` / `Content-Range` header formatting and parsing

use crate::error::{FetchError, Result};

/// A contiguous byte sub-range `[start, start + length)` of a resource.
///
/// A fetchable chunk has `length >= 1` and encodes the inclusive HTTP range
/// `start..=start + length - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chunk {
    /// Offset of the first byte of the chunk.
    pub start: u64,
    /// Number of bytes covered by the chunk.
    pub length: u64,
}

impl Chunk {
    /// Create a new Chunk
    pub fn new(start: u64, length: u64) -> Self {
        Chunk { start, length }
    }

    /// Offset of the last byte of the chunk, or `None` for an empty chunk or
    /// one whose end does not fit in a `u64`.
    pub fn last(&self) -> Option<u64> {
        if self.length == 0 {
            return None;
        }
        self.start.checked_add(self.length - 1)
    }

    /// Format a `Range` header value for this chunk (`bytes=start-end`).
    ///
    /// Returns `None` for a chunk that does not describe at least one byte.
    pub fn range_header(&self) -> Option<String> {
        let last = self.last()?;
        Some(format!("bytes={}-{}", self.start, last))
    }

    /// Format a `Content-Range` header value for this chunk against the total
    /// content size (`bytes start-end/size`).
    ///
    /// An empty chunk against a non-zero size formats as the unsatisfied form
    /// `bytes */size`. Returns `None` if the chunk does not fit inside `size`.
    pub fn content_range_header(&self, size: u64) -> Option<String> {
        if self.length == 0 {
            if size > 0 {
                return Some(format!("bytes */{}", size));
            }
            return None;
        }
        let last = self.last()?;
        if last >= size {
            return None;
        }
        Some(format!("bytes {}-{}/{}", self.start, last, size))
    }
}

/// Partition `[offset, end)` into chunks of `chunk_size` bytes, aligned to
/// multiples of `chunk_size` from zero.
///
/// The first chunk begins at `offset` but ends at the next multiple of
/// `chunk_size`, so every subsequent chunk starts on a multiple. Aligned
/// boundaries keep chunk requests cacheable by intermediate HTTP caches
/// regardless of the offset a particular transfer starts at. The final chunk
/// is truncated at `end`.
///
/// # Arguments
/// * `chunk_size` - Chunk length in bytes, at least 1
/// * `offset` - First byte of the interval to cover
/// * `end` - One past the last byte of the interval to cover
///
/// # Returns
/// The ordered plan covering `[offset, end)`; empty iff `offset == end`.
pub fn chunks(chunk_size: u64, offset: u64, end: u64) -> Vec<Chunk> {
    let mut plan = Vec::new();
    if chunk_size == 0 || offset >= end {
        return plan;
    }

    let mut start = (offset / chunk_size) * chunk_size;
    while start < end {
        let mut chunk = Chunk::new(start, chunk_size.min(end - start));
        if plan.is_empty() {
            // Nudge the first chunk to the right so it begins at the offset
            // while still ending on an aligned boundary.
            let nudge = offset % chunk_size;
            chunk.start += nudge;
            chunk.length -= nudge;
        }
        plan.push(chunk);
        start = match start.checked_add(chunk_size) {
            Some(next) => next,
            None => break,
        };
    }
    plan
}

/// Parse a `Range` header value against the total content size, per RFC 7233
/// section 3.1.
///
/// Comma-separated range specs are parsed individually; empty specs are
/// skipped. `N-M` is clamped to the content, `N-` runs to the end, and `-K`
/// addresses the final K bytes. A spec that lies entirely past the end of the
/// content is dropped; if every spec is dropped that way the whole header
/// fails with [`FetchError::RangeNoOverlap`]. Every chunk returned covers at
/// least one byte.
pub fn parse_range(header: &str, size: u64) -> Result<Vec<Chunk>> {
    const PREFIX: &str = "bytes=";
    let Some(rest) = header.strip_prefix(PREFIX) else {
        return Err(invalid_range(header));
    };

    let mut ranges = Vec::new();
    let mut no_overlap = false;
    for spec in rest.split(',') {
        let spec = spec.trim();
        if spec.is_empty() {
            continue;
        }
        let Some((first, last)) = spec.split_once('-') else {
            return Err(invalid_range(spec));
        };
        let (first, last) = (first.trim(), last.trim());

        if first.is_empty() {
            // Suffix form "-K": the final K bytes of the content.
            let mut k: u64 = last.parse().map_err(|_| invalid_range(spec))?;
            if k > size {
                k = size;
            }
            if k == 0 {
                // The final zero bytes are unsatisfiable.
                no_overlap = true;
                continue;
            }
            ranges.push(Chunk::new(size - k, k));
            continue;
        }

        let start: u64 = first.parse().map_err(|_| invalid_range(spec))?;
        if start >= size {
            no_overlap = true;
            continue;
        }
        let length = if last.is_empty() {
            // "N-" runs to the end of the content.
            size - start
        } else {
            let mut end: u64 = last.parse().map_err(|_| invalid_range(spec))?;
            if start > end {
                return Err(invalid_range(spec));
            }
            if end >= size {
                end = size - 1;
            }
            end - start + 1
        };
        ranges.push(Chunk::new(start, length));
    }

    if no_overlap && ranges.is_empty() {
        return Err(FetchError::RangeNoOverlap);
    }
    Ok(ranges)
}

/// Parse a `Content-Range` header value, per RFC 7233 section 4.2.
///
/// # Returns
/// The chunk the origin served and the total content size. The unsatisfied
/// form `bytes */size` fails with [`FetchError::UnsatisfiedRange`] carrying
/// the size; any other malformed value fails with
/// [`FetchError::InvalidRange`].
pub fn parse_content_range(header: &str) -> Result<(Chunk, u64)> {
    const PREFIX: &str = "bytes ";
    let Some(rest) = header.strip_prefix(PREFIX) else {
        return Err(invalid_range(header));
    };
    let Some((range, size)) = rest.split_once('/') else {
        return Err(invalid_range(header));
    };
    let size: u64 = size.parse().map_err(|_| invalid_range(header))?;
    if range == "*" {
        return Err(FetchError::UnsatisfiedRange { size });
    }

    let Some((start, end)) = range.split_once('-') else {
        return Err(invalid_range(header));
    };
    let start: u64 = start.parse().map_err(|_| invalid_range(header))?;
    let end: u64 = end.parse().map_err(|_| invalid_range(header))?;
    if start > end || end > size {
        return Err(invalid_range(header));
    }
    Ok((Chunk::new(start, end - start + 1), size))
}

fn invalid_range(input: &str) -> FetchError {
    FetchError::InvalidRange(input.to_string())
}
