//! Error types for ranged requests

use http::StatusCode;
use thiserror::Error;

/// Result type alias for ranged operations
pub type Result<T> = std::result::Result<T, FetchError>;

/// Error types that can occur while fetching a ranged request
#[derive(Error, Debug)]
pub enum FetchError {
    /// A request was built with a zero chunk size or a zero worker count.
    #[error("chunk size and workers must be greater than zero")]
    InvalidArgument,

    /// A `Range` or `Content-Range` header could not be parsed.
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// Every range in the caller's `Range` header starts past the end of the
    /// content.
    #[error("ranges failed to overlap content")]
    RangeNoOverlap,

    /// The origin reported an unsatisfied range (`Content-Range: bytes */size`).
    #[error("unsatisfied range, content size is {size}")]
    UnsatisfiedRange { size: u64 },

    /// The origin does not serve range requests: it answered the probe with
    /// 200, or a chunk subrequest with something other than 206.
    #[error("server does not support range requests (status {status})")]
    RangeUnsupported { status: StatusCode },

    /// The caller's `Range` header contained more than one range.
    #[error("multiple ranges are not supported")]
    MultipleRangesUnsupported,

    /// The probe returned a status that is neither 200 nor 206.
    #[error("unexpected status code {0}")]
    UnexpectedStatus(StatusCode),

    /// Transport-level failure from the underlying client.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// The transfer was cancelled: the body was dropped, the caller's token
    /// fired, or the transfer timeout expired.
    #[error("request cancelled")]
    Cancelled,

    /// Configuration file or value error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The synthesized response could not be assembled.
    #[error("response assembly error: {0}")]
    Assembly(String),
}

impl FetchError {
    /// True for cancellation, which the pipeline treats as a quiet shutdown
    /// rather than a failure to report through the pipe.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}
