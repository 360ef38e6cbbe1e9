//! Configuration for ranged transfers

use crate::error::{FetchError, Result};
use crate::probe::ProbeMethod;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Configuration for ranged transfers
///
/// Every field has a default, so a config file only needs to name the values
/// it overrides:
///
/// ```yaml
/// chunk_size: 4194304     # 4 MiB chunks
/// workers: 16
/// continue_without_range: true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangedConfig {
    /// Size of each chunk in bytes (default: 1 MiB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Maximum number of chunks fetched concurrently (default: 8)
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Whether to serve the origin's plain response when it does not support
    /// range requests, instead of failing (default: false)
    #[serde(default)]
    pub continue_without_range: bool,

    /// How to probe the origin for range support (default: a one-byte range GET)
    #[serde(default)]
    pub probe_method: ProbeMethod,

    /// Optional whole-transfer timeout in seconds; unset means no deadline
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_chunk_size() -> u64 {
    1024 * 1024
}

fn default_workers() -> u32 {
    8
}

impl Default for RangedConfig {
    fn default() -> Self {
        RangedConfig {
            chunk_size: default_chunk_size(),
            workers: default_workers(),
            continue_without_range: false,
            probe_method: ProbeMethod::default(),
            timeout_secs: None,
        }
    }
}

impl RangedConfig {
    /// Validate the configuration values
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.workers == 0 {
            return Err(FetchError::InvalidArgument);
        }
        if self.timeout_secs == Some(0) {
            return Err(FetchError::Config(
                "timeout_secs must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Load and validate a configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).map_err(|e| {
            FetchError::Config(format!(
                "failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: RangedConfig = serde_yaml::from_str(&content)
            .map_err(|e| FetchError::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// The whole-transfer timeout as a [`Duration`], if configured
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
