use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvestError {
    /// Request timed out; the caller may retry with backoff.
    #[error("Request to {url} timed out after {elapsed:?}")]
    TransientNetwork { url: String, elapsed: Duration },

    /// Service answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// Downloaded content is not a usable document.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A service response could not be understood.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Writing to disk failed. No partial file is left behind.
    #[error("Persistence error at {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The candidate pool ran dry before the quota was met.
    #[error("Candidates exhausted for {category}: {collected}/{target}")]
    Exhaustion {
        category: String,
        collected: usize,
        target: usize,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HarvestError {
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence { path: path.into(), source }
    }

    /// Only timeouts are worth another attempt against the same URL.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork { .. })
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;
