//! Error types for the store crate.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors from locking and cache file access.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The lock could not be acquired before the timeout elapsed.
    #[error("Lock on '{}' not acquired within {timeout:?}", path.display())]
    Unavailable { path: PathBuf, timeout: Duration },

    /// Filesystem error.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short, stable tag for the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "cache_unavailable",
            Self::Io { .. } => "io",
            Self::Json(_) => "serialization",
        }
    }
}
