use std::time::Duration;

use thiserror::Error;

/// A failure reported by an [`AssetLoader`](crate::AssetLoader).
///
/// Cloneable so that a single failed load can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// No asset exists at the requested address.
    #[error("not found")]
    NotFound,

    /// The asset exists but could not be read.
    #[error("io error: {0}")]
    Io(String),

    /// The asset was read but its contents are invalid.
    #[error("malformed: {0}")]
    Malformed(String),

    /// The load was torn down before producing a result (the loader panicked).
    #[error("load aborted: {0}")]
    Aborted(String),
}

impl From<std::io::Error> for LoadError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound,
            _ => Self::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for LoadError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Errors surfaced by the [`ResourceCache`](crate::ResourceCache).
///
/// None of these are fatal to the cache; each is reported to the caller of the
/// operation that hit it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("asset address must not be empty")]
    InvalidAddress,

    #[error("failed to load '{address}': {source}")]
    LoadFailed { address: String, source: LoadError },

    #[error("'{address}' is not cached")]
    NotCached { address: String },

    #[error("'{address}' released more often than it was acquired")]
    DoubleRelease { address: String },

    #[error("'{address}' evicted with {ref_count} outstanding reference(s)")]
    EvictWhileReferenced { address: String, ref_count: usize },

    /// The pending load was detached by an eviction or `clear_all`.
    #[error("pending load of '{address}' was cancelled")]
    Cancelled { address: String },

    #[error("acquiring '{address}' timed out after {after:?}")]
    Timeout { address: String, after: Duration },
}

impl CacheError {
    /// The address the error refers to, if any.
    pub fn address(&self) -> Option<&str> {
        match self {
            Self::InvalidAddress => None,
            Self::LoadFailed { address, .. }
            | Self::NotCached { address }
            | Self::DoubleRelease { address }
            | Self::EvictWhileReferenced { address, .. }
            | Self::Cancelled { address }
            | Self::Timeout { address, .. } => Some(address),
        }
    }
}
