//! External cache stores used to reuse resolutions across runs.
//!
//! A store is a keyed get-or-compute with expiry plus tag-based invalidation.
//! Implementations guarantee at most one in-flight computation per key: other
//! callers for the same key block and receive the computed value. Invalidation
//! of a key waits for its in-flight computation, so a tag can never miss an
//! entry that is being written.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::error::FinderError;

mod file;
mod lock;
mod memory;

pub use file::FileCacheStore;
pub use lock::CacheLock;
pub use memory::MemoryCacheStore;

/// Payload kept by a store.
pub type CachedValue = serde_json::Value;

pub trait CacheStore: Send + Sync {
    /// Return the unexpired value for `key`, or run `compute`, store its
    /// result for `ttl` under `tags` and return it. Errors from `compute` are
    /// passed through and nothing is stored.
    ///
    /// `tags` are registered while the key is held, before `compute` runs.
    fn get_or_compute(
        &self,
        key: &str,
        tags: &[&str],
        ttl: Duration,
        compute: &mut dyn FnMut() -> Result<CachedValue, FinderError>,
    ) -> Result<CachedValue, FinderError>;

    /// Tag `key` so that invalidating any of `tags` drops it.
    fn register_invalidation(&self, tags: &[&str], key: &str) -> Result<(), CacheStoreError>;

    /// Drop every entry tagged with one of `tags`; returns how many were removed.
    /// Blocks while any of those entries is being computed.
    fn invalidate_tags(&self, tags: &[&str]) -> Result<usize, CacheStoreError>;
}

/// Infrastructure failures of a cache store.
#[derive(Debug, Error)]
pub enum CacheStoreError {
    #[error("I/O error on cache path {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to acquire cache lock {path:?}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt cache file {path:?}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheStoreError {
    pub(crate) fn for_key(self, key: &str) -> FinderError {
        FinderError::CacheStore {
            key: key.to_string(),
            source: anyhow::Error::new(self),
        }
    }
}
