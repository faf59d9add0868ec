//! Cross-process file locks for the on-disk cache.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;

use super::CacheStoreError;

/// Exclusive lock on `{cache_dir}/.locks/{name}.lock`, released on drop.
pub struct CacheLock {
    file: File,
    path: PathBuf,
}

impl CacheLock {
    /// Blocks until no other process holds the lock for `name`.
    pub fn acquire(cache_dir: &Path, name: &str) -> Result<Self, CacheStoreError> {
        let locks_dir = cache_dir.join(".locks");
        std::fs::create_dir_all(&locks_dir).map_err(|source| CacheStoreError::Io {
            path: locks_dir.clone(),
            source,
        })?;

        let path = locks_dir.join(format!("{name}.lock"));
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| CacheStoreError::Lock {
                path: path.clone(),
                source,
            })?;

        file.lock_exclusive()
            .map_err(|source| CacheStoreError::Lock {
                path: path.clone(),
                source,
            })?;

        Ok(Self { file, path })
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(lock = %self.path.display(), error = %e, "Failed to release cache lock");
        }
    }
}
