use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{CacheLock, CacheStore, CacheStoreError, CachedValue};
use crate::error::FinderError;

const TAGS_FILE: &str = "tags.json";
const TAGS_LOCK: &str = "__tags";

#[derive(Debug, Serialize, Deserialize)]
struct EntryFile {
    key: String,
    expires_at: DateTime<Utc>,
    value: CachedValue,
}

/// tag -> keys
type TagIndex = BTreeMap<String, BTreeSet<String>>;

/// Store keeping one JSON file per key under a directory, shared by every
/// process pointing at the same directory.
///
/// Single-flight holds across threads (per-key mutex) and across processes
/// (exclusive lock file). Unreadable or corrupt entries are errors.
pub struct FileCacheStore {
    dir: PathBuf,
    gates: DashMap<String, Arc<Mutex<()>>>,
    tags_gate: Mutex<()>,
}

impl std::fmt::Debug for FileCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCacheStore")
            .field("dir", &self.dir)
            .finish()
    }
}

/// Key reduced to characters safe in a file name.
fn file_stem(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CacheStoreError + '_ {
    move |source| CacheStoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write through a sibling temp file so readers never see a partial file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheStoreError> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes).map_err(io_err(&tmp))?;
    std::fs::rename(&tmp, path).map_err(io_err(path))
}

fn encode<T: Serialize>(path: &Path, value: &T) -> Result<Vec<u8>, CacheStoreError> {
    serde_json::to_vec_pretty(value).map_err(|source| CacheStoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

impl FileCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CacheStoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        Ok(Self {
            dir,
            gates: DashMap::new(),
            tags_gate: Mutex::new(()),
        })
    }

    fn gate(&self, key: &str) -> Arc<Mutex<()>> {
        self.gates.entry(key.to_string()).or_default().clone()
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }

    fn read_fresh(&self, key: &str) -> Result<Option<CachedValue>, CacheStoreError> {
        let path = self.entry_path(key);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(&path)(e)),
        };
        let entry: EntryFile =
            serde_json::from_slice(&raw).map_err(|source| CacheStoreError::Corrupt {
                path: path.clone(),
                source,
            })?;

        if entry.key != key || Utc::now() >= entry.expires_at {
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    fn write_entry(&self, key: &str, ttl: Duration, value: &CachedValue) -> Result<(), CacheStoreError> {
        let path = self.entry_path(key);
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let entry = EntryFile {
            key: key.to_string(),
            expires_at,
            value: value.clone(),
        };
        write_atomic(&path, &encode(&path, &entry)?)
    }

    fn read_tags(&self) -> Result<TagIndex, CacheStoreError> {
        let path = self.dir.join(TAGS_FILE);
        match std::fs::read(&path) {
            Ok(raw) => serde_json::from_slice(&raw)
                .map_err(|source| CacheStoreError::Corrupt { path, source }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TagIndex::new()),
            Err(e) => Err(io_err(&path)(e)),
        }
    }

    fn write_tags(&self, tags: &TagIndex) -> Result<(), CacheStoreError> {
        let path = self.dir.join(TAGS_FILE);
        write_atomic(&path, &encode(&path, tags)?)
    }
}

impl CacheStore for FileCacheStore {
    fn get_or_compute(
        &self,
        key: &str,
        tags: &[&str],
        ttl: Duration,
        compute: &mut dyn FnMut() -> Result<CachedValue, FinderError>,
    ) -> Result<CachedValue, FinderError> {
        if let Some(v) = self.read_fresh(key).map_err(|e| e.for_key(key))? {
            tracing::debug!(key, "Cache hit");
            return Ok(v);
        }

        let gate = self.gate(key);
        let _guard = gate.lock();
        let _lock = CacheLock::acquire(&self.dir, &file_stem(key)).map_err(|e| e.for_key(key))?;

        if let Some(v) = self.read_fresh(key).map_err(|e| e.for_key(key))? {
            tracing::debug!(key, "Cache filled by concurrent computation");
            return Ok(v);
        }

        self.register_invalidation(tags, key)
            .map_err(|e| e.for_key(key))?;
        let value = compute()?;
        self.write_entry(key, ttl, &value)
            .map_err(|e| e.for_key(key))?;
        Ok(value)
    }

    fn register_invalidation(&self, tags: &[&str], key: &str) -> Result<(), CacheStoreError> {
        let _guard = self.tags_gate.lock();
        let _lock = CacheLock::acquire(&self.dir, TAGS_LOCK)?;

        let mut index = self.read_tags()?;
        for tag in tags {
            index
                .entry((*tag).to_string())
                .or_default()
                .insert(key.to_string());
        }
        self.write_tags(&index)
    }

    fn invalidate_tags(&self, tags: &[&str]) -> Result<usize, CacheStoreError> {
        // Detach the keys first; the tags lock is never held while waiting on a key.
        let keys = {
            let _guard = self.tags_gate.lock();
            let _lock = CacheLock::acquire(&self.dir, TAGS_LOCK)?;

            let mut index = self.read_tags()?;
            let keys: BTreeSet<String> = tags
                .iter()
                .filter_map(|tag| index.remove(*tag))
                .flatten()
                .collect();
            self.write_tags(&index)?;
            keys
        };

        let mut removed = 0;
        for key in keys {
            let gate = self.gate(&key);
            let _guard = gate.lock();
            let _lock = CacheLock::acquire(&self.dir, &file_stem(&key))?;

            let path = self.entry_path(&key);
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_err(&path)(e)),
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    const HOUR: Duration = Duration::from_secs(3600);

    fn ok(v: CachedValue) -> Result<CachedValue, FinderError> {
        Ok(v)
    }

    #[test]
    fn entries_survive_a_new_store_instance() {
        let tmp = tempdir().unwrap();
        let first = FileCacheStore::new(tmp.path()).unwrap();
        first
            .get_or_compute("providers-finder.Routes", &[], HOUR, &mut || ok(json!(["a"])))
            .unwrap();

        let second = FileCacheStore::new(tmp.path()).unwrap();
        let v = second
            .get_or_compute("providers-finder.Routes", &[], HOUR, &mut || ok(json!(["b"])))
            .unwrap();
        assert_eq!(v, json!(["a"]));
    }

    #[test]
    fn expired_entry_is_recomputed() {
        let tmp = tempdir().unwrap();
        let store = FileCacheStore::new(tmp.path()).unwrap();
        store.get_or_compute("k", &[], Duration::ZERO, &mut || ok(json!(1))).unwrap();
        let v = store.get_or_compute("k", &[], HOUR, &mut || ok(json!(2))).unwrap();
        assert_eq!(v, json!(2));
    }

    #[test]
    fn corrupt_entry_is_an_error() {
        let tmp = tempdir().unwrap();
        let store = FileCacheStore::new(tmp.path()).unwrap();
        std::fs::write(store.entry_path("k"), "{ broken").unwrap();

        let err = store.get_or_compute("k", &[], HOUR, &mut || ok(json!(1))).unwrap_err();
        match err {
            FinderError::CacheStore { key, .. } => assert_eq!(key, "k"),
            other => panic!("expected CacheStore, got: {other:?}"),
        }
    }

    #[test]
    fn invalidation_removes_tagged_files() {
        let tmp = tempdir().unwrap();
        let store = FileCacheStore::new(tmp.path()).unwrap();
        store.get_or_compute("k1", &["t"], HOUR, &mut || ok(json!(1))).unwrap();
        store.get_or_compute("k2", &[], HOUR, &mut || ok(json!(2))).unwrap();

        // A second process sees the same tag index.
        let other = FileCacheStore::new(tmp.path()).unwrap();
        assert_eq!(other.invalidate_tags(&["t"]).unwrap(), 1);
        assert!(!store.entry_path("k1").exists());
        assert!(store.entry_path("k2").exists());

        let v = store.get_or_compute("k1", &["t"], HOUR, &mut || ok(json!(10))).unwrap();
        assert_eq!(v, json!(10));
    }

    #[test]
    fn invalidation_from_another_process_waits_for_inflight_write() {
        let tmp = tempdir().unwrap();
        let store = FileCacheStore::new(tmp.path()).unwrap();
        let dir = tmp.path().to_path_buf();
        let mut invalidator = None;

        let served = store
            .get_or_compute("k", &["t"], HOUR, &mut || {
                let dir = dir.clone();
                invalidator = Some(std::thread::spawn(move || {
                    FileCacheStore::new(dir)?.invalidate_tags(&["t"])
                }));
                std::thread::sleep(Duration::from_millis(20));
                ok(json!(["stale"]))
            })
            .unwrap();
        assert_eq!(served, json!(["stale"]));

        let removed = invalidator.unwrap().join().unwrap().unwrap();
        assert_eq!(removed, 1);
        let v = store.get_or_compute("k", &["t"], HOUR, &mut || ok(json!(["fresh"]))).unwrap();
        assert_eq!(v, json!(["fresh"]));
    }

    #[test]
    fn file_stem_replaces_unsafe_characters() {
        assert_eq!(file_stem("providers-finder.Config/Provider"), "providers-finder.Config_Provider");
    }
}
