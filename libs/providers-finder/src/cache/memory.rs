use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

use super::{CacheStore, CacheStoreError, CachedValue};
use crate::error::FinderError;

struct StoredEntry {
    value: CachedValue,
    expires_at: Instant,
}

/// Process-local store. Shares nothing across processes.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, StoredEntry>,
    // per-key gate held while computing
    inflight: DashMap<String, Arc<Mutex<()>>>,
    tags: DashMap<String, HashSet<String>>,
}

impl std::fmt::Debug for MemoryCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCacheStore")
            .field("entries", &self.entries.len())
            .field("tags", &self.tags.len())
            .finish()
    }
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn gate(&self, key: &str) -> Arc<Mutex<()>> {
        self.inflight.entry(key.to_string()).or_default().clone()
    }

    fn fresh(&self, key: &str) -> Option<CachedValue> {
        self.entries
            .get(key)
            .filter(|e| Instant::now() < e.expires_at)
            .map(|e| e.value.clone())
    }
}

impl CacheStore for MemoryCacheStore {
    fn get_or_compute(
        &self,
        key: &str,
        tags: &[&str],
        ttl: Duration,
        compute: &mut dyn FnMut() -> Result<CachedValue, FinderError>,
    ) -> Result<CachedValue, FinderError> {
        if let Some(v) = self.fresh(key) {
            tracing::debug!(key, "Cache hit");
            return Ok(v);
        }

        let gate = self.gate(key);
        let _guard = gate.lock();

        // Another caller may have filled it while we waited.
        if let Some(v) = self.fresh(key) {
            tracing::debug!(key, "Cache filled by concurrent computation");
            return Ok(v);
        }

        self.register_invalidation(tags, key)
            .map_err(|e| e.for_key(key))?;
        let value = compute()?;
        self.entries.insert(
            key.to_string(),
            StoredEntry {
                value: value.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(value)
    }

    fn register_invalidation(&self, tags: &[&str], key: &str) -> Result<(), CacheStoreError> {
        for tag in tags {
            self.tags
                .entry((*tag).to_string())
                .or_default()
                .insert(key.to_string());
        }
        Ok(())
    }

    fn invalidate_tags(&self, tags: &[&str]) -> Result<usize, CacheStoreError> {
        let mut removed = 0;
        for tag in tags {
            let Some((_, keys)) = self.tags.remove(*tag) else {
                continue;
            };
            for key in keys {
                let gate = self.gate(&key);
                let _guard = gate.lock();
                if self.entries.remove(&key).is_some() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    const HOUR: Duration = Duration::from_secs(3600);

    fn ok(v: CachedValue) -> Result<CachedValue, FinderError> {
        Ok(v)
    }

    #[test]
    fn computes_once_then_hits() {
        let store = MemoryCacheStore::new();
        let mut calls = 0;
        let mut compute = || {
            calls += 1;
            ok(json!(["a"]))
        };

        assert_eq!(store.get_or_compute("k", &[], HOUR, &mut compute).unwrap(), json!(["a"]));
        assert_eq!(store.get_or_compute("k", &[], HOUR, &mut compute).unwrap(), json!(["a"]));
        drop(compute);
        assert_eq!(calls, 1);
    }

    #[test]
    fn expired_entries_are_recomputed() {
        let store = MemoryCacheStore::new();
        let mut calls = 0;
        let mut compute = || {
            calls += 1;
            ok(json!(calls))
        };

        store.get_or_compute("k", &[], Duration::ZERO, &mut compute).unwrap();
        let second = store.get_or_compute("k", &[], Duration::ZERO, &mut compute).unwrap();
        assert_eq!(second, json!(2));
    }

    #[test]
    fn compute_errors_are_not_cached() {
        let store = MemoryCacheStore::new();
        let err = store
            .get_or_compute("k", &[], HOUR, &mut || -> Result<CachedValue, FinderError> {
                Err(FinderError::CyclicDependency {
                    contract: "X".into(),
                    path: vec!["a".into(), "b".into(), "a".into()],
                })
            })
            .unwrap_err();
        assert!(matches!(err, FinderError::CyclicDependency { .. }));

        let v = store.get_or_compute("k", &[], HOUR, &mut || ok(json!(1))).unwrap();
        assert_eq!(v, json!(1));
    }

    #[test]
    fn invalidation_by_tag_drops_entries() {
        let store = MemoryCacheStore::new();
        store.get_or_compute("k1", &["t"], HOUR, &mut || ok(json!(1))).unwrap();
        store.get_or_compute("k2", &[], HOUR, &mut || ok(json!(2))).unwrap();

        assert_eq!(store.invalidate_tags(&["t"]).unwrap(), 1);
        assert_eq!(store.invalidate_tags(&["t"]).unwrap(), 0);

        let v = store.get_or_compute("k1", &["t"], HOUR, &mut || ok(json!(10))).unwrap();
        assert_eq!(v, json!(10));
        let v = store.get_or_compute("k2", &[], HOUR, &mut || ok(json!(20))).unwrap();
        assert_eq!(v, json!(2));
    }

    #[test]
    fn concurrent_callers_share_one_computation() {
        let store = Arc::new(MemoryCacheStore::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let calls = calls.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    store
                        .get_or_compute("k", &[], HOUR, &mut || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(Duration::from_millis(20));
                            ok(json!("v"))
                        })
                        .unwrap()
                })
            })
            .collect();

        for h in handles {
            assert_eq!(h.join().unwrap(), json!("v"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalidation_waits_for_inflight_computation() {
        let store = Arc::new(MemoryCacheStore::new());
        let mut invalidator = None;

        let served = store
            .get_or_compute("k", &["t"], HOUR, &mut || {
                let other = store.clone();
                invalidator = Some(std::thread::spawn(move || other.invalidate_tags(&["t"])));
                std::thread::sleep(Duration::from_millis(20));
                ok(json!("stale"))
            })
            .unwrap();
        assert_eq!(served, json!("stale"));

        let removed = invalidator.unwrap().join().unwrap().unwrap();
        assert_eq!(removed, 1);
        let v = store.get_or_compute("k", &["t"], HOUR, &mut || ok(json!("fresh"))).unwrap();
        assert_eq!(v, json!("fresh"));
    }
}
