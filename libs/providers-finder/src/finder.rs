use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::cache::{CacheStore, CachedValue};
use crate::error::FinderError;
use crate::filter;
use crate::graph;
use crate::legacy;
use crate::matcher;
use crate::metadata::{MetadataSource, StaticMetadata};
use crate::model::ProviderRecord;
use crate::namespace::{self, NamespaceSources};
use crate::namespaces_config::NamespaceSource;
use crate::registry::ProviderRegistry;

/// Prefix of every external cache key.
pub const CACHE_KEY_PREFIX: &str = "providers-finder";

/// External cache key for `contract`; also the tag used to invalidate it.
pub fn cache_key(contract: &str) -> String {
    format!("{CACHE_KEY_PREFIX}.{contract}")
}

/// Runtime knobs of a [`ProvidersFinder`].
#[derive(Debug, Clone)]
pub struct FinderSettings {
    /// Installed modules outside this prefix are not namespaces.
    pub reserved_prefix: String,
    /// Contract whose resolution must not read configured namespaces
    /// nor go through the external store.
    pub bootstrap_contract: String,
    /// Legacy module search roots, scanned in order.
    pub legacy_roots: Vec<PathBuf>,
    pub legacy_namespace_root: String,
    pub cache_ttl: Duration,
}

impl Default for FinderSettings {
    fn default() -> Self {
        Self {
            reserved_prefix: "model/".to_string(),
            bootstrap_contract: "ConfigProvider".to_string(),
            legacy_roots: Vec::new(),
            legacy_namespace_root: "Model".to_string(),
            cache_ttl: Duration::from_secs(3600),
        }
    }
}

/// Resolves the ordered providers of a contract.
///
/// Results are memoised per contract for the lifetime of the finder and,
/// when a store is configured, kept in the external store across runs.
/// Exclusions are applied on every call to a copy of the memoised list.
pub struct ProvidersFinder {
    settings: FinderSettings,
    registry: Arc<ProviderRegistry>,
    metadata: Arc<dyn MetadataSource>,
    namespaces: Option<Arc<dyn NamespaceSource>>,
    store: Option<Arc<dyn CacheStore>>,
    memo: DashMap<String, Arc<Vec<ProviderRecord>>>,
}

impl std::fmt::Debug for ProvidersFinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvidersFinder")
            .field("settings", &self.settings)
            .field("registry", &self.registry)
            .field("configured_namespaces", &self.namespaces.is_some())
            .field("store", &self.store.is_some())
            .field("memoised", &self.memo.len())
            .finish()
    }
}

impl ProvidersFinder {
    pub fn builder() -> ProvidersFinderBuilder {
        ProvidersFinderBuilder::default()
    }

    pub fn settings(&self) -> &FinderSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Providers of `contract` in dependency order, minus those whose
    /// package is listed in `excluded`.
    pub fn find<S: AsRef<str>>(
        &self,
        contract: &str,
        excluded: &[S],
    ) -> Result<Vec<ProviderRecord>, FinderError> {
        let resolved = self.resolved(contract)?;
        Ok(filter::exclude_packages(&resolved, excluded))
    }

    /// Drop the external store entry for `contract`. Returns the number of
    /// entries removed; `0` without a store.
    ///
    /// The in-process memo is left untouched, see [`Self::clear_memo`].
    pub fn invalidate(&self, contract: &str) -> Result<usize, FinderError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let key = cache_key(contract);
        let removed = store
            .invalidate_tags(&[key.as_str()])
            .map_err(|e| e.for_key(&key))?;
        tracing::info!(contract, key = %key, removed, "Cached providers invalidated");
        Ok(removed)
    }

    pub fn clear_memo(&self) {
        self.memo.clear();
    }

    /// Run the full pipeline for `contract`, bypassing both cache layers.
    pub fn resolve_uncached(&self, contract: &str) -> Result<Vec<ProviderRecord>, FinderError> {
        let sources = if self.is_bootstrap(contract) {
            NamespaceSources::InstalledOnly
        } else {
            NamespaceSources::All
        };
        let prefix = self.settings.reserved_prefix.as_str();

        let namespaces = namespace::enumerate(
            self.metadata.as_ref(),
            self.namespaces.as_deref(),
            prefix,
            sources,
        )
        .map_err(FinderError::NamespaceConfig)?;

        let matched = matcher::match_contract(&self.registry, &namespaces, contract, prefix);
        let sorted = graph::sort_providers(contract, matched)?;
        let legacy = legacy::discover(
            &self.settings.legacy_roots,
            contract,
            &self.settings.legacy_namespace_root,
        );
        Ok(legacy::merge(sorted, legacy))
    }

    fn is_bootstrap(&self, contract: &str) -> bool {
        contract == self.settings.bootstrap_contract
    }

    fn resolved(&self, contract: &str) -> Result<Arc<Vec<ProviderRecord>>, FinderError> {
        if let Some(hit) = self.memo.get(contract) {
            tracing::trace!(contract, "Providers served from memo");
            return Ok(hit.value().clone());
        }

        let records = match &self.store {
            Some(store) if !self.is_bootstrap(contract) => {
                self.resolve_through_store(store.as_ref(), contract)?
            }
            _ => self.resolve_uncached(contract)?,
        };

        let entry = self
            .memo
            .entry(contract.to_string())
            .or_insert_with(|| Arc::new(records));
        Ok(entry.value().clone())
    }

    fn resolve_through_store(
        &self,
        store: &dyn CacheStore,
        contract: &str,
    ) -> Result<Vec<ProviderRecord>, FinderError> {
        let key = cache_key(contract);

        let mut compute = || -> Result<CachedValue, FinderError> {
            let records = self.resolve_uncached(contract)?;
            serde_json::to_value(&records).map_err(|source| FinderError::CacheSerialization {
                key: key.clone(),
                source,
            })
        };
        // The entry is tagged with its own key, which is what `invalidate` drops.
        let value = store.get_or_compute(&key, &[key.as_str()], self.settings.cache_ttl, &mut compute)?;

        serde_json::from_value(value)
            .map_err(|source| FinderError::CacheSerialization { key, source })
    }
}

#[derive(Default)]
pub struct ProvidersFinderBuilder {
    settings: FinderSettings,
    registry: Option<Arc<ProviderRegistry>>,
    metadata: Option<Arc<dyn MetadataSource>>,
    namespaces: Option<Arc<dyn NamespaceSource>>,
    store: Option<Arc<dyn CacheStore>>,
}

impl ProvidersFinderBuilder {
    pub fn settings(mut self, settings: FinderSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Defaults to [`ProviderRegistry::discover_and_build`].
    pub fn registry(mut self, registry: Arc<ProviderRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Defaults to an empty installed-module set.
    pub fn metadata(mut self, metadata: Arc<dyn MetadataSource>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn namespaces(mut self, namespaces: Arc<dyn NamespaceSource>) -> Self {
        self.namespaces = Some(namespaces);
        self
    }

    pub fn store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<ProvidersFinder, FinderError> {
        let registry = match self.registry {
            Some(r) => r,
            None => Arc::new(ProviderRegistry::discover_and_build()?),
        };
        let metadata = self
            .metadata
            .unwrap_or_else(|| Arc::new(StaticMetadata::new()));

        Ok(ProvidersFinder {
            settings: self.settings,
            registry,
            metadata,
            namespaces: self.namespaces,
            store: self.store,
            memo: DashMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStoreError, MemoryCacheStore};
    use crate::contracts::Provider;
    use crate::metadata::InstalledModule;
    use crate::registry::RegistryBuilder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Plain;

    impl Provider for Plain {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    /// Memory store that counts computations.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryCacheStore,
        computed: AtomicUsize,
    }

    impl CacheStore for CountingStore {
        fn get_or_compute(
            &self,
            key: &str,
            tags: &[&str],
            ttl: Duration,
            compute: &mut dyn FnMut() -> Result<CachedValue, FinderError>,
        ) -> Result<CachedValue, FinderError> {
            self.inner.get_or_compute(key, tags, ttl, &mut || {
                self.computed.fetch_add(1, Ordering::SeqCst);
                compute()
            })
        }

        fn register_invalidation(&self, tags: &[&str], key: &str) -> Result<(), CacheStoreError> {
            self.inner.register_invalidation(tags, key)
        }

        fn invalidate_tags(&self, tags: &[&str]) -> Result<usize, CacheStoreError> {
            self.inner.invalidate_tags(tags)
        }
    }

    fn registry() -> Arc<ProviderRegistry> {
        let mut b = RegistryBuilder::default();
        b.register("Alpha", "Routes", "alpha::Routes", Arc::new(Plain));
        b.register("Beta", "Routes", "beta::Routes", Arc::new(Plain));
        b.register("Alpha", "ConfigProvider", "alpha::Config", Arc::new(Plain));
        Arc::new(b.build().unwrap())
    }

    fn metadata() -> Arc<dyn MetadataSource> {
        Arc::new(StaticMetadata::new().with_set(
            "root",
            vec![InstalledModule::new("model/alpha"), InstalledModule::new("model/beta")],
        ))
    }

    #[test]
    fn cache_key_uses_contract_name() {
        assert_eq!(cache_key("Routes"), "providers-finder.Routes");
    }

    #[test]
    fn memo_and_store_are_filled_once() {
        let store = Arc::new(CountingStore::default());
        let finder = ProvidersFinder::builder()
            .registry(registry())
            .metadata(metadata())
            .store(store.clone())
            .build()
            .unwrap();

        let first = finder.find::<&str>("Routes", &[]).unwrap();
        let second = finder.find::<&str>("Routes", &[]).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(store.computed.load(Ordering::SeqCst), 1);

        // A fresh memo still reuses the store entry.
        finder.clear_memo();
        finder.find::<&str>("Routes", &[]).unwrap();
        assert_eq!(store.computed.load(Ordering::SeqCst), 1);

        assert_eq!(finder.invalidate("Routes").unwrap(), 1);
        finder.clear_memo();
        finder.find::<&str>("Routes", &[]).unwrap();
        assert_eq!(store.computed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn bootstrap_contract_bypasses_store() {
        let store = Arc::new(CountingStore::default());
        let finder = ProvidersFinder::builder()
            .registry(registry())
            .metadata(metadata())
            .store(store.clone())
            .build()
            .unwrap();

        let found = finder.find::<&str>("ConfigProvider", &[]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].provider_ref, "alpha::Config");
        assert_eq!(store.computed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn invalidate_without_store_is_a_noop() {
        let finder = ProvidersFinder::builder()
            .registry(registry())
            .build()
            .unwrap();
        assert_eq!(finder.invalidate("Routes").unwrap(), 0);
        assert!(finder.find::<&str>("Routes", &[]).unwrap().is_empty());
    }
}
