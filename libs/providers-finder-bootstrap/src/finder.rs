use std::sync::Arc;

use anyhow::{Context, Result};
use providers_finder::{
    CacheStore, FileCacheStore, InstalledJsonFiles, MemoryCacheStore, NamespaceConfigFile,
    ProviderRegistry, ProvidersFinder,
};

use crate::config::{AppConfig, CacheBackend};

/// Build the external store selected by `cache.backend`.
pub fn cache_store_from_config(config: &AppConfig) -> Result<Option<Arc<dyn CacheStore>>> {
    let store: Option<Arc<dyn CacheStore>> = match config.cache_config().backend {
        CacheBackend::None => None,
        CacheBackend::Memory => Some(Arc::new(MemoryCacheStore::new())),
        CacheBackend::File => {
            let dir = config.cache_dir()?;
            let store = FileCacheStore::new(&dir)
                .with_context(|| format!("Failed to open cache directory {dir:?}"))?;
            Some(Arc::new(store))
        }
    };
    Ok(store)
}

/// Wire a [`ProvidersFinder`] from the application configuration, using the
/// providers linked into the current binary.
pub fn build_finder(config: &AppConfig) -> Result<ProvidersFinder> {
    let registry = ProviderRegistry::discover_and_build().context("Provider registry is invalid")?;
    build_finder_with_registry(config, Arc::new(registry))
}

pub fn build_finder_with_registry(
    config: &AppConfig,
    registry: Arc<ProviderRegistry>,
) -> Result<ProvidersFinder> {
    let metadata = InstalledJsonFiles::new(config.metadata_paths()?);
    let namespaces = NamespaceConfigFile::new(config.namespaces_path()?);

    let mut builder = ProvidersFinder::builder()
        .settings(config.finder_settings()?)
        .registry(registry)
        .metadata(Arc::new(metadata))
        .namespaces(Arc::new(namespaces));
    if let Some(store) = cache_store_from_config(config)? {
        builder = builder.store(store);
    }

    let finder = builder.build()?;
    tracing::debug!(?finder, "Providers finder ready");
    Ok(finder)
}
