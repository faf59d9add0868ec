use thiserror::Error;

use crate::registry::RegistryError;

/// Errors surfaced by provider resolution.
///
/// Everything not listed here (unreadable manifests, missing metadata files,
/// namespaces without the contract) is absorbed with an empty contribution.
#[derive(Debug, Error)]
pub enum FinderError {
    #[error("cyclic dependency detected while resolving '{contract}': {}", path.join(" -> "))]
    CyclicDependency { contract: String, path: Vec<String> },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("cache store failure for key '{key}'")]
    CacheStore {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to encode or decode cached providers for key '{key}'")]
    CacheSerialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("configured namespaces unavailable")]
    NamespaceConfig(#[source] anyhow::Error),
}
