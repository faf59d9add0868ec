//! # Providers Finder - Provider Discovery and Dependency Ordering
//!
//! Given a contract name, finds every installed module that provides an
//! implementation of it and returns those providers ordered so that no
//! provider comes before a module it depends on.
//!
//! ## Features
//!
//! - **Declarative**: Use `#[provider(...)]` to register an implementation for a namespace
//! - **Auto-discovery**: Providers are collected at link time via inventory
//! - **Deterministic**: Stable topological order, cycles are rejected with their path
//! - **Cached**: Per-process memo plus pluggable external stores with tag invalidation
//!
//! ## Registering a provider
//!
//! ```rust,ignore
//! use providers_finder::{provider, Provider};
//!
//! #[derive(Default)]
//! #[provider(namespace = "Billing", contract = "Routes")]
//! pub struct BillingRoutes;
//!
//! impl Provider for BillingRoutes {
//!     fn dependencies(&self) -> Vec<String> {
//!         vec!["model/payments".into()]
//!     }
//!
//!     fn as_any(&self) -> &dyn std::any::Any {
//!         self
//!     }
//! }
//! ```
//!
//! ## Resolving a contract
//!
//! ```rust,ignore
//! let finder = ProvidersFinder::builder()
//!     .metadata(Arc::new(InstalledJsonFiles::new(files)))
//!     .store(Arc::new(FileCacheStore::new(cache_dir)?))
//!     .build()?;
//!
//! for p in finder.find("Routes", &["model/legacy-billing"])? {
//!     println!("{} {}", p.key(), p.provider_ref);
//! }
//! ```

// Lets `#[provider]` expansions inside this crate use `::providers_finder` paths.
extern crate self as providers_finder;

// Re-export inventory for user convenience
pub use inventory;

pub use providers_finder_macros::provider;

pub mod contracts;
pub use contracts::{ConfigMigration, ConfigProvider, Provider};

pub mod error;
pub use error::FinderError;

pub mod model;
pub use model::{NamespaceDescriptor, ProviderRecord};

pub mod registry;
pub use registry::{ProviderEntry, ProviderRegistry, Registrator, RegistryBuilder, RegistryError};

pub mod metadata;
pub use metadata::{InstalledJsonFiles, InstalledModule, InstalledSet, MetadataSource, StaticMetadata};

pub mod namespaces_config;
pub use namespaces_config::{
    ConfiguredNamespace, NamespaceConfigFile, NamespaceSource, NamespacesConfigProvider,
};

pub mod cache;
pub use cache::{CacheStore, CacheStoreError, FileCacheStore, MemoryCacheStore};

pub mod filter;
pub mod finder;
pub mod graph;
pub mod legacy;
pub mod manifest;
pub mod matcher;
pub mod namespace;

pub use finder::{cache_key, FinderSettings, ProvidersFinder, ProvidersFinderBuilder};
pub use namespace::NamespaceSources;
