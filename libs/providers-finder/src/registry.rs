use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::contracts::Provider;

/// A provider implementation registered for one `(namespace, contract)` pair.
#[derive(Clone)]
pub struct ProviderEntry {
    pub namespace: &'static str,
    pub contract: &'static str,
    /// Fully-qualified path of the implementing type.
    pub provider_ref: &'static str,
    pub provider: Arc<dyn Provider>,
}

impl std::fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("namespace", &self.namespace)
            .field("contract", &self.contract)
            .field("provider_ref", &self.provider_ref)
            .finish()
    }
}

/// The function type submitted by `#[provider]` via `inventory::submit!`.
/// It fills a *builder*, not the final registry.
pub struct Registrator(pub fn(&mut RegistryBuilder));

inventory::collect!(Registrator);

/// Lookup table from namespace and contract name to the registered implementation.
pub struct ProviderRegistry {
    // namespace -> contract -> entry
    by_namespace: HashMap<&'static str, HashMap<&'static str, ProviderEntry>>,
    by_ref: HashMap<&'static str, Arc<dyn Provider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut refs: Vec<&'static str> = self.by_ref.keys().copied().collect();
        refs.sort_unstable();
        f.debug_struct("ProviderRegistry")
            .field("namespaces", &self.by_namespace.len())
            .field("providers", &refs)
            .finish()
    }
}

impl ProviderRegistry {
    /// Discover via inventory, have registrators fill the builder, then build.
    pub fn discover_and_build() -> Result<Self, RegistryError> {
        let mut b = RegistryBuilder::default();
        for r in ::inventory::iter::<Registrator> {
            r.0(&mut b);
        }
        b.build()
    }

    /// Does `namespace` provide an implementation of `contract`?
    pub fn lookup(&self, namespace: &str, contract: &str) -> Option<&ProviderEntry> {
        self.by_namespace
            .get(namespace)
            .and_then(|contracts| contracts.get(contract))
    }

    /// The provider instance behind a resolved `provider_ref`.
    pub fn provider(&self, provider_ref: &str) -> Option<Arc<dyn Provider>> {
        self.by_ref.get(provider_ref).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_ref.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ref.is_empty()
    }
}

/// Builder that provider registrators feed.
/// Keys are `(namespace, contract)`; uniqueness enforced at build time.
#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<ProviderEntry>,
    errors: Vec<String>,
}

impl RegistryBuilder {
    pub fn register(
        &mut self,
        namespace: &'static str,
        contract: &'static str,
        provider_ref: &'static str,
        provider: Arc<dyn Provider>,
    ) {
        if let Some(existing) = self
            .entries
            .iter()
            .find(|e| e.namespace == namespace && e.contract == contract)
        {
            self.errors.push(format!(
                "Namespace '{namespace}' registers contract '{contract}' twice: '{}' and '{provider_ref}'",
                existing.provider_ref
            ));
            return;
        }
        if self.entries.iter().any(|e| e.provider_ref == provider_ref) {
            self.errors
                .push(format!("Provider '{provider_ref}' is already registered"));
            return;
        }
        self.entries.push(ProviderEntry {
            namespace,
            contract,
            provider_ref,
            provider,
        });
    }

    pub fn build(self) -> Result<ProviderRegistry, RegistryError> {
        if !self.errors.is_empty() {
            return Err(RegistryError::InvalidRegistryConfiguration {
                errors: self.errors,
            });
        }

        let mut by_namespace: HashMap<&'static str, HashMap<&'static str, ProviderEntry>> =
            HashMap::new();
        let mut by_ref = HashMap::with_capacity(self.entries.len());
        for entry in self.entries {
            by_ref.insert(entry.provider_ref, entry.provider.clone());
            by_namespace
                .entry(entry.namespace)
                .or_default()
                .insert(entry.contract, entry);
        }

        tracing::debug!(providers = by_ref.len(), "Provider registry built");

        Ok(ProviderRegistry {
            by_namespace,
            by_ref,
        })
    }
}

/// Structured errors for the provider registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid provider registry configuration:\n{errors:#?}")]
    InvalidRegistryConfiguration { errors: Vec<String> },
}
