use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A namespace root a provider may live in.
///
/// Rebuilt on every uncached resolution and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDescriptor {
    /// Camel-cased namespace name, e.g. `FooBar` for `model/foo-bar`.
    pub logical_name: String,
    /// Canonical module identifier; `None` for configured, module-less namespaces.
    pub package_id: Option<String>,
    /// Module root used to read its manifest.
    pub install_path: Option<PathBuf>,
}

/// One provider of a contract, as returned by `find`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub package_id: Option<String>,
    pub provider_ref: String,
    /// Deduplicated module identifiers in declaration order.
    pub dependencies: Vec<String>,
}

impl ProviderRecord {
    /// Graph node key: the module identifier, or the provider ref for
    /// namespaces without package identity.
    pub fn key(&self) -> &str {
        self.package_id.as_deref().unwrap_or(&self.provider_ref)
    }
}

/// Push `dep` unless already present, keeping first-seen order.
pub(crate) fn push_unique(deps: &mut Vec<String>, dep: String) {
    if !deps.contains(&dep) {
        deps.push(dep);
    }
}
