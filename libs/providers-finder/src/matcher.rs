//! Contract matching: which namespaces provide a contract, and what they depend on.

use crate::manifest;
use crate::model::{push_unique, NamespaceDescriptor, ProviderRecord};
use crate::registry::ProviderRegistry;

/// Build a [`ProviderRecord`] for every namespace that registers `contract`,
/// in namespace order.
///
/// Dependencies are the reserved-prefix requirements of the module manifest
/// followed by the provider's own declared dependencies, deduplicated.
///
/// A provider is emitted once. When a configured namespace shares its logical
/// name with an installed module, both resolve to the same registered provider
/// and the earlier namespace (the installed one) supplies the record.
pub fn match_contract(
    registry: &ProviderRegistry,
    namespaces: &[NamespaceDescriptor],
    contract: &str,
    reserved_prefix: &str,
) -> Vec<ProviderRecord> {
    let mut out: Vec<ProviderRecord> = Vec::new();

    for ns in namespaces {
        let Some(entry) = registry.lookup(&ns.logical_name, contract) else {
            continue;
        };
        if let Some(kept) = out.iter().find(|r| r.provider_ref == entry.provider_ref) {
            tracing::debug!(
                contract,
                namespace = %ns.logical_name,
                provider = entry.provider_ref,
                kept_package = ?kept.package_id,
                skipped_package = ?ns.package_id,
                "Namespace resolves to an already matched provider; keeping the first"
            );
            continue;
        }

        let mut dependencies = Vec::new();
        if let Some(path) = &ns.install_path {
            for dep in manifest::declared_requirements(path, reserved_prefix) {
                push_unique(&mut dependencies, dep);
            }
        }
        for dep in entry.provider.dependencies() {
            push_unique(&mut dependencies, dep);
        }

        tracing::debug!(
            contract,
            namespace = %ns.logical_name,
            provider = entry.provider_ref,
            deps = ?dependencies,
            "Provider matched"
        );

        out.push(ProviderRecord {
            package_id: ns.package_id.clone(),
            provider_ref: entry.provider_ref.to_string(),
            dependencies,
        });
    }

    out
}
