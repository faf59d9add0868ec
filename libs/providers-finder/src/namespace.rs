//! Namespace enumeration: installed modules plus configured namespaces.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::metadata::MetadataSource;
use crate::model::NamespaceDescriptor;
use crate::namespaces_config::NamespaceSource;

/// Which namespace origins take part in an enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceSources {
    /// Installed modules and configured namespaces.
    All,
    /// Installed modules only. Used for the configuration-bootstrap contract,
    /// whose resolution must not read configuration.
    InstalledOnly,
}

fn separator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[-_](.)").expect("static regex"))
}

/// `foo-bar_baz` -> `FooBarBaz`.
pub fn camel_case(segment: &str) -> String {
    let joined = separator_re().replace_all(segment, |caps: &Captures<'_>| caps[1].to_uppercase());
    let mut chars = joined.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Build the ordered namespace list for one resolution.
///
/// Installed modules under `reserved_prefix` come first (first-seen identifier
/// wins across metadata sets), followed by configured namespaces when
/// `sources` allows them. Configured entries are never deduplicated against
/// installed ones.
pub fn enumerate(
    metadata: &dyn MetadataSource,
    configured: Option<&dyn NamespaceSource>,
    reserved_prefix: &str,
    sources: NamespaceSources,
) -> anyhow::Result<Vec<NamespaceDescriptor>> {
    let mut out = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for set in metadata.installed_sets() {
        for module in set.modules {
            let Some(rest) = module.name.strip_prefix(reserved_prefix) else {
                continue;
            };
            if !seen.insert(module.name.clone()) {
                tracing::trace!(module = %module.name, origin = %set.origin, "Duplicate installed module skipped");
                continue;
            }
            out.push(NamespaceDescriptor {
                logical_name: camel_case(rest),
                package_id: Some(module.name),
                install_path: module.install_path,
            });
        }
    }

    if sources == NamespaceSources::All {
        if let Some(configured) = configured {
            for ns in configured.namespaces()? {
                out.push(NamespaceDescriptor {
                    logical_name: ns.name,
                    package_id: ns.package,
                    install_path: ns.path,
                });
            }
        }
    }

    Ok(out)
}
