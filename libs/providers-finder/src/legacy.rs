//! Legacy modules: directories on a search path, discovered by file convention.
//!
//! A legacy module `<root>/<Name>` provides contract `C` when the file
//! `<root>/<Name>/providers/C.provider` exists.

use std::path::{Path, PathBuf};

use crate::model::ProviderRecord;

/// Directory (relative to a legacy module) holding contract marker files.
pub const LEGACY_PROVIDERS_DIR: &str = "providers";
/// Extension of a legacy contract marker file.
pub const LEGACY_MARKER_EXT: &str = "provider";

/// Immediate subdirectories of `root`, sorted by file name.
fn module_dirs(root: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(root = %root.display(), error = %e, "Legacy module root not readable");
            return Vec::new();
        }
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs
}

/// Scan `roots` in order for legacy modules providing `contract`.
///
/// `namespace_root` prefixes the synthesized provider ref:
/// `<namespace_root>::<Name>::providers::<contract>`.
pub fn discover(roots: &[PathBuf], contract: &str, namespace_root: &str) -> Vec<ProviderRecord> {
    let marker = Path::new(LEGACY_PROVIDERS_DIR).join(format!("{contract}.{LEGACY_MARKER_EXT}"));
    let mut out = Vec::new();

    for root in roots {
        for dir in module_dirs(root) {
            if !dir.join(&marker).is_file() {
                continue;
            }
            let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            tracing::debug!(contract, module = name, root = %root.display(), "Legacy provider matched");
            out.push(ProviderRecord {
                package_id: Some(name.to_string()),
                provider_ref: format!("{namespace_root}::{name}::providers::{contract}"),
                dependencies: Vec::new(),
            });
        }
    }

    out
}

/// Append `legacy` after `sorted`.
///
/// A record whose provider ref is already present replaces it in place, so
/// later search roots override earlier ones for the same module.
pub fn merge(mut sorted: Vec<ProviderRecord>, legacy: Vec<ProviderRecord>) -> Vec<ProviderRecord> {
    for record in legacy {
        match sorted
            .iter_mut()
            .find(|r| r.provider_ref == record.provider_ref)
        {
            Some(existing) => *existing = record,
            None => sorted.push(record),
        }
    }
    sorted
}
