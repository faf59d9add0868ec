//! Module manifest (`module.json`) reading.

use std::path::Path;

use serde::Deserialize;

/// File name of the manifest at a module's install path.
pub const MANIFEST_FILE: &str = "module.json";

#[derive(Debug, Default, Deserialize)]
struct ModuleManifest {
    // preserve_order keeps declaration order
    #[serde(default)]
    require: serde_json::Map<String, serde_json::Value>,
}

/// Required module identifiers under `reserved_prefix`, in declaration order.
///
/// A missing or malformed manifest yields no requirements.
pub fn declared_requirements(install_path: &Path, reserved_prefix: &str) -> Vec<String> {
    let path = install_path.join(MANIFEST_FILE);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::debug!(manifest = %path.display(), error = %e, "No readable module manifest");
            return Vec::new();
        }
    };

    let manifest: ModuleManifest = match serde_json::from_str(&raw) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(manifest = %path.display(), error = %e, "Ignoring malformed module manifest");
            return Vec::new();
        }
    };

    manifest
        .require
        .keys()
        .filter(|name| name.starts_with(reserved_prefix))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn keeps_reserved_requirements_in_order() {
        let tmp = tempdir().unwrap();
        std::fs::write(
            tmp.path().join(MANIFEST_FILE),
            r#"{"name":"model/beta","require":{"model/zeta":"^1","runtime":">=8","model/alpha":"*"}}"#,
        )
        .unwrap();

        assert_eq!(
            declared_requirements(tmp.path(), "model/"),
            vec!["model/zeta".to_string(), "model/alpha".to_string()]
        );
    }

    #[test]
    fn missing_or_malformed_manifest_is_empty() {
        let tmp = tempdir().unwrap();
        assert!(declared_requirements(tmp.path(), "model/").is_empty());

        std::fs::write(tmp.path().join(MANIFEST_FILE), "require: [").unwrap();
        assert!(declared_requirements(tmp.path(), "model/").is_empty());
    }

    #[test]
    fn manifest_without_require_is_empty() {
        let tmp = tempdir().unwrap();
        std::fs::write(tmp.path().join(MANIFEST_FILE), r#"{"name":"model/core"}"#).unwrap();
        assert!(declared_requirements(tmp.path(), "model/").is_empty());
    }
}
