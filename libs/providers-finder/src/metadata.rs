//! Installed-module metadata sources.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// A module reported as installed by a metadata source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledModule {
    pub name: String,
    pub install_path: Option<PathBuf>,
}

impl InstalledModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            install_path: None,
        }
    }

    pub fn with_install_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.install_path = Some(path.into());
        self
    }
}

/// Modules reported by one metadata origin (e.g. one nested install tree).
#[derive(Debug, Clone, Default)]
pub struct InstalledSet {
    pub origin: String,
    pub modules: Vec<InstalledModule>,
}

/// Enumerates installed modules, grouped by origin.
///
/// Sources never fail: an unreadable origin contributes nothing.
pub trait MetadataSource: Send + Sync {
    fn installed_sets(&self) -> Vec<InstalledSet>;
}

/// Metadata held in memory, for embedding applications and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadata {
    sets: Vec<InstalledSet>,
}

impl StaticMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_set(mut self, origin: impl Into<String>, modules: Vec<InstalledModule>) -> Self {
        self.sets.push(InstalledSet {
            origin: origin.into(),
            modules,
        });
        self
    }
}

impl MetadataSource for StaticMetadata {
    fn installed_sets(&self) -> Vec<InstalledSet> {
        self.sets.clone()
    }
}

#[derive(Debug, Deserialize)]
struct InstalledFile {
    #[serde(default)]
    packages: Vec<InstalledPackage>,
}

#[derive(Debug, Deserialize)]
struct InstalledPackage {
    name: String,
    #[serde(default)]
    install_path: Option<PathBuf>,
}

/// Reads `installed.json`-style files:
///
/// ```json
/// { "packages": [ { "name": "model/core", "install_path": "../model/core" } ] }
/// ```
///
/// Relative install paths are resolved against the directory holding the file.
#[derive(Debug, Clone, Default)]
pub struct InstalledJsonFiles {
    files: Vec<PathBuf>,
}

impl InstalledJsonFiles {
    pub fn new(files: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            files: files.into_iter().collect(),
        }
    }

    fn read_set(path: &Path) -> Option<InstalledSet> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Skipping unreadable module metadata");
                return None;
            }
        };
        let parsed: InstalledFile = match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Skipping malformed module metadata");
                return None;
            }
        };

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let modules = parsed
            .packages
            .into_iter()
            .map(|p| InstalledModule {
                name: p.name,
                install_path: p.install_path.map(|ip| {
                    if ip.is_absolute() {
                        ip
                    } else {
                        base.join(ip)
                    }
                }),
            })
            .collect();

        Some(InstalledSet {
            origin: path.display().to_string(),
            modules,
        })
    }
}

impl MetadataSource for InstalledJsonFiles {
    fn installed_sets(&self) -> Vec<InstalledSet> {
        self.files
            .iter()
            .filter_map(|f| Self::read_set(f))
            .collect()
    }
}
