//! Configured namespaces: module-less namespace roots declared in configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::contracts::{ConfigMigration, ConfigProvider, Provider};
use crate::provider;

/// A namespace declared in configuration rather than installed as a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfiguredNamespace {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Source of configured namespaces.
pub trait NamespaceSource: Send + Sync {
    fn namespaces(&self) -> Result<Vec<ConfiguredNamespace>>;
}

impl NamespaceSource for Vec<ConfiguredNamespace> {
    fn namespaces(&self) -> Result<Vec<ConfiguredNamespace>> {
        Ok(self.clone())
    }
}

#[derive(Debug, Default, Deserialize)]
struct NamespacesSection {
    #[serde(default)]
    namespaces: Vec<ConfiguredNamespace>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredConfig {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    config: Option<serde_yaml::Value>,
}

/// First-use migration: start with an empty namespace list unless
/// configuration already exists.
fn init_namespaces(current: Option<serde_yaml::Value>) -> serde_yaml::Value {
    match current {
        Some(existing) if !existing.is_null() => existing,
        _ => {
            let mut map = serde_yaml::Mapping::new();
            map.insert(
                serde_yaml::Value::from("namespaces"),
                serde_yaml::Value::Sequence(Vec::new()),
            );
            serde_yaml::Value::Mapping(map)
        }
    }
}

/// The finder's own configuration provider.
#[derive(Default)]
#[provider(namespace = "ProvidersFinder", contract = "ConfigProvider")]
pub struct NamespacesConfigProvider;

impl Provider for NamespacesConfigProvider {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl ConfigProvider for NamespacesConfigProvider {
    fn migrations(&self) -> Vec<ConfigMigration> {
        vec![ConfigMigration {
            version: "0.3.0",
            apply: init_namespaces,
        }]
    }
}

/// YAML-backed namespace store with versioned migrations.
///
/// The file holds `{version, config: {namespaces: [...]}}`. Pending
/// migrations run on first read and their result is written back, so each
/// runs once per file. Relative namespace paths resolve against the file's
/// directory.
#[derive(Debug)]
pub struct NamespaceConfigFile {
    path: PathBuf,
    migrations: Vec<ConfigMigration>,
}

impl NamespaceConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_migrations(path, NamespacesConfigProvider.migrations())
    }

    pub fn with_migrations(path: impl Into<PathBuf>, mut migrations: Vec<ConfigMigration>) -> Self {
        migrations.sort_by_key(|m| semver::Version::parse(m.version).ok());
        Self {
            path: path.into(),
            migrations,
        }
    }

    fn load_stored(&self) -> Result<StoredConfig> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(StoredConfig::default()),
            Ok(raw) => serde_yaml::from_str(&raw)
                .with_context(|| format!("Malformed namespace configuration {:?}", self.path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoredConfig::default()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read namespace configuration {:?}", self.path))
            }
        }
    }

    fn migrate(&self, stored: &mut StoredConfig) -> Result<bool> {
        let current = stored
            .version
            .as_deref()
            .map(semver::Version::parse)
            .transpose()
            .context("Invalid stored configuration version")?;

        let mut applied = false;
        for m in &self.migrations {
            let version = semver::Version::parse(m.version)
                .with_context(|| format!("Invalid migration version '{}'", m.version))?;
            if current.as_ref().is_some_and(|c| *c >= version) {
                continue;
            }
            tracing::info!(file = ?self.path, version = m.version, "Applying namespace configuration migration");
            stored.config = Some((m.apply)(stored.config.take()));
            stored.version = Some(m.version.to_string());
            applied = true;
        }
        Ok(applied)
    }

    fn persist(&self, stored: &StoredConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {parent:?}"))?;
        }
        let yaml = serde_yaml::to_string(stored).context("Failed to serialize namespace configuration")?;
        std::fs::write(&self.path, yaml)
            .with_context(|| format!("Failed to write namespace configuration {:?}", self.path))
    }
}

impl NamespaceSource for NamespaceConfigFile {
    fn namespaces(&self) -> Result<Vec<ConfiguredNamespace>> {
        let mut stored = self.load_stored()?;
        if self.migrate(&mut stored)? {
            self.persist(&stored)?;
        }

        let section: NamespacesSection = match stored.config {
            Some(value) if !value.is_null() => serde_yaml::from_value(value)
                .with_context(|| format!("Invalid namespaces in {:?}", self.path))?,
            _ => NamespacesSection::default(),
        };

        let base = self.path.parent().unwrap_or_else(|| Path::new("."));
        Ok(section
            .namespaces
            .into_iter()
            .map(|mut ns| {
                if let Some(p) = ns.path.take() {
                    ns.path = Some(if p.is_absolute() { p } else { base.join(p) });
                }
                ns
            })
            .collect())
    }
}
