use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use providers_finder::FinderSettings;

use crate::paths::home_dir::{resolve_home_dir, resolve_under, DEFAULT_SUBDIR};

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Resolution settings.
    pub finder: FinderConfig,
    /// External cache store (optional, file store under the home dir if None).
    pub cache: Option<CacheConfig>,
    /// Logging configuration (optional, uses defaults if None).
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FinderConfig {
    pub home_dir: String, // will be normalized to absolute path
    /// Installed modules outside this prefix are ignored.
    pub reserved_prefix: String,
    /// Contract resolved without configured namespaces or external cache.
    pub bootstrap_contract: String,
    /// Installed-module metadata files, merged in order (first seen wins).
    pub metadata_files: Vec<String>,
    /// Legacy module search directories, scanned in order.
    pub legacy_roots: Vec<String>,
    pub legacy_namespace_root: String,
    /// Configured namespace store, relative to `home_dir` unless absolute.
    pub namespaces_file: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    File,
    None,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// Store directory for the file backend, relative to `home_dir` unless absolute.
    pub dir: String,
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

/// Logging configuration - maps subsystem names to their logging settings.
/// Key "default" is the catch-all for logs that don't match explicit subsystems.
pub type LoggingConfig = HashMap<String, Section>;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Section {
    pub console_level: String, // "info", "debug", "error", "off"
    #[serde(default)]
    pub file: String, // "logs/providers-finder.log"
    #[serde(default)]
    pub file_level: String,
    #[serde(default)]
    pub max_age_days: Option<u32>,
    #[serde(default)]
    pub max_backups: Option<usize>, // How many files to keep
    #[serde(default)]
    pub max_size_mb: Option<u64>, // Max size of the file in MB
}

impl Default for FinderConfig {
    fn default() -> Self {
        let settings = FinderSettings::default();
        Self {
            // Empty => platform default resolved by resolve_home_dir()
            home_dir: String::new(),
            reserved_prefix: settings.reserved_prefix,
            bootstrap_contract: settings.bootstrap_contract,
            metadata_files: Vec::new(),
            legacy_roots: Vec::new(),
            legacy_namespace_root: settings.legacy_namespace_root,
            namespaces_file: "namespaces.yaml".to_string(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::File,
            dir: "cache".to_string(),
            ttl: FinderSettings::default().cache_ttl,
        }
    }
}

/// Create a default logging configuration.
pub fn default_logging_config() -> LoggingConfig {
    let mut logging = HashMap::new();
    logging.insert(
        "default".to_string(),
        Section {
            console_level: "warn".to_string(),
            file: "logs/providers-finder.log".to_string(),
            file_level: "debug".to_string(),
            max_age_days: Some(7),
            max_backups: Some(3),
            max_size_mb: Some(100),
        },
    );
    logging
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            finder: FinderConfig::default(),
            cache: Some(CacheConfig::default()),
            logging: Some(default_logging_config()),
        }
    }
}

impl AppConfig {
    /// Load configuration with layered loading: defaults → YAML file → environment variables.
    /// Also normalizes `finder.home_dir` into an absolute path and creates the directory.
    pub fn load_layered<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        use figment::{
            providers::{Env, Format, Serialized, Yaml},
            Figment,
        };

        // Optional sections stay None unless YAML/ENV provide them.
        let base = AppConfig {
            finder: FinderConfig::default(),
            cache: None,
            logging: None,
        };

        let figment = Figment::new()
            .merge(Serialized::defaults(base))
            .merge(Yaml::file(config_path.as_ref()))
            // Example: PF__FINDER__RESERVED_PREFIX=model/ maps to finder.reserved_prefix
            .merge(Env::prefixed("PF__").split("__"));

        let mut config: AppConfig = figment
            .extract()
            .with_context(|| "Failed to extract config from figment".to_string())?;

        normalize_home_dir_inplace(&mut config.finder)
            .context("Failed to resolve finder.home_dir")?;

        Ok(config)
    }

    /// Load configuration from file or use default values.
    /// Also normalizes `finder.home_dir` into an absolute path and creates the directory.
    pub fn load_or_default<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_layered(path),
            None => {
                let mut c = Self::default();
                normalize_home_dir_inplace(&mut c.finder)
                    .context("Failed to resolve finder.home_dir (defaults)")?;
                Ok(c)
            }
        }
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    /// Apply overrides from command line arguments.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        // Set logging level based on verbose flags for "default" section.
        let logging = self.logging.get_or_insert_with(default_logging_config);
        if let Some(default_section) = logging.get_mut("default") {
            default_section.console_level = match args.verbose {
                0 => default_section.console_level.clone(), // keep
                1 => "debug".to_string(),
                _ => "trace".to_string(),
            };
        }
    }

    pub fn home_dir(&self) -> PathBuf {
        PathBuf::from(&self.finder.home_dir)
    }

    /// Cache section in effect (defaults when absent).
    pub fn cache_config(&self) -> CacheConfig {
        self.cache.clone().unwrap_or_default()
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let dir = self.cache_config().dir;
        resolve_under(&self.home_dir(), &dir).with_context(|| format!("Invalid cache.dir '{dir}'"))
    }

    pub fn namespaces_path(&self) -> Result<PathBuf> {
        let file = &self.finder.namespaces_file;
        resolve_under(&self.home_dir(), file)
            .with_context(|| format!("Invalid finder.namespaces_file '{file}'"))
    }

    pub fn metadata_paths(&self) -> Result<Vec<PathBuf>> {
        self.resolve_all(&self.finder.metadata_files, "finder.metadata_files")
    }

    /// Runtime settings for the finder, with paths resolved under `home_dir`.
    pub fn finder_settings(&self) -> Result<FinderSettings> {
        Ok(FinderSettings {
            reserved_prefix: self.finder.reserved_prefix.clone(),
            bootstrap_contract: self.finder.bootstrap_contract.clone(),
            legacy_roots: self.resolve_all(&self.finder.legacy_roots, "finder.legacy_roots")?,
            legacy_namespace_root: self.finder.legacy_namespace_root.clone(),
            cache_ttl: self.cache_config().ttl,
        })
    }

    fn resolve_all(&self, raw: &[String], field: &str) -> Result<Vec<PathBuf>> {
        let home = self.home_dir();
        raw.iter()
            .map(|p| resolve_under(&home, p).with_context(|| format!("Invalid {field} entry '{p}'")))
            .collect()
    }
}

/// Command line arguments structure.
#[derive(Debug, Clone)]
pub struct CliArgs {
    pub config: Option<String>,
    pub print_config: bool,
    pub verbose: u8,
}

/// Normalize `finder.home_dir` using `resolve_home_dir` and store the absolute path back.
fn normalize_home_dir_inplace(finder: &mut FinderConfig) -> Result<()> {
    // Treat empty string as "not provided" => None.
    let opt = if finder.home_dir.trim().is_empty() {
        None
    } else {
        Some(finder.home_dir.clone())
    };

    let resolved: PathBuf = resolve_home_dir(opt, DEFAULT_SUBDIR, /*create*/ true)
        .context("home_dir normalization failed")?;

    finder.home_dir = resolved.to_string_lossy().to_string();
    Ok(())
}
