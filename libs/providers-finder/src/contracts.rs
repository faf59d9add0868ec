use std::any::Any;

/// Base capability shared by every provider implementation.
///
/// A provider is the concrete implementation of a contract supplied by one
/// module. The finder never calls into providers beyond asking for their
/// extra dependencies; instantiating and running them is up to the caller.
pub trait Provider: Send + Sync + 'static {
    /// Module identifiers this provider depends on in addition to the
    /// requirements declared in its module manifest.
    ///
    /// Used for logical dependencies the manifest cannot express, such as an
    /// optional integration. Entries already declared in the manifest are ignored.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    fn as_any(&self) -> &dyn Any;
}

/// One versioned configuration migration.
///
/// `apply` receives the current configuration (`None` when nothing has been
/// stored yet) and returns the configuration to persist.
pub struct ConfigMigration {
    pub version: &'static str,
    pub apply: fn(Option<serde_yaml::Value>) -> serde_yaml::Value,
}

impl std::fmt::Debug for ConfigMigration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigMigration")
            .field("version", &self.version)
            .finish()
    }
}

/// The configuration-bootstrap contract.
///
/// Modules implement it to declare the migrations that shape their stored
/// configuration. Resolving this contract must never read configuration.
pub trait ConfigProvider: Provider {
    fn migrations(&self) -> Vec<ConfigMigration>;
}
