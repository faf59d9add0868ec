//! End-to-end resolution against on-disk fixtures.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use providers_finder::{
    provider, ConfiguredNamespace, FileCacheStore, FinderError, FinderSettings,
    InstalledJsonFiles, InstalledSet, MetadataSource, NamespaceConfigFile, NamespaceSource,
    Provider, ProviderRecord, ProvidersFinder,
};
use tempfile::TempDir;

// ---------- Test providers (must be at module scope for `inventory`) ----------

#[derive(Default)]
#[provider(namespace = "Alpha", contract = "X")]
struct AlphaX;

impl Provider for AlphaX {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[derive(Default)]
#[provider(namespace = "Beta", contract = "X")]
struct BetaX;

impl Provider for BetaX {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[derive(Default)]
#[provider(namespace = "Extra", contract = "X")]
struct ExtraX;

impl Provider for ExtraX {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[derive(Default)]
#[provider(namespace = "Alpha", contract = "ConfigProvider")]
struct AlphaConfig;

impl Provider for AlphaConfig {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[derive(Default)]
#[provider(namespace = "Extra", contract = "ConfigProvider")]
struct ExtraConfig;

impl Provider for ExtraConfig {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[derive(Default)]
#[provider(namespace = "CycA", contract = "Cyclic")]
struct CycAProvider;

impl Provider for CycAProvider {
    fn dependencies(&self) -> Vec<String> {
        vec!["model/cyc-b".to_string()]
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[derive(Default)]
#[provider(namespace = "CycB", contract = "Cyclic")]
struct CycBProvider;

impl Provider for CycBProvider {
    fn dependencies(&self) -> Vec<String> {
        vec!["model/cyc-a".to_string()]
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

// ---------- Fixtures ----------

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    /// `beta` requires `alpha` through its manifest and is listed first.
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        write(
            &root.join("vendor/installed.json"),
            r#"{"packages":[
                {"name":"model/beta","install_path":"beta"},
                {"name":"model/alpha","install_path":"alpha"},
                {"name":"model/cyc-a"},
                {"name":"model/cyc-b"},
                {"name":"vendor/unrelated","install_path":"unrelated"}
            ]}"#,
        );
        write(
            &root.join("vendor/beta/module.json"),
            r#"{"require":{"vendor/runtime":"^1.0","model/alpha":"*"}}"#,
        );
        write(&root.join("vendor/alpha/module.json"), r#"{"require":{}}"#);

        write(&root.join("legacy1/Foo/providers/Legacy.provider"), "");
        write(&root.join("legacy1/Bar/providers/Legacy.provider"), "");
        write(&root.join("legacy1/Qux/providers/Other.provider"), "");
        write(&root.join("legacy2/Baz/providers/Legacy.provider"), "");

        Self { dir }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn metadata(&self) -> Arc<InstalledJsonFiles> {
        Arc::new(InstalledJsonFiles::new([self.root().join("vendor/installed.json")]))
    }

    fn settings(&self) -> FinderSettings {
        FinderSettings {
            legacy_roots: vec![self.root().join("legacy1"), self.root().join("legacy2")],
            ..FinderSettings::default()
        }
    }

    fn finder(&self) -> ProvidersFinder {
        ProvidersFinder::builder()
            .settings(self.settings())
            .metadata(self.metadata())
            .build()
            .unwrap()
    }
}

fn write(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn keys(records: &[ProviderRecord]) -> Vec<&str> {
    records.iter().map(|r| r.key()).collect()
}

const NONE: &[&str] = &[];

/// Configured namespaces that count how often they are read.
struct CountingNamespaces {
    reads: AtomicUsize,
    items: Vec<ConfiguredNamespace>,
}

impl NamespaceSource for CountingNamespaces {
    fn namespaces(&self) -> anyhow::Result<Vec<ConfiguredNamespace>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.items.clone())
    }
}

/// Installed-module metadata that counts how often it is read.
struct CountingMetadata {
    reads: AtomicUsize,
    inner: Arc<InstalledJsonFiles>,
}

impl MetadataSource for CountingMetadata {
    fn installed_sets(&self) -> Vec<InstalledSet> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.installed_sets()
    }
}

fn extra_namespace() -> ConfiguredNamespace {
    ConfiguredNamespace {
        name: "Extra".into(),
        package: None,
        path: None,
    }
}

// ---------- Tests ----------

#[test]
fn dependency_precedes_dependent_and_exclusion_is_a_view() {
    let fx = Fixture::new();
    let finder = fx.finder();

    let full = finder.find("X", NONE).unwrap();
    assert_eq!(keys(&full), vec!["model/alpha", "model/beta"]);
    assert_eq!(full[0].provider_ref, "finder_tests::AlphaX");
    assert_eq!(full[1].dependencies, vec!["model/alpha".to_string()]);

    let without_alpha = finder.find("X", &["model/alpha"]).unwrap();
    assert_eq!(keys(&without_alpha), vec!["model/beta"]);

    // The memoised list was not narrowed by the exclusion.
    assert_eq!(finder.find("X", NONE).unwrap(), full);
}

#[test]
fn memo_serves_repeat_calls_without_a_store() {
    let fx = Fixture::new();
    let metadata = Arc::new(CountingMetadata {
        reads: AtomicUsize::new(0),
        inner: fx.metadata(),
    });
    let finder = ProvidersFinder::builder()
        .settings(fx.settings())
        .metadata(metadata.clone())
        .build()
        .unwrap();

    let full = finder.find("X", NONE).unwrap();
    let narrowed = finder.find("X", &["model/alpha"]).unwrap();
    assert_eq!(keys(&narrowed), vec!["model/beta"]);
    assert_eq!(finder.find("X", NONE).unwrap(), full);
    assert_eq!(metadata.reads.load(Ordering::SeqCst), 1);

    finder.clear_memo();
    assert_eq!(finder.find("X", NONE).unwrap(), full);
    assert_eq!(metadata.reads.load(Ordering::SeqCst), 2);
}

#[test]
fn resolution_is_deterministic() {
    let fx = Fixture::new();

    let first = fx.finder().find("X", NONE).unwrap();
    let second = fx.finder().find("X", NONE).unwrap();
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );

    let legacy_first = fx.finder().find("Legacy", NONE).unwrap();
    let legacy_second = fx.finder().find("Legacy", NONE).unwrap();
    assert_eq!(legacy_first, legacy_second);
}

#[test]
fn every_dependency_in_the_result_comes_first() {
    let fx = Fixture::new();
    let finder = ProvidersFinder::builder()
        .settings(fx.settings())
        .metadata(fx.metadata())
        .namespaces(Arc::new(vec![extra_namespace()]))
        .build()
        .unwrap();

    let result = finder.find("X", NONE).unwrap();
    for (i, p) in result.iter().enumerate() {
        for dep in &p.dependencies {
            if let Some(j) = result.iter().position(|d| d.key() == dep) {
                assert!(j < i, "{dep} must precede {}", p.key());
            }
        }
    }
}

#[test]
fn cycle_fails_without_partial_result() {
    let fx = Fixture::new();
    let err = fx.finder().find("Cyclic", NONE).unwrap_err();
    match err {
        FinderError::CyclicDependency { contract, path } => {
            assert_eq!(contract, "Cyclic");
            assert!(path.contains(&"model/cyc-a".to_string()));
            assert!(path.contains(&"model/cyc-b".to_string()));
            assert_eq!(path.first(), path.last());
        }
        other => panic!("expected CyclicDependency, got: {other:?}"),
    }
}

#[test]
fn bootstrap_contract_never_reads_configured_namespaces() {
    let fx = Fixture::new();
    let namespaces = Arc::new(CountingNamespaces {
        reads: AtomicUsize::new(0),
        items: vec![extra_namespace()],
    });
    let finder = ProvidersFinder::builder()
        .settings(fx.settings())
        .metadata(fx.metadata())
        .namespaces(namespaces.clone())
        .build()
        .unwrap();

    let config = finder.find("ConfigProvider", NONE).unwrap();
    assert_eq!(keys(&config), vec!["model/alpha"]);
    assert_eq!(namespaces.reads.load(Ordering::SeqCst), 0);

    // Other contracts see the configured namespace, keyed by its provider ref.
    let x = finder.find("X", NONE).unwrap();
    assert_eq!(
        keys(&x),
        vec!["model/alpha", "model/beta", "finder_tests::ExtraX"]
    );
    assert_eq!(x[2].package_id, None);
    assert_eq!(namespaces.reads.load(Ordering::SeqCst), 1);
}

#[test]
fn legacy_providers_follow_in_scan_order() {
    let fx = Fixture::new();
    let result = fx.finder().find("Legacy", NONE).unwrap();

    assert_eq!(keys(&result), vec!["Bar", "Foo", "Baz"]);
    assert_eq!(result[0].provider_ref, "Model::Bar::providers::Legacy");
    assert!(result.iter().all(|r| r.dependencies.is_empty()));
}

#[test]
fn legacy_providers_are_appended_after_sorted_ones() {
    let fx = Fixture::new();
    write(&fx.root().join("legacy2/Zed/providers/X.provider"), "");

    let result = fx.finder().find("X", NONE).unwrap();
    assert_eq!(keys(&result), vec!["model/alpha", "model/beta", "Zed"]);
}

#[test]
fn unknown_contract_resolves_to_empty() {
    let fx = Fixture::new();
    assert!(fx.finder().find("Nothing", NONE).unwrap().is_empty());
}

#[test]
fn file_store_serves_later_runs_until_invalidated() {
    let fx = Fixture::new();
    let cache_dir = fx.root().join("cache");
    let finder_for_run = || {
        ProvidersFinder::builder()
            .settings(fx.settings())
            .metadata(fx.metadata())
            .store(Arc::new(FileCacheStore::new(&cache_dir).unwrap()))
            .build()
            .unwrap()
    };

    let first = finder_for_run().find("X", NONE).unwrap();
    assert_eq!(keys(&first), vec!["model/alpha", "model/beta"]);

    // Module set changes; the next run still sees the stored resolution.
    write(
        &fx.root().join("vendor/installed.json"),
        r#"{"packages":[{"name":"model/alpha","install_path":"alpha"}]}"#,
    );
    let second = finder_for_run();
    assert_eq!(second.find("X", NONE).unwrap(), first);

    // Post-install hook.
    assert_eq!(second.invalidate("X").unwrap(), 1);
    second.clear_memo();
    assert_eq!(keys(&second.find("X", NONE).unwrap()), vec!["model/alpha"]);
}

#[test]
fn configured_namespaces_come_from_the_config_file() {
    let fx = Fixture::new();
    let config_path: PathBuf = fx.root().join("home/namespaces.yaml");
    write(
        &config_path,
        "version: 0.3.0\nconfig:\n  namespaces:\n    - name: Extra\n      package: model/extra\n",
    );

    let finder = ProvidersFinder::builder()
        .settings(fx.settings())
        .metadata(fx.metadata())
        .namespaces(Arc::new(NamespaceConfigFile::new(&config_path)))
        .build()
        .unwrap();

    let x = finder.find("X", &["model/beta"]).unwrap();
    assert_eq!(keys(&x), vec!["model/alpha", "model/extra"]);

    // The bootstrap contract ignores the Extra namespace even though it provides one.
    let config = finder.find("ConfigProvider", NONE).unwrap();
    assert_eq!(keys(&config), vec!["model/alpha"]);
}
