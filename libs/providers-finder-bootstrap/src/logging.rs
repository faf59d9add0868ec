use crate::config::{LoggingConfig, Section};
use parking_lot::Mutex;
use std::io::IsTerminal;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{fmt, util::SubscriberInitExt, Layer};

use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};

// Keep a guard for non-blocking console to avoid being dropped.
static CONSOLE_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

const DEFAULT_SECTION: &str = "default";
const DEFAULT_MAX_SIZE_MB: u64 = 100;

// ================= level helpers =================

/// `None` means the sink is switched off; unknown names fall back to INFO.
fn parse_tracing_level(s: &str) -> Option<Level> {
    match s.to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        "off" | "none" => None,
        _ => Some(Level::INFO),
    }
}

fn level_filter(s: &str) -> LevelFilter {
    parse_tracing_level(s)
        .map(LevelFilter::from_level)
        .unwrap_or(LevelFilter::OFF)
}

/// Returns true if target == crate_name or target starts with "crate_name::"
fn matches_crate_prefix(target: &str, crate_name: &str) -> bool {
    target
        .strip_prefix(crate_name)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

// ================= rotating writer for files =================

#[derive(Clone)]
struct RotWriter(Arc<Mutex<FileRotate<AppendTimestamp>>>);

impl Write for RotWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.0.lock().flush()
    }
}

/// A writer that may have no destination (drops writes).
struct RoutedWriter(Option<RotWriter>);

impl Write for RoutedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.0 {
            Some(w) => w.write(buf),
            None => Ok(buf.len()),
        }
    }
    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.0 {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

/// Routes records to files by target prefix. The longest matching prefix
/// wins; records matching none go to the default file, if any.
#[derive(Clone, Default)]
struct FileRouter {
    default: Option<RotWriter>,
    // sorted by descending prefix length
    by_prefix: Vec<(String, RotWriter)>,
}

impl FileRouter {
    fn resolve_for(&self, target: &str) -> Option<RotWriter> {
        self.by_prefix
            .iter()
            .find(|(prefix, _)| matches_crate_prefix(target, prefix))
            .map(|(_, w)| w.clone())
            .or_else(|| self.default.clone())
    }

    fn is_empty(&self) -> bool {
        self.default.is_none() && self.by_prefix.is_empty()
    }
}

impl<'a> fmt::MakeWriter<'a> for FileRouter {
    type Writer = RoutedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        RoutedWriter(self.default.clone())
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        RoutedWriter(self.resolve_for(meta.target()))
    }
}

// ================= config view =================

struct Sections<'a> {
    default: Option<&'a Section>,
    // per-crate sections, sorted by name for stable filter construction
    crates: Vec<(&'a str, &'a Section)>,
}

impl<'a> Sections<'a> {
    fn from_config(cfg: &'a LoggingConfig) -> Self {
        let mut crates: Vec<(&str, &Section)> = cfg
            .iter()
            .filter(|(k, _)| k.as_str() != DEFAULT_SECTION)
            .map(|(k, v)| (k.as_str(), v))
            .collect();
        crates.sort_by(|a, b| a.0.cmp(b.0));
        Self {
            default: cfg.get(DEFAULT_SECTION),
            crates,
        }
    }

    fn is_empty(&self) -> bool {
        self.default.is_none() && self.crates.is_empty()
    }

    fn console_targets(&self) -> Targets {
        let default_level = self
            .default
            .map(|s| level_filter(&s.console_level))
            .unwrap_or(LevelFilter::INFO);

        self.crates
            .iter()
            .fold(Targets::new().with_default(default_level), |t, (name, s)| {
                t.with_target(*name, level_filter(&s.console_level))
            })
    }

    fn file_targets(&self, has_default_file: bool) -> Targets {
        let default_level = match self.default {
            Some(s) if has_default_file && !s.file_level.trim().is_empty() => {
                level_filter(&s.file_level)
            }
            _ if has_default_file => LevelFilter::INFO,
            _ => LevelFilter::OFF,
        };

        self.crates
            .iter()
            .filter(|(_, s)| !s.file.trim().is_empty())
            .fold(Targets::new().with_default(default_level), |t, (name, s)| {
                t.with_target(*name, level_filter(&s.file_level))
            })
    }
}

// ================= file writers =================

fn resolve_log_path(file: &str, base_dir: &Path) -> PathBuf {
    let p = Path::new(file);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

fn rotating_writer(section: &Section, base_dir: &Path) -> std::io::Result<Option<RotWriter>> {
    if section.file.trim().is_empty() {
        return Ok(None);
    }

    let log_path = resolve_log_path(&section.file, base_dir);
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Prefer a file count when configured, else an age limit.
    let limit = match section.max_backups {
        Some(n) => FileLimit::MaxFiles(n),
        None => FileLimit::Age(chrono::Duration::days(
            i64::from(section.max_age_days.unwrap_or(1)),
        )),
    };
    let max_bytes = section.max_size_mb.unwrap_or(DEFAULT_MAX_SIZE_MB) as usize * 1024 * 1024;

    let rot = FileRotate::new(
        &log_path,
        AppendTimestamp::default(limit),
        ContentLimit::BytesSurpassed(max_bytes),
        Compression::None,
        None,
    );
    Ok(Some(RotWriter(Arc::new(Mutex::new(rot)))))
}

fn build_file_router(sections: &Sections<'_>, base_dir: &Path) -> FileRouter {
    let open = |name: &str, section: &Section| match rotating_writer(section, base_dir) {
        Ok(w) => w,
        Err(e) => {
            eprintln!(
                "Failed to init log file for '{name}': {} ({e})",
                resolve_log_path(&section.file, base_dir).display()
            );
            None
        }
    };

    let mut router = FileRouter {
        default: sections.default.and_then(|s| open(DEFAULT_SECTION, s)),
        by_prefix: sections
            .crates
            .iter()
            .filter_map(|(name, s)| open(name, s).map(|w| (name.to_string(), w)))
            .collect(),
    };
    router
        .by_prefix
        .sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
    router
}

// ================= public init =================

/// Install the global subscriber from the `logging` configuration.
///
/// Console output is human-readable on stderr; file output is JSON, routed
/// by target prefix. `RUST_LOG`, when set, caps both sinks. Relative log
/// file paths are resolved against `base_dir`.
pub fn init_logging_unified(cfg: &LoggingConfig, base_dir: &Path) {
    // Bridge `log` → `tracing` *before* installing the subscriber
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("LogTracer init skipped: {e}");
    }

    let sections = Sections::from_config(cfg);
    if sections.is_empty() {
        init_minimal();
        return;
    }

    let router = build_file_router(&sections, base_dir);
    let console_targets = sections.console_targets();
    let file_targets = sections.file_targets(router.default.is_some());

    install_subscriber(console_targets, file_targets, router);
}

fn install_subscriber(console_targets: Targets, file_targets: Targets, router: FileRouter) {
    use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

    let env: Option<EnvFilter> = EnvFilter::try_from_default_env().ok();

    let (nb_stderr, guard) = tracing_appender::non_blocking(std::io::stderr());
    let _ = CONSOLE_GUARD.set(guard);

    let console_layer = fmt::layer()
        .with_writer(nb_stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(true)
        .with_level(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(console_targets);

    let file_layer = (!router.is_empty()).then(|| {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(true)
            .with_level(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(router)
            .with_filter(file_targets)
    });

    let _ = Registry::default()
        .with(env)
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

/// INFO to stderr, capped by `RUST_LOG` when set.
pub fn init_minimal() {
    use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

    let env = EnvFilter::try_from_default_env().ok();
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(LevelFilter::INFO);

    let _ = Registry::default().with(env).with(fmt_layer).try_init();
}
