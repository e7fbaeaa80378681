use crate::config::{LoggingConfig, Section};
use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};
use parking_lot::Mutex;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{fmt, Layer};

// Keeps the non-blocking console worker alive for the whole process.
static CONSOLE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

const DEFAULT_MAX_SIZE_MB: u64 = 100;

/// `None` means the sink is off for that target.
fn parse_level(s: &str) -> Option<LevelFilter> {
    match s.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(LevelFilter::TRACE),
        "debug" => Some(LevelFilter::DEBUG),
        "info" | "" => Some(LevelFilter::INFO),
        "warn" => Some(LevelFilter::WARN),
        "error" => Some(LevelFilter::ERROR),
        "off" | "none" => None,
        _ => Some(LevelFilter::INFO),
    }
}

/// `target` belongs to `prefix` if equal or nested under it (`prefix::...`).
fn target_matches(target: &str, prefix: &str) -> bool {
    target
        .strip_prefix(prefix)
        .map(|rest| rest.is_empty() || rest.starts_with("::"))
        .unwrap_or(false)
}

// ================= rotating file writers =================

type Rotating = Arc<Mutex<FileRotate<AppendTimestamp>>>;

#[derive(Clone)]
struct FileSink(Option<Rotating>);

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &self.0 {
            Some(file) => file.lock().write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &self.0 {
            Some(file) => file.lock().flush(),
            None => Ok(()),
        }
    }
}

/// Routes each record to the file of the longest matching subsystem, else the default file.
#[derive(Clone, Default)]
struct FileRouter {
    default: Option<Rotating>,
    subsystems: Vec<(String, Rotating)>,
}

impl FileRouter {
    fn is_empty(&self) -> bool {
        self.default.is_none() && self.subsystems.is_empty()
    }

    fn route(&self, target: &str) -> Option<Rotating> {
        self.subsystems
            .iter()
            .filter(|(prefix, _)| target_matches(target, prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, file)| file.clone())
            .or_else(|| self.default.clone())
    }
}

impl<'a> fmt::MakeWriter<'a> for FileRouter {
    type Writer = FileSink;

    fn make_writer(&'a self) -> Self::Writer {
        FileSink(self.default.clone())
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        FileSink(self.route(meta.target()))
    }
}

fn open_rotating(section: &Section, base_dir: &Path) -> std::io::Result<Option<Rotating>> {
    let file = section.file.trim();
    if file.is_empty() {
        return Ok(None);
    }
    let path: PathBuf = if Path::new(file).is_absolute() {
        PathBuf::from(file)
    } else {
        base_dir.join(file)
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Backup count wins over age when both are set.
    let limit = match section.max_backups {
        Some(n) => FileLimit::MaxFiles(n),
        None => FileLimit::Age(chrono::Duration::days(
            i64::from(section.max_age_days.unwrap_or(1)),
        )),
    };
    let max_bytes = section.max_size_mb.unwrap_or(DEFAULT_MAX_SIZE_MB) as usize * 1024 * 1024;

    let rotate = FileRotate::new(
        &path,
        AppendTimestamp::default(limit),
        ContentLimit::BytesSurpassed(max_bytes),
        Compression::None,
        None,
    );
    Ok(Some(Arc::new(Mutex::new(rotate))))
}

fn build_file_router(cfg: &LoggingConfig, base_dir: &Path) -> FileRouter {
    let mut router = FileRouter::default();
    for (name, section) in cfg {
        match open_rotating(section, base_dir) {
            Ok(Some(file)) if name == "default" => router.default = Some(file),
            Ok(Some(file)) => router.subsystems.push((name.clone(), file)),
            Ok(None) => {}
            Err(e) => eprintln!("Failed to open log file '{}' for '{}': {}", section.file, name, e),
        }
    }
    router
}

// ================= per-sink targets =================

#[derive(Clone, Copy)]
enum Sink {
    Console,
    File { has_default_file: bool },
}

fn build_targets(cfg: &LoggingConfig, sink: Sink) -> Targets {
    let default = cfg.get("default");
    let default_level = match sink {
        Sink::Console => default
            .map(|s| parse_level(&s.console_level).unwrap_or(LevelFilter::OFF))
            .unwrap_or(LevelFilter::INFO),
        Sink::File { has_default_file } if has_default_file => default
            .map(|s| parse_level(&s.file_level).unwrap_or(LevelFilter::OFF))
            .unwrap_or(LevelFilter::INFO),
        Sink::File { .. } => LevelFilter::OFF,
    };

    cfg.iter()
        .filter(|(name, _)| name.as_str() != "default")
        .fold(Targets::new().with_default(default_level), |targets, (name, section)| {
            let level = match sink {
                Sink::Console => parse_level(&section.console_level),
                Sink::File { .. } if section.file.trim().is_empty() => return targets,
                Sink::File { .. } => parse_level(&section.file_level),
            };
            targets.with_target(name.clone(), level.unwrap_or(LevelFilter::OFF))
        })
}

// ================= public init =================

/// Install the global subscriber: console (stderr) plus optional JSON files, per-target levels.
///
/// `RUST_LOG`, when set, caps both sinks. Relative log file paths resolve against `base_dir`.
pub fn init_logging_unified(cfg: &LoggingConfig, base_dir: &Path) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

    // Bridge `log` → `tracing` before installing the subscriber.
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("LogTracer init skipped: {e}");
    }

    if cfg.is_empty() {
        init_minimal();
        return;
    }

    let router = build_file_router(cfg, base_dir);
    let console_targets = build_targets(cfg, Sink::Console);
    let file_targets = build_targets(
        cfg,
        Sink::File {
            has_default_file: router.default.is_some(),
        },
    );

    let (stderr, guard) = tracing_appender::non_blocking(std::io::stderr());
    let _ = CONSOLE_GUARD.set(guard);

    let console = fmt::layer()
        .with_writer(stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(console_targets);

    let files = (!router.is_empty()).then(|| {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(router)
            .with_filter(file_targets)
    });

    let _ = Registry::default()
        .with(EnvFilter::try_from_default_env().ok())
        .with(console)
        .with(files)
        .try_init();
}

/// INFO to stderr, capped by `RUST_LOG` when set.
pub fn init_minimal() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

    let _ = Registry::default()
        .with(EnvFilter::try_from_default_env().ok())
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .with_filter(LevelFilter::INFO),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tracing::Level;

    fn section(console: &str, file: &str, file_level: &str) -> Section {
        Section {
            console_level: console.to_string(),
            file: file.to_string(),
            file_level: file_level.to_string(),
            max_age_days: None,
            max_backups: Some(2),
            max_size_mb: Some(1),
        }
    }

    #[test]
    fn target_prefix_matching() {
        assert!(target_matches("svckit", "svckit"));
        assert!(target_matches("svckit::builder", "svckit"));
        assert!(!target_matches("svckit_bootstrap", "svckit"));
        assert!(!target_matches("other", "svckit"));
    }

    #[test]
    fn level_parsing() {
        assert_eq!(parse_level("DEBUG"), Some(LevelFilter::DEBUG));
        assert_eq!(parse_level("off"), None);
        assert_eq!(parse_level("bogus"), Some(LevelFilter::INFO));
    }

    #[test]
    fn console_targets_follow_sections() {
        let mut cfg = HashMap::new();
        cfg.insert("default".to_string(), section("warn", "", ""));
        cfg.insert("svckit".to_string(), section("debug", "", ""));
        cfg.insert("noisy".to_string(), section("off", "", ""));

        let targets = build_targets(&cfg, Sink::Console);
        assert!(targets.would_enable("svckit::builder", &Level::DEBUG));
        assert!(!targets.would_enable("voting_synth", &Level::INFO));
        assert!(targets.would_enable("voting_synth", &Level::WARN));
        assert!(!targets.would_enable("noisy", &Level::ERROR));
    }

    #[test]
    fn file_targets_skip_sections_without_file() {
        let mut cfg = HashMap::new();
        cfg.insert("svckit".to_string(), section("info", "", "debug"));

        let targets = build_targets(&cfg, Sink::File { has_default_file: false });
        assert!(!targets.would_enable("svckit", &Level::ERROR));
    }

    #[test]
    fn router_prefers_the_most_specific_subsystem() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = HashMap::new();
        cfg.insert("default".to_string(), section("info", "logs/all.log", "info"));
        cfg.insert("svckit".to_string(), section("info", "logs/svckit.log", "debug"));
        cfg.insert(
            "svckit::builder".to_string(),
            section("info", "logs/builder.log", "debug"),
        );

        let router = build_file_router(&cfg, tmp.path());
        assert_eq!(router.subsystems.len(), 2);

        let builder = router.route("svckit::builder").unwrap();
        let core = router.route("svckit::service").unwrap();
        let other = router.route("voting_synth").unwrap();
        assert!(!Arc::ptr_eq(&builder, &core));
        assert!(Arc::ptr_eq(&other, router.default.as_ref().unwrap()));
        assert!(tmp.path().join("logs").is_dir());
    }
}
