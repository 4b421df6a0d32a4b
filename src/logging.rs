//! Structured log sink.
//!
//! Installs a `tracing-subscriber` formatter with a minimum level, a message
//! prefix, and RFC 3339 timestamps:
//!
//! ```text
//! 2026-10-19T08:15:02.114Z [MCP] [INFO] tool provider connected tools=12
//! ```
//!
//! `RUST_LOG` overrides the configured level. Output goes to stderr, or to a
//! rotated, line-flushed file when `logging.file` is set.

use std::fmt::Write as _;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use crate::config::BridgeConfig;

/// Number of rotated log files kept next to the active one.
const KEEP_ROTATED: u32 = 3;

/// Initialize the global subscriber from the bridge configuration.
///
/// Idempotent: returns `false` when a subscriber was already installed (hot
/// reload, tests, or an embedding application with its own subscriber).
pub fn init(config: &BridgeConfig) -> bool {
    let level = config.log_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_directive()));

    let writer = match &config.logging.file {
        Some(path) => match open_log_file(path) {
            Ok(writer) => BoxMakeWriter::new(writer),
            Err(e) => {
                eprintln!("failed to open log file {}: {e}; logging to stderr", path.display());
                BoxMakeWriter::new(std::io::stderr)
            }
        },
        None => BoxMakeWriter::new(std::io::stderr),
    };
    let ansi = config.logging.file.is_none();

    let installed = if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_target(true)
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(ansi)
            .event_format(PrefixedFormat::new(&config.logging.prefix))
            .try_init()
            .is_ok()
    };

    if installed {
        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            level = level.as_directive(),
            mode = ?config.mode,
            pid = std::process::id(),
            "=== toolbridge logging initialized ==="
        );
    }
    installed
}

// ─── Event Format ────────────────────────────────────────────────────────────

/// `<timestamp> <prefix> [LEVEL] message key=value ...`
#[derive(Debug, Clone)]
pub struct PrefixedFormat {
    prefix: String,
}

impl PrefixedFormat {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    /// Render the line header for a given level.
    fn header(&self, level: &tracing::Level) -> String {
        let mut header = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        if !self.prefix.is_empty() {
            header.push(' ');
            header.push_str(&self.prefix);
        }
        let _ = write!(header, " [{level}] ");
        header
    }
}

impl<S, N> FormatEvent<S, N> for PrefixedFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        writer.write_str(&self.header(event.metadata().level()))?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

// ─── File Sink ───────────────────────────────────────────────────────────────

fn open_log_file(path: &Path) -> std::io::Result<FlushingWriter> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    rotate_log_file(path, KEEP_ROTATED);

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    Ok(FlushingWriter::new(file))
}

/// Rotate log files: `bridge.log` → `bridge.log.1` → `.2` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are skipped.
fn rotate_log_file(base_path: &Path, keep: u32) {
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// A writer that wraps `std::fs::File` and flushes after every write.
///
/// Log lines must survive a crash of the bridge process.
#[derive(Clone)]
struct FlushingWriter {
    file: std::sync::Arc<parking_lot::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: std::sync::Arc::new(parking_lot::Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self.file.lock();
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::Write::flush(&mut *self.file.lock())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_contains_prefix_and_level() {
        let format = PrefixedFormat::new("[MCP]");
        let header = format.header(&tracing::Level::WARN);
        assert!(header.contains(" [MCP] [WARN] "), "header was {header}");
        // RFC 3339 timestamp with millisecond precision and a Z suffix
        let ts = header.split(' ').next().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
        assert!(ts.ends_with('Z'));
    }

    #[test]
    fn test_header_without_prefix() {
        let format = PrefixedFormat::new("");
        let header = format.header(&tracing::Level::INFO);
        assert!(!header.contains("  "));
        assert!(header.ends_with(" [INFO] "));
    }

    #[test]
    fn test_rotate_log_file_shifts_chain() {
        let dir = tempfile::TempDir::new().unwrap();
        let base = dir.path().join("bridge.log");
        std::fs::write(&base, "current").unwrap();
        std::fs::write(dir.path().join("bridge.log.1"), "older").unwrap();

        rotate_log_file(&base, 3);

        assert!(!base.exists());
        let one = std::fs::read_to_string(dir.path().join("bridge.log.1")).unwrap();
        let two = std::fs::read_to_string(dir.path().join("bridge.log.2")).unwrap();
        assert_eq!(one, "current");
        assert_eq!(two, "older");
    }

    #[test]
    fn test_flushing_writer_writes_through() {
        use std::io::Write;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.log");
        let mut writer = open_log_file(&path).unwrap();
        writer.write_all(b"line one\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "line one\n");
    }
}
