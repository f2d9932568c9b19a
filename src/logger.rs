//! Process-wide diagnostic log.
//!
//! [`init`] opens one file per process, named after the second it was opened
//! (`<dir>/<YYYY-MM-DD_HH-MM-SS>.log`), and installs a `tracing` subscriber
//! that writes every event there as `timestamp - LEVEL - message` while
//! mirroring it to stdout.

use std::fmt::{self, Write as _};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use once_cell::sync::OnceCell;
use tracing::{Event, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::core::{DashError, Result};

/// File name pattern, one file per process start.
pub const FILE_NAME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

static LOG_FILE: OnceCell<PathBuf> = OnceCell::new();

/// Line format `2024-05-01 10:00:00,123 - INFO - message`.
pub struct DashFormat;

impl<S, N> FormatEvent<S, N> for DashFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(
            writer,
            "{} - {} - ",
            Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
            event.metadata().level()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Creates `dir` if needed and opens a fresh timestamped log file in it.
pub fn open_log_file(dir: impl AsRef<Path>) -> Result<(PathBuf, File)> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.log", Local::now().format(FILE_NAME_FORMAT)));
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((path, file))
}

/// The `timestamp - LEVEL - message` layer writing INFO and above to `file`.
pub fn file_layer<S>(file: File) -> impl Layer<S> + Send + Sync
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .event_format(DashFormat)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .with_filter(LevelFilter::INFO)
}

/// Builds a subscriber that only writes to `file`.
pub fn file_subscriber(file: File) -> impl Subscriber + Send + Sync {
    tracing_subscriber::registry().with(file_layer(file))
}

/// Installs the global subscriber and returns the log file path.
///
/// Calling it again returns the path chosen by the first call.
pub fn init(dir: impl AsRef<Path>) -> Result<PathBuf> {
    LOG_FILE
        .get_or_try_init(|| -> Result<PathBuf> {
            let (path, file) = open_log_file(dir)?;
            tracing_subscriber::registry()
                .with(file_layer(file))
                .with(tracing_subscriber::fmt::layer().with_filter(LevelFilter::INFO))
                .try_init()
                .map_err(|e| DashError::Config(format!("logging already initialized: {}", e)))?;
            Ok(path)
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_log_file_creates_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("log_data");
        let (path, _file) = open_log_file(&nested).unwrap();

        assert!(nested.is_dir());
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with(".log"));
        // YYYY-MM-DD_HH-MM-SS.log
        assert_eq!(name.len(), 23);
        assert_eq!(&name[10..11], "_");
    }

    #[test]
    fn test_line_format() {
        let dir = TempDir::new().unwrap();
        let (path, file) = open_log_file(dir.path()).unwrap();

        tracing::subscriber::with_default(file_subscriber(file), || {
            tracing::info!("Connected to database {}", "demo.db");
            tracing::error!("SQL programming error: no such table");
            tracing::debug!("filtered out");
        });

        let contents = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" - INFO - Connected to database demo.db"));
        assert!(lines[1].contains(" - ERROR - SQL programming error"));
    }

    #[test]
    fn test_file_layer_under_a_second_layer() {
        let dir = TempDir::new().unwrap();
        let (path, file) = open_log_file(dir.path()).unwrap();

        // Same stacking as `init`, with the mirror sent nowhere.
        let subscriber = tracing_subscriber::registry()
            .with(file_layer(file))
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::sink));
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("Session expired");
            tracing::trace!("filtered out");
        });

        let contents = fs::read_to_string(path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.trim_end().ends_with(" - WARN - Session expired"));
    }
}
