//! Process-wide logging
//!
//! Installs a `tracing` subscriber that renders every event as
//! `[YYYY-MM-DD HH:MM:SS] [LEVEL] message` and tees each record to
//! standard error and to an append-opened `download.log` under the OS
//! configuration directory, flushing after every record. Both sinks are
//! written under one mutex so records never interleave.
//!
//! The formatter and tee writer are plain types that work against any
//! `io::Write`, so tests can inject their own sinks instead of touching
//! the global subscriber or the real configuration directory.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::registry::LookupSpan;

use crate::config::config_dir;
use crate::constants::paths::LOG_FILE_NAME;

/// Options for [`init`]
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Records below this level are dropped
    pub level: Level,
    /// Directory for `download.log`; defaults to the OS config directory
    pub dir: Option<PathBuf>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            dir: None,
        }
    }
}

/// Event formatter producing `[YYYY-MM-DD HH:MM:SS] [LEVEL] message`
#[derive(Debug, Default)]
pub struct RecordFormat;

impl<S, N> FormatEvent<S, N> for RecordFormat
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
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        write!(writer, "[{}] [{}] ", timestamp, event.metadata().level())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Writes each record to stderr and, when available, to the log file.
///
/// One mutex serializes both sinks; the file is flushed after every
/// record so a crash never loses the tail of the log.
#[derive(Clone, Debug)]
pub struct TeeMakeWriter {
    file: Arc<Mutex<Option<File>>>,
}

impl TeeMakeWriter {
    pub fn new(file: Option<File>) -> Self {
        Self {
            file: Arc::new(Mutex::new(file)),
        }
    }
}

impl<'a> MakeWriter<'a> for TeeMakeWriter {
    type Writer = TeeWriter;

    fn make_writer(&'a self) -> Self::Writer {
        TeeWriter {
            file: Arc::clone(&self.file),
        }
    }
}

/// Single-record writer handed out by [`TeeMakeWriter`]
#[derive(Debug)]
pub struct TeeWriter {
    file: Arc<Mutex<Option<File>>>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self
            .file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        io::stderr().write_all(buf)?;
        if let Some(file) = file.as_mut() {
            file.write_all(buf)?;
            file.flush()?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

/// Open `download.log` for appending under `dir`, creating the directory
/// tree as needed. Falls back to the current directory, then to no file.
pub fn open_log_file(dir: &Path) -> Option<File> {
    match append_open(&dir.join(LOG_FILE_NAME)) {
        Ok(file) => Some(file),
        Err(error) => {
            eprintln!(
                "warning: could not open log file under {}: {}",
                dir.display(),
                error
            );
            match append_open(Path::new(LOG_FILE_NAME)) {
                Ok(file) => Some(file),
                Err(_) => None,
            }
        }
    }
}

fn append_open(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the global subscriber. Call once, early in `main`.
pub fn init(options: LogOptions) {
    let dir = options.dir.unwrap_or_else(config_dir);
    let file = open_log_file(&dir);

    tracing_subscriber::fmt()
        .event_format(RecordFormat)
        .with_writer(TeeMakeWriter::new(file))
        .with_max_level(options.level)
        .init();
}
