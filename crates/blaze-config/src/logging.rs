//! `tracing` setup driven by the `[logging]` section.
//!
//! Every event is formatted once and fanned out to an in-memory [`LogBuffer`] plus the optional
//! stderr and file sinks. [`tracing_setup`] builds the dispatcher without installing it, so hosts
//! and tests can scope it; [`init_tracing`] installs it process-wide.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, MutexGuard};
use tracing::Dispatch;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// A level (`info`, `debug`, ...) or a full `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit one JSON object per event.
    #[serde(default)]
    pub json: bool,

    /// Mirror logs to stderr.
    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Append logs to this file. If it cannot be opened the other sinks keep working.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Number of log lines kept in memory.
    #[serde(default = "LoggingConfig::default_buffer_lines")]
    pub buffer_lines: usize,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }

    pub(crate) fn default_buffer_lines() -> usize {
        2_000
    }

    fn level_directives(&self) -> String {
        let trimmed = self.level.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" => Self::default_level(),
            "warning" => "warn".to_owned(),
            level @ ("trace" | "debug" | "info" | "warn" | "error" | "off") => level.to_owned(),
            _ => trimmed.to_owned(),
        }
    }

    /// The configured filter with `RUST_LOG` directives layered on top.
    ///
    /// An unparsable `RUST_LOG` is ignored; an unparsable configured level falls back to `info`.
    pub fn env_filter(&self) -> EnvFilter {
        let configured = self.level_directives();
        let from_env = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        from_env
            .and_then(|env| EnvFilter::try_new(format!("{configured},{env}")).ok())
            .or_else(|| EnvFilter::try_new(&configured).ok())
            .unwrap_or_else(|| EnvFilter::new("info"))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
            file: None,
            buffer_lines: Self::default_buffer_lines(),
        }
    }
}

/// Bounded ring of formatted log lines, oldest first.
#[derive(Debug)]
pub struct LogBuffer {
    capacity: usize,
    lines: Mutex<VecDeque<String>>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            lines: Mutex::new(VecDeque::with_capacity(capacity.min(1_024))),
        }
    }

    pub fn push_line(&self, line: String) {
        let mut lines = self.lines.lock();
        while lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Up to `n` of the newest lines, oldest first.
    pub fn last_lines(&self, n: usize) -> Vec<String> {
        let lines = self.lines.lock();
        let skip = lines.len().saturating_sub(n);
        lines.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone)]
struct BufferSink(Arc<LogBuffer>);

impl<'a> MakeWriter<'a> for BufferSink {
    type Writer = BufferedEvent;

    fn make_writer(&'a self) -> Self::Writer {
        BufferedEvent {
            buffer: self.0.clone(),
            bytes: Vec::new(),
        }
    }
}

/// Collects one formatted event and splits it into lines when dropped.
struct BufferedEvent {
    buffer: Arc<LogBuffer>,
    bytes: Vec<u8>,
}

impl Write for BufferedEvent {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for BufferedEvent {
    fn drop(&mut self) {
        String::from_utf8_lossy(&self.bytes)
            .lines()
            .filter(|line| !line.is_empty())
            .for_each(|line| self.buffer.push_line(line.to_owned()));
    }
}

/// Shared append-mode log file.
#[derive(Clone)]
struct LogFile(Arc<Mutex<File>>);

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = LockedLogFile<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        LockedLogFile(self.0.lock())
    }
}

struct LockedLogFile<'a>(MutexGuard<'a, File>);

impl Write for LockedLogFile<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

/// A dispatcher built from a [`LoggingConfig`], not yet installed.
pub struct TracingSetup {
    pub dispatch: Dispatch,
    pub buffer: Arc<LogBuffer>,
    /// Why the configured log file could not be opened, if it could not.
    pub file_error: Option<io::Error>,
}

impl std::fmt::Debug for TracingSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracingSetup")
            .field("buffer_lines", &self.buffer.len())
            .field("file_error", &self.file_error)
            .finish_non_exhaustive()
    }
}

/// Build the dispatcher for `logging`, writing into a fresh [`LogBuffer`].
pub fn tracing_setup(logging: &LoggingConfig) -> TracingSetup {
    let buffer = Arc::new(LogBuffer::new(logging.buffer_lines));
    let mut writer = BoxMakeWriter::new(BufferSink(buffer.clone()));
    if logging.stderr {
        // Keeps `cargo test` output capture working in debug builds.
        writer = if cfg!(debug_assertions) {
            BoxMakeWriter::new(
                writer.and(tracing_subscriber::fmt::writer::TestWriter::with_stderr),
            )
        } else {
            BoxMakeWriter::new(writer.and(io::stderr))
        };
    }

    let mut file_error = None;
    if let Some(path) = logging.file.as_ref() {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                let file = LogFile(Arc::new(Mutex::new(file)));
                writer = BoxMakeWriter::new(writer.and(file));
            }
            Err(err) => file_error = Some(err),
        }
    }

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false);
    let layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = if logging.json {
        layer.json().boxed()
    } else {
        layer.boxed()
    };

    let dispatch = Dispatch::new(
        tracing_subscriber::registry()
            .with(logging.env_filter())
            .with(layer),
    );
    TracingSetup {
        dispatch,
        buffer,
        file_error,
    }
}

static GLOBAL_LOG_BUFFER: OnceLock<Arc<LogBuffer>> = OnceLock::new();

/// Install structured logging for the process and return its log buffer.
///
/// Only the first call installs anything; later calls return the same buffer.
pub fn init_tracing(logging: &LoggingConfig) -> Arc<LogBuffer> {
    let mut installed = false;
    let buffer = GLOBAL_LOG_BUFFER
        .get_or_init(|| {
            let setup = tracing_setup(logging);
            let buffer = setup.buffer.clone();
            installed = tracing::dispatcher::set_global_default(setup.dispatch).is_ok();
            if installed {
                if let (Some(path), Some(err)) = (logging.file.as_ref(), setup.file_error) {
                    tracing::warn!(
                        target: "blaze.config",
                        path = %path.display(),
                        error = %err,
                        "failed to open log file; file logging disabled"
                    );
                }
            }
            buffer
        })
        .clone();
    if installed {
        tracing::debug!(target: "blaze.config", level = %logging.level, "tracing initialised");
    }
    buffer
}
