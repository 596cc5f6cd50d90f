//! # Asynchronous Logging
//!
//! `tracing` front end, thread-pool back end.
//!
//! [`AsyncLogSink`] is a [`MakeWriter`] for `tracing-subscriber`'s formatter.
//! Each formatted event (level, timestamp, target, fields) is buffered by a
//! [`LineWriter`] and handed to a single-worker [`ThreadPool`] when the
//! formatter is done with it, so network tasks never block on console or
//! file I/O and lines keep their emission order.
//!
//! [`LogGuard::flush`] (and dropping the guard) waits until every submitted
//! line has been written, so shutdown never loses buffered output.
//!
//! ```rust,no_run
//! use hybrid_protocol::config::LoggingConfig;
//! use hybrid_protocol::utils::logging::init_logging;
//!
//! let _guard = init_logging(&LoggingConfig::default())?;
//! tracing::info!("server starting");
//! # Ok::<(), hybrid_protocol::error::ProtocolError>(())
//! ```

use parking_lot::{Condvar, Mutex};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};
use crate::utils::thread_pool::ThreadPool;

struct Outputs {
    console: bool,
    file: Option<Mutex<File>>,
}

impl Outputs {
    fn write(&self, line: &[u8]) {
        // Nowhere left to report a failing log write.
        if self.console {
            let _ = io::stdout().lock().write_all(line);
        }
        if let Some(file) = &self.file {
            let mut file = file.lock();
            let _ = file.write_all(line).and_then(|()| file.flush());
        }
    }
}

#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn begin(self: &Arc<Self>) -> PendingGuard {
        *self.count.lock() += 1;
        PendingGuard(Arc::clone(self))
    }

    fn wait_idle(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.idle.wait(&mut count);
        }
    }
}

/// Marks one submitted line as finished when dropped, even if the job never ran.
struct PendingGuard(Arc<Pending>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut count = self.0.count.lock();
        *count -= 1;
        if *count == 0 {
            self.0.idle.notify_all();
        }
    }
}

struct SinkInner {
    pool: ThreadPool,
    outputs: Arc<Outputs>,
    pending: Arc<Pending>,
}

/// Log destination that writes lines on a background worker.
#[derive(Clone)]
pub struct AsyncLogSink {
    inner: Arc<SinkInner>,
}

impl AsyncLogSink {
    /// Build a sink for the outputs enabled in `config`.
    pub fn new(config: &LoggingConfig) -> Result<Self> {
        let file = match (config.log_to_file, config.log_file_path.as_deref()) {
            (true, Some(path)) => Some(open_append(Path::new(path))?),
            (true, None) => {
                return Err(ProtocolError::ConfigError(
                    "log_file_path must be specified when log_to_file is true".to_string(),
                ))
            }
            (false, _) => None,
        };
        Self::with_outputs(config.log_to_console, file)
    }

    /// Sink that appends to a file only.
    pub fn to_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_outputs(false, Some(open_append(path.as_ref())?))
    }

    fn with_outputs(console: bool, file: Option<File>) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(SinkInner {
                pool: ThreadPool::with_name("log-writer", 1)?,
                outputs: Arc::new(Outputs {
                    console,
                    file: file.map(Mutex::new),
                }),
                pending: Arc::new(Pending::default()),
            }),
        })
    }

    /// Queue one line for writing; a trailing newline is added if missing.
    pub fn write_line(&self, line: impl Into<Vec<u8>>) {
        let mut line = line.into();
        if line.last() != Some(&b'\n') {
            line.push(b'\n');
        }

        let guard = self.inner.pending.begin();
        let outputs = Arc::clone(&self.inner.outputs);
        // A refused job drops its guard, so flush cannot hang on it.
        let _ = self.inner.pool.submit(move || {
            outputs.write(&line);
            drop(guard);
        });
    }

    /// Block until every queued line has been written.
    pub fn flush(&self) {
        self.inner.pending.wait_idle();
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            ProtocolError::ConfigError(format!(
                "Failed to open log file {}: {e}",
                path.display()
            ))
        })
}

/// Buffers one formatted event and submits it on drop.
pub struct LineWriter {
    buf: Vec<u8>,
    sink: AsyncLogSink,
}

impl Write for LineWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for LineWriter {
    fn drop(&mut self) {
        if !self.buf.is_empty() {
            self.sink.write_line(std::mem::take(&mut self.buf));
        }
    }
}

impl<'a> MakeWriter<'a> for AsyncLogSink {
    type Writer = LineWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LineWriter {
            buf: Vec::with_capacity(256),
            sink: self.clone(),
        }
    }
}

/// Keeps the logging back end alive; flushes pending lines on drop.
pub struct LogGuard {
    sink: AsyncLogSink,
}

impl LogGuard {
    pub fn flush(&self) {
        self.sink.flush();
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        self.sink.flush();
    }
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `config.log_level`. Fails if a global
/// subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<LogGuard> {
    let sink = AsyncLogSink::new(config)?;
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.log_level).into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(sink.clone())
        .with_ansi(false)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| ProtocolError::ConfigError(format!("Failed to install log subscriber: {e}")))?;

    tracing::info!(app = %config.app_name, "Logging initialized");
    Ok(LogGuard { sink })
}
