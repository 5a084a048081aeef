//! # LogManager: the single consumer of the record queue.
//!
//! Exactly one manager task exists per [`LoggingContext`](super::LoggingContext).
//! It owns every log file handle, so records written to one file keep their
//! dequeue order and no two records are ever formatted or written concurrently.
//!
//! ## Routing
//! ```text
//! record.severity
//!   ├─ Workload   ─► <log_dir>/daemon/<identity>.log
//!   ├─ Exception  ─► <log_dir>/exception.log
//!   ├─ Syslog     ─► <log_dir>/debug.log + SyslogSink
//!   └─ otherwise  ─► <log_dir>/debug.log
//! ```
//!
//! ## Rules
//! - `debug.log` is opened eagerly by [`LogManager::open`]; failure is fatal.
//! - Every other file is opened lazily on first use and kept open.
//! - Failures after start are reported through `tracing` and never reach producers.
//! - Each line is flushed before the next record is taken, so aborting the task
//!   between records never leaves a partially buffered file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::queue::QueueReceiver;
use super::record::{LogRecord, strip_colors};
use super::severity::Severity;
use super::syslog::SyslogSink;
use crate::error::LogError;

/// Main log file name inside the log directory.
pub const DEBUG_LOG: &str = "debug.log";
/// Exception log file name inside the log directory.
pub const EXCEPTION_LOG: &str = "exception.log";
/// Sub-directory holding per-worker log files.
pub const DAEMON_DIR: &str = "daemon";

/// Returns the per-worker log path `<log_dir>/daemon/<name>.log` (lowercased, sanitized).
pub fn worker_log_path(log_dir: &Path, worker: &str) -> PathBuf {
    let file: String = worker
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    log_dir.join(DAEMON_DIR).join(format!("{file}.log"))
}

/// Consumer that drains the queue and writes formatted lines.
pub struct LogManager {
    rx: QueueReceiver,
    log_dir: PathBuf,
    files: HashMap<PathBuf, File>,
    syslog: Arc<dyn SyslogSink>,
}

impl LogManager {
    /// Prepares the log directory and opens `debug.log`.
    ///
    /// A path that exists but is not a directory is replaced by a directory.
    pub fn open(
        rx: QueueReceiver,
        log_dir: &Path,
        syslog: Arc<dyn SyslogSink>,
    ) -> Result<Self, LogError> {
        prepare_dir(log_dir)?;

        let debug_path = log_dir.join(DEBUG_LOG);
        let debug = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&debug_path)
            .map_err(|source| LogError::OpenFile {
                path: debug_path.clone(),
                source,
            })?;

        let mut files = HashMap::new();
        files.insert(debug_path, File::from_std(debug));

        Ok(Self {
            rx,
            log_dir: log_dir.to_path_buf(),
            files,
            syslog,
        })
    }

    /// Drains the queue until every sender is dropped (or the task is aborted).
    pub async fn run(mut self) {
        while let Some(record) = self.rx.recv().await {
            self.handle(record).await;
        }
        for file in self.files.values_mut() {
            let _ = file.flush().await;
        }
    }

    async fn handle(&mut self, record: LogRecord) {
        let now = Local::now().naive_local();

        match record.severity {
            Severity::Workload => {
                let target = worker_log_path(&self.log_dir, &record.identity);
                let bare = LogRecord {
                    identity: String::new(),
                    ..record
                };
                self.write(target, &bare.format_line(now)).await;
            }
            // debug.log gets the DEBUG twin pushed by `LogFacade::exception`
            Severity::Exception => {
                let line = record.format_line(now);
                self.write(self.log_dir.join(EXCEPTION_LOG), &line).await;
            }
            severity => {
                let line = record.format_line(now);
                self.write(self.log_dir.join(DEBUG_LOG), &line).await;
                if severity.mirrors_to_syslog() {
                    self.syslog.send(strip_colors(&record.message).trim_end());
                }
            }
        }
    }

    async fn write(&mut self, path: PathBuf, line: &str) {
        if !self.files.contains_key(&path) {
            match open_append(&path).await {
                Ok(file) => {
                    self.files.insert(path.clone(), file);
                }
                Err(error) => {
                    tracing::error!(path = %path.display(), %error, "log file unavailable; record dropped");
                    return;
                }
            }
        }

        let Some(file) = self.files.get_mut(&path) else {
            return;
        };
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');

        let res = async {
            file.write_all(buf.as_bytes()).await?;
            file.flush().await
        }
        .await;

        if let Err(error) = res {
            tracing::warn!(path = %path.display(), %error, "log write failed; handle will be reopened");
            self.files.remove(&path);
        }
    }
}

fn prepare_dir(dir: &Path) -> Result<(), LogError> {
    if dir.exists() && !dir.is_dir() {
        std::fs::remove_file(dir).map_err(|source| LogError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    std::fs::create_dir_all(dir).map_err(|source| LogError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })
}

async fn open_append(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    OpenOptions::new().create(true).append(true).open(path).await
}
