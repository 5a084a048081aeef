//! # LoggingContext: owner of the log pipeline.
//!
//! Created once by the process root and injected (as [`LogFacade`] clones) into
//! every component that logs. There is no global logger.
//!
//! ## Lifecycle
//! ```text
//! init(cfg) ──► prepare log_dir, open debug.log   (fatal on failure)
//!           ──► spawn LogManager::run()            (single consumer)
//!           ──► "Initialized logging successfully"
//!
//! shutdown()
//!   (a) enqueue final record, close the gate       (later records are dropped)
//!   (b) drain(cfg.drain_timeout)                   (wait for queue empty, Notify-based)
//!   (c) sleep(cfg.grace)                           (in-flight dequeue)
//!   (d) abort the manager task                     (errors swallowed)
//! ```
//!
//! Records enqueued after step (a) race the shutdown and may be lost. This is
//! the at-most-once price for bounded shutdown latency.

use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::facade::LogFacade;
use super::manager::LogManager;
use super::queue::{QueueSender, RecordQueue};
use super::record::{LogRecord, caller_of, resolve_identity};
use super::severity::Severity;
use super::syslog::{HostSyslog, NullSyslog, SyslogSink};
use crate::config::LogConfig;
use crate::error::LogError;

/// Outcome of [`LoggingContext::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// True if the queue was observed empty before `drain_timeout` elapsed.
    pub drained: bool,
}

/// Owner of the record queue and of the log manager task.
pub struct LoggingContext {
    cfg: LogConfig,
    tx: QueueSender,
    facade: LogFacade,
    manager: JoinHandle<()>,
}

impl LoggingContext {
    /// Starts the pipeline with the host syslog as SYSLOG mirror (if enabled).
    ///
    /// Must be called from within a tokio runtime.
    pub fn init(cfg: &LogConfig) -> Result<Self, LogError> {
        let sink: Arc<dyn SyslogSink> = if cfg.syslog {
            let ident = cfg.process_label.as_deref().unwrap_or("profilevisor");
            Arc::new(HostSyslog::open(ident))
        } else {
            Arc::new(NullSyslog)
        };
        Self::init_with_syslog(cfg, sink)
    }

    /// Starts the pipeline with an explicit syslog sink.
    ///
    /// Fails (and starts nothing) if the log directory or `debug.log` cannot be prepared.
    pub fn init_with_syslog(cfg: &LogConfig, syslog: Arc<dyn SyslogSink>) -> Result<Self, LogError> {
        let (tx, rx) = RecordQueue::channel();
        let manager = LogManager::open(rx, &cfg.log_dir, syslog)?;
        let manager = tokio::spawn(manager.run());

        let facade = LogFacade::new(tx.clone(), cfg.process_label.clone());
        facade.debug("Initialized logging successfully");

        Ok(Self {
            cfg: cfg.clone(),
            tx,
            facade,
            manager,
        })
    }

    /// Returns a producer handle.
    pub fn facade(&self) -> LogFacade {
        self.facade.clone()
    }

    /// Records still waiting for the consumer.
    pub fn pending(&self) -> usize {
        self.tx.pending()
    }

    /// Waits until the queue reports empty, at most `limit`.
    pub async fn drain(&self, limit: Duration) -> bool {
        self.tx.wait_empty(limit).await
    }

    /// Drain-then-kill shutdown. Always completes.
    pub async fn shutdown(self) -> ShutdownReport {
        let caller = caller_of(Location::caller());
        let identity = resolve_identity(None, self.cfg.process_label.as_deref());
        self.tx.close();
        self.tx.push_unchecked(LogRecord::new(
            Severity::Debug,
            "Shutting down logging subsystem",
            caller,
            identity,
        ));

        let drained = self.drain(self.cfg.drain_timeout).await;
        if !drained {
            tracing::warn!(
                pending = self.tx.pending(),
                timeout = ?self.cfg.drain_timeout,
                "log queue not drained before timeout"
            );
        }
        tokio::time::sleep(self.cfg.grace).await;

        self.manager.abort();
        // The task may already be gone; either outcome is fine.
        let _ = self.manager.await;

        ShutdownReport { drained }
    }
}
