//! # profilevisor
//!
//! **Profilevisor** is the supervisory core of a load-test harness that runs
//! many long-lived worker processes ("profiles") against a system under test.
//!
//! It provides two cooperating parts:
//! - an **ordered log pipeline**: any number of producers push records without
//!   blocking, one consumer writes them to `debug.log`, `exception.log`,
//!   per-worker logs and the host syslog, and shutdown drains before it kills;
//! - a **watchdog**: a periodic loop that probes every registered worker,
//!   remembers confirmed-dead ones in a DeadSet, recovers the operator's last
//!   intent from the audit log and restarts or cleans up accordingly.
//!
//! ## Architecture
//! ```text
//!  producers (any task / thread)
//!  LogFacade ─┐  LogFacade ─┐  LogFacade ─┐
//!             ▼             ▼             ▼
//!  ┌───────────────────────────────────────────────┐
//!  │ RecordQueue (unbounded, FIFO, depth counter)  │
//!  └───────────────────────┬───────────────────────┘
//!                          ▼
//!                 LogManager (single task)
//!          debug.log │ exception.log │ daemon/<w>.log │ syslog
//!
//!  ┌───────────────────────────────────────────────────────────────┐
//!  │ Supervisor                                                    │
//!  │  WorkerRegistry ─► LivenessProber ─► DeadSet                  │
//!  │  AuditLogReader ─► confirm_profile_state                      │
//!  │                      ├─► profile_clean_up   (ProcessTable,    │
//!  │                      │                       Teardown)        │
//!  │                      └─► trigger_profile_operation (Lifecycle)│
//!  └──────────────┬────────────────────────────────────────────────┘
//!                 ▼ publish(Event)
//!        Bus ──► listener ──► SubscriberSet ──► LogWriter / custom
//! ```
//!
//! ### Pass
//! ```text
//! loop {
//!   ├─► registry.list()
//!   ├─► for each worker (failures isolated):
//!   │     COMPLETED / excluded / in DeadSet ─► skip (logged)
//!   │     probe: daemon process present? log advancing? (SLEEPING exempt)
//!   │     misses reach threshold ─► DeadSet
//!   │       └─► expected = audit intent
//!   │           ├─ already consistent ─► nothing
//!   │           ├─ Stop               ─► terminate + teardown
//!   │           └─ Start / Restart    ─► terminate + teardown + CLI restart
//!   └─► sleep(poll_interval)          (stop token or signal ends the loop)
//! }
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                           |
//! |-------------------|--------------------------------------------------------------|----------------------------------------------|
//! | **Logging**       | Non-blocking ordered log pipeline with drain-then-kill.      | [`LoggingContext`], [`LogFacade`]            |
//! | **Supervision**   | Periodic liveness reconciliation and corrective actions.     | [`Supervisor`], [`DeadSet`]                  |
//! | **Seams**         | Swap registry, process table, CLI and teardown for tests.    | [`WorkerRegistry`], [`ProcessTable`], [`Lifecycle`], [`Teardown`] |
//! | **Subscriber API**| Hook into supervisor events (alerts, metrics).               | [`Subscribe`]                                |
//! | **Errors**        | Typed errors for the pipeline and the watchdog.              | [`LogError`], [`MonitorError`]               |
//! | **Configuration** | Centralized runtime settings, loadable from TOML.            | [`Config`]                                   |
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use profilevisor::{Config, LoggingContext, MemoryRegistry, Supervisor};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config::default();
//!     let ctx = LoggingContext::init(&cfg.log)?;
//!
//!     let sup = Supervisor::builder(cfg.monitor, ctx.facade())
//!         .with_registry(Arc::new(MemoryRegistry::new()))
//!         .build();
//!
//!     let token = CancellationToken::new();
//!     let cause = sup.run(token).await;
//!     println!("stopped: {cause}");
//!
//!     sup.close().await;
//!     ctx.shutdown().await;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod events;
mod logging;
mod monitor;
mod subscribers;

// ---- Public re-exports ----

pub use config::{Config, LogConfig, MonitorConfig};
pub use error::{LogError, MonitorError};
pub use events::{Bus, Event, EventKind};
pub use logging::{
    COMMAND_SECTION, DAEMON_DIR, DEBUG_LOG, EXCEPTION_LOG, HostSyslog, LogFacade, LogRecord,
    LoggingContext, NullSyslog, Severity, ShutdownReport, SyslogSink, TIMESTAMP_FORMAT,
    strip_colors, worker_log_path,
};
pub use monitor::{
    AUDIT_LOG, AuditEntry, AuditLogReader, CommandOutput, Correction, DeadSet, ExpectedState,
    JsonDirRegistry, Lifecycle, LivenessProber, MemoryRegistry, NoTeardown, Operation, PassReport,
    ProcTable, ProcessTable, StopCause, Supervisor, SupervisorBuilder, TEARDOWN_MARKER, Teardown,
    TeardownFn, WorkerDescriptor, WorkerRegistry, WorkerState, WorkerStatus, WorkloadCli, audit_path,
    category_of, is_consistent, stop_requested,
};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
