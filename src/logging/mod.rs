//! Ordered log pipeline: many producers, one consumer.
//!
//! ## Contents
//! - [`LoggingContext`] owner of the pipeline (`init` / `shutdown`)
//! - [`LogFacade`] producer handle, cloned into every component that logs
//! - [`LogRecord`], [`Severity`] the record data model
//! - [`SyslogSink`] host syslog side-channel
//!
//! ## Wiring
//! ```text
//! LogFacade (clone per producer)
//!     │ push (never blocks)
//!     ▼
//! RecordQueue (unbounded mpsc + depth counter)
//!     │
//!     ▼
//! LogManager (one tokio task) ──► debug.log / exception.log / daemon/<worker>.log
//!                              └─► SyslogSink
//! ```

mod context;
mod facade;
mod manager;
mod queue;
mod record;
mod severity;
mod syslog;

pub use context::{LoggingContext, ShutdownReport};
pub use facade::{COMMAND_SECTION, LogFacade};
pub use manager::{DAEMON_DIR, DEBUG_LOG, EXCEPTION_LOG, worker_log_path};
pub use record::{LogRecord, TIMESTAMP_FORMAT, strip_colors};
pub use severity::Severity;
pub use syslog::{HostSyslog, NullSyslog, SyslogSink};
