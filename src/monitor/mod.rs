//! Worker watchdog: liveness probing and corrective actions.
//!
//! The only entry point that drives anything is [`Supervisor`]; the other
//! types are its seams and their production adapters:
//! - [`registry`](WorkerRegistry): persisted per-worker state and status;
//! - [`audit`](AuditLogReader): the operator's last declared intent;
//! - [`prober`](LivenessProber): process table and log freshness checks;
//! - [`lifecycle`](Lifecycle): the external start/stop/restart CLI and teardown hooks;
//! - [`DeadSet`]: workers confirmed inactive during this run.

mod audit;
mod builder;
mod dead_set;
mod lifecycle;
mod prober;
mod registry;
mod shutdown;
mod supervisor;

pub use audit::{AUDIT_LOG, AuditEntry, AuditLogReader, ExpectedState, audit_path, category_of};
pub use builder::SupervisorBuilder;
pub use dead_set::DeadSet;
pub use lifecycle::{
    CommandOutput, Lifecycle, NoTeardown, Operation, Teardown, TeardownFn, WorkloadCli,
};
pub use prober::{LivenessProber, ProcTable, ProcessTable, TEARDOWN_MARKER};
pub use registry::{
    JsonDirRegistry, MemoryRegistry, WorkerDescriptor, WorkerRegistry, WorkerState, WorkerStatus,
};
pub use shutdown::{StopCause, stop_requested};
pub use supervisor::{Correction, PassReport, Supervisor, is_consistent};
