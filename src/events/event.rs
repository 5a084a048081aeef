//! # Events emitted by the supervisor loop.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Pass events**: start and end of one reconciliation pass
//! - **Worker events**: what the pass decided for one worker
//! - **Runtime events**: shutdown and subscriber health
//!
//! The [`Event`] struct carries additional metadata such as timestamps, worker
//! name, reasons, CLI exit codes and the expected state read from the audit log.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use profilevisor::{Event, EventKind, ExpectedState};
//!
//! let ev = Event::new(EventKind::RestartFailed)
//!     .with_worker("FM_01")
//!     .with_reason("connection refused")
//!     .with_exit_code(2)
//!     .with_expected(ExpectedState::Restart);
//!
//! assert_eq!(ev.kind, EventKind::RestartFailed);
//! assert_eq!(ev.worker.as_deref(), Some("FM_01"));
//! assert_eq!(ev.exit_code, Some(2));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::monitor::ExpectedState;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of supervisor events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `worker`: subscriber name
    /// - `reason`: panic message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `worker`: subscriber name
    /// - `reason`: `subscriber=<name> reason=<full|closed>`
    SubscriberOverflow,

    // === Runtime events ===
    /// Shutdown requested (OS signal observed or token cancelled).
    ShutdownRequested,

    // === Pass events ===
    /// A reconciliation pass is starting.
    ///
    /// Sets:
    /// - `reason`: number of registered workers
    PassStarted,

    /// A reconciliation pass finished.
    ///
    /// Sets:
    /// - `reason`: compact pass summary
    PassCompleted,

    // === Worker events ===
    /// Worker was not probed (completed, excluded, or already in the DeadSet).
    ///
    /// Sets:
    /// - `worker`: worker name
    /// - `reason`: `completed`, `excluded` or `dead_set`
    WorkerSkipped,

    /// Worker was added to the DeadSet during this pass.
    ///
    /// Sets:
    /// - `worker`: worker name
    /// - `reason`: which probe failed
    WorkerDead,

    /// Registry state already matches the expected state; nothing was done.
    ///
    /// Sets:
    /// - `worker`: worker name
    /// - `expected`: expected state from the audit log
    CorrectionSkipped,

    /// Worker process was terminated and torn down.
    ///
    /// Sets:
    /// - `worker`: worker name
    /// - `expected`: expected state from the audit log
    CleanupPerformed,

    /// Lifecycle CLI restart finished with exit code zero.
    ///
    /// Sets:
    /// - `worker`: worker name
    /// - `exit_code`: CLI exit code
    /// - `expected`: expected state from the audit log
    RestartTriggered,

    /// Lifecycle CLI restart could not be spawned or exited non-zero.
    ///
    /// Sets:
    /// - `worker`: worker name
    /// - `exit_code`: CLI exit code (absent if spawning failed)
    /// - `reason`: error or CLI output
    RestartFailed,

    /// Reconciliation of one worker failed (error or panic); the pass continued.
    ///
    /// Sets:
    /// - `worker`: worker name
    /// - `reason`: error label/message or panic message
    WorkerFailed,
}

/// Supervisor event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Worker (or subscriber) name, if applicable.
    pub worker: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Exit code of the lifecycle CLI.
    pub exit_code: Option<i32>,
    /// Expected state read from the audit log.
    pub expected: Option<ExpectedState>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            worker: None,
            reason: None,
            exit_code: None,
            expected: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a worker name.
    #[inline]
    pub fn with_worker(mut self, worker: impl Into<Arc<str>>) -> Self {
        self.worker = Some(worker.into());
        self
    }

    /// Attaches a CLI exit code.
    #[inline]
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Attaches the expected state.
    #[inline]
    pub fn with_expected(mut self, expected: ExpectedState) -> Self {
        self.expected = Some(expected);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_worker(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_worker(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}
