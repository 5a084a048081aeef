//! # Ordered record queue: many producers, one consumer.
//!
//! Thin wrapper around [`tokio::sync::mpsc::unbounded_channel`] that also tracks
//! the number of records not yet dequeued, so shutdown can wait for "empty".
//!
//! ## Architecture
//! ```text
//! Producers (many):                        Consumer (one):
//!   thread 1 ──┐
//!   task 2   ──┼──► QueueSender ──► [unbounded mpsc] ──► QueueReceiver ──► LogManager
//!   thread N ──┘        │                                     │
//!                       └──── depth += 1        depth -= 1 ───┘
//!                                              (notify when 0)
//! ```
//!
//! ## Rules
//! - **Non-blocking push**: `push()` never waits and never reports failure.
//! - **Per-producer FIFO**: records of one producer arrive in enqueue order.
//! - **No total order** across producers.
//! - **Closed gate**: once closed, pushes are dropped silently.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, mpsc};

use super::record::LogRecord;

/// Shared counters between both ends of the queue.
#[derive(Debug, Default)]
struct Depth {
    /// Records pushed but not yet dequeued.
    pending: AtomicUsize,
    /// False once the application gate is closed.
    open: AtomicBool,
    /// Signalled every time `pending` drops to zero.
    empty: Notify,
}

/// Producer side of the queue. Cheap to clone.
#[derive(Clone, Debug)]
pub struct QueueSender {
    tx: mpsc::UnboundedSender<LogRecord>,
    depth: Arc<Depth>,
}

/// Consumer side of the queue. Exactly one exists per queue.
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::UnboundedReceiver<LogRecord>,
    depth: Arc<Depth>,
}

/// Constructor namespace for a queue pair.
pub struct RecordQueue;

impl RecordQueue {
    /// Creates a connected sender/receiver pair with the gate open.
    pub fn channel() -> (QueueSender, QueueReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(Depth {
            open: AtomicBool::new(true),
            ..Depth::default()
        });
        (
            QueueSender {
                tx,
                depth: Arc::clone(&depth),
            },
            QueueReceiver { rx, depth },
        )
    }
}

impl QueueSender {
    /// Pushes a record; dropped silently if the gate is closed or the consumer is gone.
    pub fn push(&self, record: LogRecord) {
        if !self.depth.open.load(Ordering::Acquire) {
            return;
        }
        self.push_unchecked(record);
    }

    /// Pushes a record regardless of the gate (used for the final shutdown record).
    pub(crate) fn push_unchecked(&self, record: LogRecord) {
        self.depth.pending.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(record).is_err() {
            self.release();
        }
    }

    /// Closes the application gate; later `push()` calls are no-ops.
    pub fn close(&self) {
        self.depth.open.store(false, Ordering::Release);
    }

    /// True while the gate is open.
    pub fn is_open(&self) -> bool {
        self.depth.open.load(Ordering::Acquire)
    }

    /// Number of records pushed but not yet dequeued.
    pub fn pending(&self) -> usize {
        self.depth.pending.load(Ordering::Acquire)
    }

    /// True if no record is waiting to be dequeued.
    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }

    /// Waits until the queue reports empty, at most `limit`.
    ///
    /// Returns `true` if empty was observed, `false` on timeout.
    pub async fn wait_empty(&self, limit: Duration) -> bool {
        let depth = Arc::clone(&self.depth);
        let wait = async move {
            loop {
                let notified = depth.empty.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if depth.pending.load(Ordering::Acquire) == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(limit, wait).await.is_ok()
    }

    fn release(&self) {
        if self.depth.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.depth.empty.notify_waiters();
        }
    }
}

impl QueueReceiver {
    /// Receives the next record; `None` once every sender is dropped.
    ///
    /// The record counts as dequeued as soon as it is returned.
    pub async fn recv(&mut self) -> Option<LogRecord> {
        let record = self.rx.recv().await?;
        if self.depth.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.depth.empty.notify_waiters();
        }
        Some(record)
    }
}
