//! # Event subscribers for the supervisor loop.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and the built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//! Supervisor ── publish(Event) ──► Bus ──► listener ──► SubscriberSet::emit
//!                                                          │
//!                                              ┌───────────┼──────────┐
//!                                              ▼           ▼          ▼
//!                                          LogWriter    Alerts     Custom
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use profilevisor::{Event, EventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct RestartCounter;
//!
//! #[async_trait]
//! impl Subscribe for RestartCounter {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::RestartTriggered {
//!             // increment counter
//!         }
//!     }
//!     fn name(&self) -> &'static str { "restart_counter" }
//! }
//! ```

mod log;
mod set;
mod subscribe;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub(crate) use set::panic_message;
pub use subscribe::Subscribe;
