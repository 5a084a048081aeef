//! # Log records and their formatting helpers.
//!
//! A [`LogRecord`] is created by a producer, travels through the
//! [`RecordQueue`](super::queue::RecordQueue) and is consumed exactly once by the
//! [`LogManager`](super::manager::LogManager). It is immutable after enqueue.
//!
//! ## Identity resolution
//! Ordered fallbacks, first hit wins:
//! ```text
//! explicit identity (LogFacade::with_identity)
//!   └─► non-main thread name      → "(thread ID <name>)"
//!         └─► process label       → "(process ID <label> [PID <pid>])"
//!               └─► bare pid      → "(PID <pid>)"
//! ```

use std::panic::Location;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;

use super::severity::Severity;

/// Timestamp layout shared by every log line: `YYYY-MM-DD HH:MM:SS,mmm`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// ANSI SGR sequences (colors, underline, reset).
static ANSI_SGR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());

/// A single log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub severity: Severity,
    pub message: String,
    /// Source location of the producing call (`file:line`).
    pub caller: String,
    /// Thread/process tag of the producer, or the worker name for `Workload`.
    pub identity: String,
}

impl LogRecord {
    /// Creates a record from its parts.
    pub fn new(
        severity: Severity,
        message: impl Into<String>,
        caller: impl Into<String>,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            message: message.into(),
            caller: caller.into(),
            identity: identity.into(),
        }
    }

    /// Renders the record as one line (no trailing newline).
    ///
    /// Layout: `<timestamp> <SEVERITY:<7> <message> <identity>`; colors are stripped
    /// and trailing whitespace of the message is trimmed.
    pub fn format_line(&self, at: NaiveDateTime) -> String {
        let message = strip_colors(&self.message);
        let message = message.trim_end();
        let ts = at.format(TIMESTAMP_FORMAT);
        if self.identity.is_empty() {
            format!("{ts} {:<7} {message}", self.severity)
        } else {
            format!("{ts} {:<7} {message} {}", self.severity, self.identity)
        }
    }
}

/// Removes ANSI color and underline escape sequences.
///
/// Idempotent: `strip_colors(&strip_colors(m)) == strip_colors(m)`.
pub fn strip_colors(message: &str) -> String {
    ANSI_SGR.replace_all(message, "").into_owned()
}

/// Formats a call-site location as `file:line`.
#[inline]
pub fn caller_of(location: &Location<'_>) -> String {
    format!("{}:{}", location.file(), location.line())
}

/// Resolves the identity tag of the current producer.
pub fn resolve_identity(explicit: Option<&str>, process_label: Option<&str>) -> String {
    explicit
        .map(str::to_owned)
        .or_else(thread_tag)
        .or_else(|| process_label.map(process_tag))
        .unwrap_or_else(pid_tag)
}

fn thread_tag() -> Option<String> {
    let current = std::thread::current();
    current
        .name()
        .filter(|name| *name != "main")
        .map(|name| format!("(thread ID {name})"))
}

fn process_tag(label: &str) -> String {
    format!("(process ID {label} [PID {}])", std::process::id())
}

fn pid_tag() -> String {
    format!("(PID {})", std::process::id())
}
