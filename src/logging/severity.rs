//! # Record severities.
//!
//! A closed set: the pipeline never learns new severities at runtime.

use std::fmt;

/// Severity of a [`LogRecord`](crate::logging::LogRecord).
///
/// Besides the usual levels there are three routing severities:
/// - `Syslog`: written to `debug.log` **and** mirrored to the host syslog;
/// - `Workload`: written to the worker's own log file;
/// - `Exception`: written to `exception.log` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Syslog,
    Workload,
    Exception,
}

impl Severity {
    /// Upper-case label written into log lines.
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Syslog => "SYSLOG",
            Severity::Workload => "WORKLOAD",
            Severity::Exception => "EXCEPTION",
        }
    }

    /// True for severities that also go to the host syslog.
    #[inline]
    pub fn mirrors_to_syslog(self) -> bool {
        matches!(self, Severity::Syslog)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `pad` keeps width/alignment flags working (`{:<7}`).
        f.pad(self.as_str())
    }
}
