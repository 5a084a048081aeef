//! # LogFacade: the producer-side logger.
//!
//! Every component that logs holds a clone of a [`LogFacade`]. Calls only build a
//! [`LogRecord`] and push it onto the queue: they never block beyond that push
//! and never return an error.
//!
//! ## Caller and identity
//! - `caller` is the source location of the call (`#[track_caller]`).
//! - `identity` is resolved per call, see [`record`](super::record) for the fallback order.
//!
//! ## Named sections
//! Multi-record calls ([`LogFacade::command_result`], [`LogFacade::exception`]) push all
//! of their records while holding the named section `"log-cmd"`, so two such calls
//! never interleave.
//!
//! ## Example
//! ```no_run
//! # async fn demo(ctx: &profilevisor::LoggingContext) {
//! let log = ctx.facade();
//! log.info("starting pass");
//! log.command_result("ls /tmp", 0, "a\nb");
//! log.with_identity("FM_01").warn("probe failed");
//! # }
//! ```

use std::collections::HashMap;
use std::panic::Location;
use std::sync::{Arc, Mutex, PoisonError};

use super::queue::QueueSender;
use super::record::{LogRecord, caller_of, resolve_identity};
use super::severity::Severity;

/// Name of the section shared by multi-record calls.
pub const COMMAND_SECTION: &str = "log-cmd";

/// Registry of named mutual-exclusion sections.
#[derive(Default, Debug)]
struct Sections {
    locks: Mutex<HashMap<&'static str, Arc<Mutex<()>>>>,
}

impl Sections {
    fn get(&self, name: &'static str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(name).or_default())
    }
}

/// Producer-side logger. Cheap to clone; safe to use from any thread or task.
#[derive(Clone, Debug)]
pub struct LogFacade {
    tx: QueueSender,
    identity: Option<Arc<str>>,
    process_label: Option<Arc<str>>,
    sections: Arc<Sections>,
}

impl LogFacade {
    pub(crate) fn new(tx: QueueSender, process_label: Option<String>) -> Self {
        Self {
            tx,
            identity: None,
            process_label: process_label.map(Into::into),
            sections: Arc::new(Sections::default()),
        }
    }

    /// Returns a facade whose records carry a fixed identity (e.g. a worker name).
    #[must_use]
    pub fn with_identity(&self, identity: impl Into<Arc<str>>) -> Self {
        Self {
            identity: Some(identity.into()),
            ..self.clone()
        }
    }

    /// True until the owning context starts shutting down.
    pub fn is_open(&self) -> bool {
        self.tx.is_open()
    }

    /// Enqueues a record of the given severity.
    #[track_caller]
    pub fn log(&self, severity: Severity, message: impl Into<String>) {
        let caller = caller_of(Location::caller());
        self.tx
            .push(LogRecord::new(severity, message, caller, self.identity()));
    }

    #[track_caller]
    pub fn debug(&self, message: impl Into<String>) {
        self.log(Severity::Debug, message);
    }

    #[track_caller]
    pub fn info(&self, message: impl Into<String>) {
        self.log(Severity::Info, message);
    }

    #[track_caller]
    pub fn warn(&self, message: impl Into<String>) {
        self.log(Severity::Warning, message);
    }

    #[track_caller]
    pub fn error(&self, message: impl Into<String>) {
        self.log(Severity::Error, message);
    }

    /// Written to `debug.log` and mirrored to the host syslog.
    #[track_caller]
    pub fn syslog(&self, message: impl Into<String>) {
        self.log(Severity::Syslog, message);
    }

    /// Enqueues a WORKLOAD record routed to `worker`'s own log file.
    ///
    /// `level` is the worker-side severity label (`INFO`, `WARNING`, `ERROR`).
    #[track_caller]
    pub fn workload(&self, worker: &str, level: &str, message: &str) {
        let caller = caller_of(Location::caller());
        self.tx.push(LogRecord::new(
            Severity::Workload,
            format!("{level} {message}"),
            caller,
            worker,
        ));
    }

    /// Enqueues each line as EXCEPTION and as DEBUG, inside the command section.
    #[track_caller]
    pub fn exception<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let caller = caller_of(Location::caller());
        let identity = self.identity();
        let section = self.sections.get(COMMAND_SECTION);
        let _guard = section.lock().unwrap_or_else(PoisonError::into_inner);

        for line in lines {
            let line = line.as_ref();
            self.tx.push(LogRecord::new(
                Severity::Exception,
                line,
                caller.clone(),
                identity.clone(),
            ));
            self.tx.push(LogRecord::new(
                Severity::Debug,
                line,
                caller.clone(),
                identity.clone(),
            ));
        }
    }

    /// Logs the outcome of an external command, one record per output line.
    ///
    /// ```text
    /// <description>
    ///   Command return code: <rc>
    ///   Command produced no output          (empty output)
    ///   Command output: <line>              (single line)
    ///   Command output:                     (several lines)
    ///     <line 1>
    ///     <line n>
    /// ```
    #[track_caller]
    pub fn command_result(&self, description: &str, return_code: i32, output: &str) {
        let caller = caller_of(Location::caller());
        let identity = self.identity();
        let section = self.sections.get(COMMAND_SECTION);
        let _guard = section.lock().unwrap_or_else(PoisonError::into_inner);

        for message in command_lines(description, return_code, output) {
            self.tx.push(LogRecord::new(
                Severity::Debug,
                message,
                caller.clone(),
                identity.clone(),
            ));
        }
    }

    fn identity(&self) -> String {
        resolve_identity(self.identity.as_deref(), self.process_label.as_deref())
    }
}

/// Expands a command outcome into record messages.
fn command_lines(description: &str, return_code: i32, output: &str) -> Vec<String> {
    let mut out = vec![
        description.to_string(),
        format!("  Command return code: {return_code}"),
    ];

    let lines: Vec<&str> = output.trim().split('\n').collect();
    match lines.as_slice() {
        [] => out.push("  Command produced no output".to_string()),
        [only] if only.trim().is_empty() => {
            out.push("  Command produced no output".to_string());
        }
        [only] => out.push(format!("  Command output: {only}")),
        many => {
            out.push("  Command output: ".to_string());
            out.extend(many.iter().map(|line| format!("    {}", line.trim())));
        }
    }
    out
}
