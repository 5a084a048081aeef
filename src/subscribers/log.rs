//! # Subscriber that mirrors supervisor events into the log pipeline.
//!
//! [`LogWriter`] turns every [`Event`] into one record on the [`LogFacade`] it
//! was built with. Failures and restarts go out at WARNING/INFO so they stand
//! out in `debug.log`; worker-specific events carry the worker name as identity.
//!
//! ## Output format
//! ```text
//! [pass-started] workers=4
//! [dead] worker=FM_01 reason="no daemon process"
//! [cleanup] worker=FM_01 expected=stop
//! [restart] worker=CMSYNC_02 exit_code=0
//! [restart-failed] worker=CMSYNC_02 exit_code=Some(2) reason="..."
//! [pass-completed] probed=3 newly_dead=1 ...
//! [shutdown-requested]
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::logging::{LogFacade, Severity};
use crate::subscribers::Subscribe;

/// Writes supervisor events into the log pipeline.
pub struct LogWriter {
    log: LogFacade,
}

impl LogWriter {
    pub fn new(log: LogFacade) -> Self {
        Self { log }
    }

    fn render(e: &Event) -> (Severity, String) {
        let worker = e.worker.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        let expected = e.expected.map(|x| x.as_str()).unwrap_or("-");

        match e.kind {
            EventKind::PassStarted => (Severity::Debug, format!("[pass-started] workers={reason}")),
            EventKind::PassCompleted => (Severity::Info, format!("[pass-completed] {reason}")),
            EventKind::WorkerSkipped => (
                Severity::Debug,
                format!("[skipped] worker={worker} reason={reason}"),
            ),
            EventKind::WorkerDead => (
                Severity::Warning,
                format!("[dead] worker={worker} reason={reason:?}"),
            ),
            EventKind::CorrectionSkipped => (
                Severity::Info,
                format!("[consistent] worker={worker} expected={expected}"),
            ),
            EventKind::CleanupPerformed => (
                Severity::Warning,
                format!("[cleanup] worker={worker} expected={expected}"),
            ),
            EventKind::RestartTriggered => (
                Severity::Warning,
                format!(
                    "[restart] worker={worker} exit_code={}",
                    e.exit_code.unwrap_or_default()
                ),
            ),
            EventKind::RestartFailed => (
                Severity::Error,
                format!(
                    "[restart-failed] worker={worker} exit_code={:?} reason={reason:?}",
                    e.exit_code
                ),
            ),
            EventKind::WorkerFailed => (
                Severity::Error,
                format!("[worker-failed] worker={worker} reason={reason:?}"),
            ),
            EventKind::ShutdownRequested => (Severity::Syslog, "[shutdown-requested]".to_string()),
            EventKind::SubscriberOverflow => (Severity::Warning, format!("[overflow] {reason}")),
            EventKind::SubscriberPanicked => (
                Severity::Error,
                format!("[subscriber-panicked] subscriber={worker} reason={reason:?}"),
            ),
        }
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let (severity, message) = Self::render(e);
        self.log.log(severity, message);
    }

    fn name(&self) -> &'static str {
        "log_writer"
    }
}
