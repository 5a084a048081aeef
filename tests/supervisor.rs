use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, TimeDelta};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use profilevisor::{
    AUDIT_LOG, AuditLogReader, CommandOutput, Correction, DEBUG_LOG, Event, EventKind,
    ExpectedState, Lifecycle, LogConfig, LogWriter, LoggingContext, MemoryRegistry, MonitorConfig,
    MonitorError, Operation, PassReport, ProcessTable, StopCause, Subscribe, Supervisor, Teardown,
    WorkerDescriptor, WorkerRegistry, WorkerState, WorkerStatus, worker_log_path,
};

#[derive(Default)]
struct FakeTable {
    pids: Mutex<HashMap<String, u32>>,
    queries: Mutex<Vec<String>>,
    killed: Mutex<Vec<u32>>,
}

impl FakeTable {
    fn with(pids: &[(&str, u32)]) -> Arc<Self> {
        let table = Self::default();
        for (name, pid) in pids {
            table.pids.lock().unwrap().insert(name.to_string(), *pid);
        }
        Arc::new(table)
    }

    fn queries_for(&self, name: &str) -> usize {
        self.queries.lock().unwrap().iter().filter(|n| *n == name).count()
    }
}

#[async_trait]
impl ProcessTable for FakeTable {
    async fn daemon_pid(&self, name: &str) -> Option<u32> {
        self.queries.lock().unwrap().push(name.to_string());
        self.pids.lock().unwrap().get(name).copied()
    }

    async fn terminate(&self, pid: u32) -> std::io::Result<()> {
        self.killed.lock().unwrap().push(pid);
        self.pids.lock().unwrap().retain(|_, p| *p != pid);
        Ok(())
    }
}

struct RecordingCli {
    calls: Mutex<Vec<(Operation, String)>>,
    output: CommandOutput,
}

impl RecordingCli {
    fn returning(exit_code: i32, stdout: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            output: CommandOutput {
                exit_code,
                stdout: stdout.to_string(),
            },
        })
    }

    fn calls(&self) -> Vec<(Operation, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Lifecycle for RecordingCli {
    async fn run(&self, operation: Operation, name: &str) -> Result<CommandOutput, MonitorError> {
        self.calls.lock().unwrap().push((operation, name.to_string()));
        Ok(self.output.clone())
    }
}

/// CLI whose restarts take a while.
struct SlowCli {
    delay: Duration,
    began: AtomicUsize,
    finished: AtomicUsize,
}

impl SlowCli {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            began: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Lifecycle for SlowCli {
    async fn run(&self, _operation: Operation, _name: &str) -> Result<CommandOutput, MonitorError> {
        self.began.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(CommandOutput {
            exit_code: 0,
            stdout: String::new(),
        })
    }
}

#[derive(Default)]
struct RecordingTeardown {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl Teardown for RecordingTeardown {
    async fn teardown(&self, descriptor: &WorkerDescriptor) -> Result<(), String> {
        self.seen.lock().unwrap().push(descriptor.name.clone());
        Err("target already gone".to_string())
    }
}

/// Registry whose `get` fails for one worker.
struct FlakyRegistry {
    inner: MemoryRegistry,
    broken: &'static str,
}

#[async_trait]
impl WorkerRegistry for FlakyRegistry {
    async fn get(&self, name: &str) -> Result<Option<WorkerDescriptor>, MonitorError> {
        if name == self.broken {
            return Err(MonitorError::Registry {
                key: name.to_string(),
                reason: "connection reset".to_string(),
            });
        }
        self.inner.get(name).await
    }

    async fn list(&self) -> Result<Vec<String>, MonitorError> {
        self.inner.list().await
    }

    async fn set(&self, descriptor: WorkerDescriptor) -> Result<(), MonitorError> {
        self.inner.set(descriptor).await
    }

    async fn remove(&self, name: &str) -> Result<(), MonitorError> {
        self.inner.remove(name).await
    }
}

/// Registry that answers the first `get` per worker with `first`, later ones with `later`.
struct ShiftingRegistry {
    first: WorkerDescriptor,
    later: WorkerDescriptor,
    gets: AtomicUsize,
}

#[async_trait]
impl WorkerRegistry for ShiftingRegistry {
    async fn get(&self, name: &str) -> Result<Option<WorkerDescriptor>, MonitorError> {
        if name != self.first.name {
            return Ok(None);
        }
        Ok(Some(if self.gets.fetch_add(1, Ordering::SeqCst) == 0 {
            self.first.clone()
        } else {
            self.later.clone()
        }))
    }

    async fn list(&self) -> Result<Vec<String>, MonitorError> {
        Ok(vec![self.first.name.clone()])
    }

    async fn set(&self, _descriptor: WorkerDescriptor) -> Result<(), MonitorError> {
        Ok(())
    }

    async fn remove(&self, _name: &str) -> Result<(), MonitorError> {
        Ok(())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    ctx: LoggingContext,
    cfg: MonitorConfig,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let ctx = LoggingContext::init(&LogConfig {
            log_dir: logs.clone(),
            process_label: Some("monitor".into()),
            drain_timeout: Duration::from_secs(5),
            grace: Duration::from_millis(20),
            syslog: false,
        })
        .unwrap();

        let cfg = MonitorConfig {
            poll_interval: Duration::from_millis(10),
            staleness: Duration::from_secs(30),
            log_dir: logs,
            audit_dir: dir.path().join("audit"),
            registry_dir: dir.path().join("registry"),
            ..MonitorConfig::default()
        };
        std::fs::create_dir_all(&cfg.audit_dir).unwrap();
        Self {
            _dir: dir,
            ctx,
            cfg,
        }
    }

    fn worker_log(&self, name: &str, ago: TimeDelta) {
        let path = worker_log_path(&self.cfg.log_dir, name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let body = format!(
            "{} - INFO - iteration started\n{} - INFO - iteration finished\n",
            stamp(ago + TimeDelta::seconds(5)),
            stamp(ago)
        );
        std::fs::write(path, body).unwrap();
    }

    fn audit(&self, lines: &[String]) {
        let mut body = lines.join("\n");
        body.push('\n');
        std::fs::write(self.cfg.audit_dir.join(AUDIT_LOG), body).unwrap();
    }

    fn debug_log(&self) -> PathBuf {
        self.cfg.log_dir.join(DEBUG_LOG)
    }
}

fn stamp(ago: TimeDelta) -> String {
    (Local::now().naive_local() - ago)
        .format("%Y-%m-%d %H:%M:%S,000")
        .to_string()
}

fn audit_line(ago: TimeDelta, verb: &str, targets: &str) -> String {
    format!(
        "{} - INFO - {verb} profiles::\t[{targets}].\tMessage supplied with operation::\t[]",
        stamp(ago)
    )
}

fn drain_kinds(rx: &mut broadcast::Receiver<Event>) -> Vec<(EventKind, Option<String>)> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push((ev.kind, ev.worker.as_deref().map(str::to_string)));
    }
    out
}

fn running(name: &str) -> WorkerDescriptor {
    WorkerDescriptor::new(name, WorkerState::Running, WorkerStatus::Ok)
}

#[tokio::test]
async fn test_stopped_worker_is_cleaned_up_not_restarted() {
    let h = Harness::new();
    h.worker_log("W1", TimeDelta::minutes(10));
    h.audit(&[audit_line(TimeDelta::minutes(5), "Stopping", "w1")]);

    let registry = Arc::new(MemoryRegistry::new());
    registry.set(running("W1").with_pid(4000)).await.unwrap();
    let table = FakeTable::with(&[]);
    let cli = RecordingCli::returning(0, "");
    let teardown = Arc::new(RecordingTeardown::default());

    let sup = Supervisor::builder(h.cfg.clone(), h.ctx.facade())
        .with_registry(registry)
        .with_process_table(table.clone())
        .with_lifecycle(cli.clone())
        .with_teardown(teardown.clone())
        .with_subscribers(Vec::new())
        .build();
    let mut rx = sup.subscribe();

    let report = sup.run_pass().await;
    assert_eq!(report.newly_dead, 1);
    assert_eq!(report.cleaned_up, 1);
    assert_eq!(report.restarted, 0);
    assert!(cli.calls().is_empty());
    assert_eq!(*teardown.seen.lock().unwrap(), ["W1"]);
    // recorded pid is never signalled without a process-table match
    assert!(table.killed.lock().unwrap().is_empty());
    assert!(sup.dead_set().await.contains("W1"));

    let kinds = drain_kinds(&mut rx);
    assert!(kinds.contains(&(EventKind::WorkerDead, Some("W1".into()))));
    assert!(kinds.contains(&(EventKind::CleanupPerformed, Some("W1".into()))));
    assert!(!kinds.iter().any(|(k, _)| *k == EventKind::RestartTriggered));

    sup.close().await;
    let debug_log = h.debug_log();
    h.ctx.shutdown().await;
    let debug = std::fs::read_to_string(debug_log).unwrap();
    assert!(debug.contains("Cleanup actions complete"));
    assert!(debug.contains("Teardown of worker W1 failed: target already gone"));
}

#[tokio::test]
async fn test_restart_intent_triggers_cli_restart() {
    let h = Harness::new();
    h.worker_log("W2", TimeDelta::minutes(10));
    h.audit(&[
        audit_line(TimeDelta::hours(2), "Stopping", "all"),
        audit_line(TimeDelta::minutes(1), "Restarting", "W2"),
    ]);

    let registry = Arc::new(MemoryRegistry::new());
    registry.set(running("W2")).await.unwrap();
    let table = FakeTable::with(&[]);
    let cli = RecordingCli::returning(0, "restart requested");

    let sup = Supervisor::builder(h.cfg.clone(), h.ctx.facade())
        .with_registry(registry)
        .with_process_table(table.clone())
        .with_lifecycle(cli.clone())
        .with_subscribers(Vec::new())
        .build();
    let mut rx = sup.subscribe();

    let report = sup.run_pass().await;
    assert_eq!(report.restarted, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(cli.calls(), [(Operation::Restart, "W2".to_string())]);
    assert!(table.killed.lock().unwrap().is_empty());
    assert!(!sup.dead_set().await.contains("W2"));

    let restart = std::iter::from_fn(|| rx.try_recv().ok())
        .find(|ev| ev.kind == EventKind::RestartTriggered)
        .unwrap();
    assert_eq!(restart.exit_code, Some(0));
    assert_eq!(restart.expected, Some(ExpectedState::Restart));

    sup.close().await;
    let debug_log = h.debug_log();
    h.ctx.shutdown().await;
    let debug = std::fs::read_to_string(debug_log).unwrap();
    assert!(debug.contains("Automatic restart of worker W2"));
    assert!(debug.contains("Command return code: 0"));
    assert!(debug.contains("Command output: restart requested"));
}

#[tokio::test]
async fn test_dead_worker_is_not_probed_again() {
    let h = Harness::new();
    h.worker_log("W1", TimeDelta::minutes(10));
    h.audit(&[audit_line(TimeDelta::minutes(5), "Stopping", "W1")]);

    let registry = Arc::new(MemoryRegistry::new());
    registry.set(running("W1")).await.unwrap();
    let table = FakeTable::with(&[]);

    let sup = Supervisor::builder(h.cfg.clone(), h.ctx.facade())
        .with_registry(registry)
        .with_process_table(table.clone())
        .with_lifecycle(RecordingCli::returning(0, ""))
        .with_subscribers(Vec::new())
        .build();

    sup.run_pass().await;
    let after_first = table.queries_for("W1");
    assert!(after_first >= 1);

    for _ in 0..3 {
        let report = sup.run_pass().await;
        assert_eq!(report.skipped, 1);
        assert_eq!(report.newly_dead, 0);
    }
    assert_eq!(table.queries_for("W1"), after_first);

    sup.close().await;
    h.ctx.shutdown().await;
}

#[tokio::test]
async fn test_live_worker_is_never_declared_dead() {
    let h = Harness::new();
    h.worker_log("LIVE_01", TimeDelta::seconds(5));
    // stale log, but between iterations
    h.worker_log("NAP_01", TimeDelta::minutes(30));

    let registry = Arc::new(MemoryRegistry::new());
    registry.set(running("LIVE_01")).await.unwrap();
    registry
        .set(WorkerDescriptor::new("NAP_01", WorkerState::Sleeping, WorkerStatus::Ok))
        .await
        .unwrap();
    let cli = RecordingCli::returning(0, "");

    let sup = Supervisor::builder(h.cfg.clone(), h.ctx.facade())
        .with_registry(registry)
        .with_process_table(FakeTable::with(&[("LIVE_01", 10), ("NAP_01", 11)]))
        .with_lifecycle(cli.clone())
        .with_subscribers(Vec::new())
        .build();

    for _ in 0..3 {
        let report = sup.run_pass().await;
        assert_eq!(
            report,
            PassReport {
                probed: 2,
                ..PassReport::default()
            }
        );
    }
    assert!(sup.dead_set().await.is_empty());
    assert!(cli.calls().is_empty());

    sup.close().await;
    h.ctx.shutdown().await;
}

#[tokio::test]
async fn test_miss_threshold_delays_declaration() {
    let h = Harness::new();
    let registry = Arc::new(MemoryRegistry::new());
    registry.set(running("FM_01")).await.unwrap();
    let cli = RecordingCli::returning(0, "");

    let cfg = MonitorConfig {
        required_misses: 2,
        ..h.cfg.clone()
    };
    let sup = Supervisor::builder(cfg, h.ctx.facade())
        .with_registry(registry)
        .with_process_table(FakeTable::with(&[]))
        .with_lifecycle(cli.clone())
        .with_subscribers(Vec::new())
        .build();

    let first = sup.run_pass().await;
    assert_eq!(first.newly_dead, 0);
    assert!(cli.calls().is_empty());

    // no audit line at all: restart
    let second = sup.run_pass().await;
    assert_eq!(second.newly_dead, 1);
    assert_eq!(second.restarted, 1);
    assert_eq!(cli.calls(), [(Operation::Restart, "FM_01".to_string())]);

    sup.close().await;
    h.ctx.shutdown().await;
}

#[tokio::test]
async fn test_completed_excluded_and_consistent_workers_are_left_alone() {
    let h = Harness::new();
    let registry = Arc::new(MemoryRegistry::new());
    registry
        .set(WorkerDescriptor::new("DONE_01", WorkerState::Completed, WorkerStatus::Warning))
        .await
        .unwrap();
    registry.set(running("CBRS_SETUP")).await.unwrap();
    registry
        .set(WorkerDescriptor::new("BOOT_01", WorkerState::Starting, WorkerStatus::Ok))
        .await
        .unwrap();
    let table = FakeTable::with(&[]);
    let cli = RecordingCli::returning(0, "");

    let sup = Supervisor::builder(h.cfg.clone(), h.ctx.facade())
        .with_registry(registry)
        .with_process_table(table.clone())
        .with_lifecycle(cli.clone())
        .with_subscribers(Vec::new())
        .build();

    let report = sup.run_pass().await;
    assert_eq!(report.skipped, 2);
    assert_eq!(report.newly_dead, 1);
    assert_eq!(report.consistent, 1);
    assert!(cli.calls().is_empty());
    assert_eq!(table.queries_for("CBRS_SETUP"), 0);
    assert_eq!(table.queries_for("DONE_01"), 0);

    sup.close().await;
    h.ctx.shutdown().await;
}

#[tokio::test]
async fn test_failed_restart_releases_worker_and_counts_failure() {
    let h = Harness::new();
    let registry = Arc::new(MemoryRegistry::new());
    registry
        .set(WorkerDescriptor::new("FM_02", WorkerState::Running, WorkerStatus::Dead))
        .await
        .unwrap();
    let cli = RecordingCli::returning(3, "target unreachable");
    let table = FakeTable::with(&[("FM_02", 77)]);

    let sup = Supervisor::builder(h.cfg.clone(), h.ctx.facade())
        .with_registry(registry)
        .with_process_table(table.clone())
        .with_lifecycle(cli.clone())
        .with_subscribers(Vec::new())
        .build();
    let mut rx = sup.subscribe();

    let report = sup.run_pass().await;
    assert_eq!(report.newly_dead, 1);
    assert_eq!(report.probed, 0);
    assert_eq!(report.failed, 1);
    assert_eq!(*table.killed.lock().unwrap(), [77]);
    assert!(!sup.dead_set().await.contains("FM_02"));
    assert!(drain_kinds(&mut rx).contains(&(EventKind::RestartFailed, Some("FM_02".into()))));

    // unsupported operation output is benign
    let benign = RecordingCli::returning(2, "operation unsupported for this profile");
    let sup2 = Supervisor::builder(h.cfg.clone(), h.ctx.facade())
        .with_registry({
            let r = Arc::new(MemoryRegistry::new());
            r.set(WorkerDescriptor::new("FM_03", WorkerState::Running, WorkerStatus::Dead))
                .await
                .unwrap();
            r
        })
        .with_process_table(FakeTable::with(&[]))
        .with_lifecycle(benign)
        .with_subscribers(Vec::new())
        .build();
    assert_eq!(sup2.run_pass().await.restarted, 1);

    sup.close().await;
    sup2.close().await;
    h.ctx.shutdown().await;
}

#[tokio::test]
async fn test_one_failing_worker_does_not_abort_the_pass() {
    let h = Harness::new();
    h.worker_log("OK_01", TimeDelta::seconds(1));
    let inner = MemoryRegistry::new();
    inner.set(running("BAD_01")).await.unwrap();
    inner.set(running("OK_01")).await.unwrap();

    let sup = Supervisor::builder(h.cfg.clone(), h.ctx.facade())
        .with_registry(Arc::new(FlakyRegistry {
            inner,
            broken: "BAD_01",
        }))
        .with_process_table(FakeTable::with(&[("OK_01", 5)]))
        .with_lifecycle(RecordingCli::returning(0, ""))
        .with_subscribers(Vec::new())
        .build();
    let mut rx = sup.subscribe();

    let report = sup.run_pass().await;
    assert_eq!(report.failed, 1);
    assert_eq!(report.probed, 1);
    assert!(drain_kinds(&mut rx).contains(&(EventKind::WorkerFailed, Some("BAD_01".into()))));

    sup.close().await;
    h.ctx.shutdown().await;
}

#[tokio::test]
async fn test_run_stops_on_cancellation() {
    let h = Harness::new();
    let writer: Arc<dyn Subscribe> = Arc::new(LogWriter::new(h.ctx.facade()));
    let sup = Supervisor::builder(h.cfg.clone(), h.ctx.facade())
        .with_registry(Arc::new(MemoryRegistry::new()))
        .with_process_table(FakeTable::with(&[]))
        .with_lifecycle(RecordingCli::returning(0, ""))
        .with_subscribers(vec![writer])
        .build();
    let mut rx = sup.subscribe();

    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let cause = tokio::time::timeout(Duration::from_secs(5), sup.run(token))
        .await
        .unwrap();
    assert_eq!(cause, StopCause::Cancelled);

    let kinds = drain_kinds(&mut rx);
    assert!(kinds.iter().any(|(k, _)| *k == EventKind::PassCompleted));
    assert_eq!(kinds.last().map(|(k, _)| *k), Some(EventKind::ShutdownRequested));

    sup.close().await;
    let debug_log = h.debug_log();
    h.ctx.shutdown().await;
    let debug = std::fs::read_to_string(debug_log).unwrap();
    assert!(debug.contains("Profile monitor stopping (cancelled)"));
    // rendered by the LogWriter subscriber
    assert!(debug.contains("[shutdown-requested]"));
    assert!(debug.contains("[pass-completed] probed=0"));
}

#[tokio::test]
async fn test_stop_waits_for_restart_in_progress() {
    let h = Harness::new();
    let registry = Arc::new(MemoryRegistry::new());
    for name in ["FM_01", "FM_02"] {
        registry
            .set(WorkerDescriptor::new(name, WorkerState::Running, WorkerStatus::Dead))
            .await
            .unwrap();
    }
    let cli = SlowCli::new(Duration::from_millis(300));

    let sup = Supervisor::builder(h.cfg.clone(), h.ctx.facade())
        .with_registry(registry)
        .with_process_table(FakeTable::with(&[]))
        .with_lifecycle(cli.clone())
        .build();
    let mut rx = sup.subscribe();

    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let cause = tokio::time::timeout(Duration::from_secs(5), sup.run(token))
        .await
        .unwrap();
    assert_eq!(cause, StopCause::Cancelled);
    assert_eq!(cli.began.load(Ordering::SeqCst), 1);
    assert_eq!(cli.finished.load(Ordering::SeqCst), 1);

    let kinds = drain_kinds(&mut rx);
    assert!(kinds.contains(&(EventKind::RestartTriggered, Some("FM_01".into()))));
    assert!(!kinds.iter().any(|(_, w)| w.as_deref() == Some("FM_02")));
    assert!(!sup.dead_set().await.contains("FM_01"));

    sup.close().await;
    h.ctx.shutdown().await;
}

#[tokio::test]
async fn test_registry_change_during_confirmation_is_left_alone() {
    for later in [
        WorkerDescriptor::new("FM_01", WorkerState::Stopping, WorkerStatus::Ok),
        WorkerDescriptor::new("FM_01", WorkerState::Completed, WorkerStatus::Ok),
    ] {
        let h = Harness::new();
        let registry = Arc::new(ShiftingRegistry {
            first: running("FM_01"),
            later,
            gets: AtomicUsize::new(0),
        });
        let table = FakeTable::with(&[]);
        let cli = RecordingCli::returning(0, "");
        let teardown = Arc::new(RecordingTeardown::default());

        let sup = Supervisor::builder(h.cfg.clone(), h.ctx.facade())
            .with_registry(registry.clone())
            .with_process_table(table.clone())
            .with_lifecycle(cli.clone())
            .with_teardown(teardown.clone())
            .build();
        let mut rx = sup.subscribe();

        let report = sup.run_pass().await;
        assert_eq!(report.newly_dead, 1);
        assert_eq!(report.consistent, 1);
        assert_eq!(report.restarted + report.cleaned_up + report.failed, 0);
        assert!(cli.calls().is_empty());
        assert!(teardown.seen.lock().unwrap().is_empty());
        assert!(table.killed.lock().unwrap().is_empty());
        assert!(drain_kinds(&mut rx).contains(&(EventKind::CorrectionSkipped, Some("FM_01".into()))));

        let again = sup
            .confirm_profile_state("FM_01", ExpectedState::Restart)
            .await
            .unwrap();
        assert_eq!(again, Correction::Consistent);
        assert!(cli.calls().is_empty());
        assert!(registry.gets.load(Ordering::SeqCst) >= 3);

        sup.close().await;
        h.ctx.shutdown().await;
    }
}

#[tokio::test]
async fn test_default_build_logs_each_decision_once() {
    let h = Harness::new();
    h.audit(&[audit_line(TimeDelta::minutes(5), "Stopping", "W1")]);
    let registry = Arc::new(MemoryRegistry::new());
    registry.set(running("W1")).await.unwrap();

    let sup = Supervisor::builder(h.cfg.clone(), h.ctx.facade())
        .with_registry(registry)
        .with_process_table(FakeTable::with(&[]))
        .with_lifecycle(RecordingCli::returning(0, ""))
        .build();
    assert_eq!(sup.run_pass().await.cleaned_up, 1);

    sup.close().await;
    let debug_log = h.debug_log();
    h.ctx.shutdown().await;
    let debug = std::fs::read_to_string(debug_log).unwrap();
    assert_eq!(debug.matches("Worker W1 declared dead").count(), 1);
    assert!(!debug.contains("[dead] worker=W1"));
    assert!(!debug.contains("[cleanup] worker=W1"));
}

#[tokio::test]
async fn test_worker_log_collection_includes_last_teardown() {
    let h = Harness::new();
    let path = worker_log_path(&h.cfg.log_dir, "FM_04");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut body = format!(
        "{} - INFO - Starting TEARDOWN of FM_04\n",
        stamp(TimeDelta::minutes(40))
    );
    for i in 0..30 {
        body.push_str(&format!("{} - INFO - line {i}\n", stamp(TimeDelta::minutes(39))));
    }
    std::fs::write(path, body).unwrap();

    let registry = Arc::new(MemoryRegistry::new());
    registry.set(running("FM_04")).await.unwrap();
    let sup = Supervisor::builder(h.cfg.clone(), h.ctx.facade())
        .with_registry(registry)
        .with_process_table(FakeTable::with(&[]))
        .with_lifecycle(RecordingCli::returning(0, ""))
        .build();
    sup.run_pass().await;

    sup.close().await;
    let debug_log = h.debug_log();
    h.ctx.shutdown().await;
    let debug = std::fs::read_to_string(debug_log).unwrap();
    let collected = debug
        .split("Log collection for worker FM_04")
        .nth(1)
        .unwrap();
    let teardown = collected.find("Last teardown recorded by worker FM_04").unwrap();
    assert!(collected[teardown..].contains("Starting TEARDOWN of FM_04"));
    assert!(collected[teardown..].contains("line 0"));
    assert!(collected.find("Completed log collection for worker FM_04").unwrap() > teardown);
}

#[tokio::test]
async fn test_audit_answer_is_stable_across_reads() {
    let h = Harness::new();
    h.audit(&[
        audit_line(TimeDelta::minutes(30), "Starting", "FM"),
        audit_line(TimeDelta::minutes(3), "Stopping", "fm_01,cmsync_02"),
    ]);
    let reader = AuditLogReader::new(&h.cfg.audit_dir, 3, Duration::from_secs(3600));

    let first = reader.get_expected_state("FM_01").await.unwrap();
    let second = reader.get_expected_state("FM_01").await.unwrap();
    assert_eq!(first, ExpectedState::Stop);
    assert_eq!(first, second);
    assert_eq!(reader.get_expected_state("FM_07").await.unwrap(), ExpectedState::Start);
    assert_eq!(reader.get_expected_state("OTHER_1").await.unwrap(), ExpectedState::Restart);

    h.ctx.shutdown().await;
}
