//! # Supervisor: reconciles worker liveness against operator intent.
//!
//! The [`Supervisor`] owns the DeadSet, the probes and the corrective seams, and
//! publishes what it decides on the event [`Bus`].
//!
//! ## One pass
//! ```text
//! registry.list()
//!   └─► for each worker (errors and panics isolated per worker):
//!         COMPLETED ─────────────────────────────► skip
//!         excluded ──────────────────────────────► log only
//!         status DEAD ───────────────────────────► DeadSet (newly)
//!         in DeadSet ────────────────────────────► log only
//!         process_alive? ─ no ─┐
//!         log_advancing? ─ no ─┴─► miss; threshold reached ─► DeadSet (newly)
//!
//!         newly dead:
//!           expected = audit.get_expected_state(name)
//!           confirm_profile_state(name, expected)      (re-reads the registry)
//!             ├─ consistent ───────────────────────► nothing
//!             ├─ Stop ─────────────────────────────► profile_clean_up
//!             └─ Start/Restart ────────────────────► trigger_profile_operation
//!                                                     (clean up, CLI restart,
//!                                                      release from DeadSet)
//! ```
//!
//! ## Loop
//! [`Supervisor::run`] repeats pass + `poll_interval` sleep until the token is
//! cancelled or a termination signal arrives. A stop request interrupts the
//! sleep at once; during a pass it takes effect at the next worker boundary, so
//! a clean-up or restart already under way always completes.
//!
//! ## Event flow
//! ```text
//! Supervisor ── publish ──► Bus ──► listener task ──► SubscriberSet ──► subscribers
//! ```
//! [`Supervisor::close`] stops the listener after forwarding buffered events and
//! waits for every subscriber to finish its queue.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::audit::{AuditLogReader, ExpectedState};
use super::builder::SupervisorBuilder;
use super::dead_set::DeadSet;
use super::lifecycle::{Lifecycle, Operation, Teardown};
use super::prober::LivenessProber;
use super::registry::{WorkerDescriptor, WorkerRegistry, WorkerState, WorkerStatus};
use super::shutdown::{StopCause, stop_requested};
use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::events::{Bus, Event, EventKind};
use crate::logging::LogFacade;
use crate::subscribers::{SubscriberSet, panic_message};

/// Counters of one reconciliation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    /// Workers whose liveness was probed.
    pub probed: usize,
    /// Workers added to the DeadSet during this pass.
    pub newly_dead: usize,
    /// Restarts whose CLI call succeeded (or reported the operation unsupported).
    pub restarted: usize,
    /// Stop clean-ups performed.
    pub cleaned_up: usize,
    /// Dead workers whose registry state already matched the expected state.
    pub consistent: usize,
    /// Workers not probed (completed, excluded, removed, or already dead).
    pub skipped: usize,
    /// Workers whose reconciliation errored or panicked, plus failed restarts.
    pub failed: usize,
}

impl PassReport {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Skipped => self.skipped += 1,
            Outcome::Alive | Outcome::Suspect => self.probed += 1,
            Outcome::Dead { probed, correction } => {
                self.newly_dead += 1;
                if probed {
                    self.probed += 1;
                }
                match correction {
                    Correction::Consistent => self.consistent += 1,
                    Correction::CleanedUp => self.cleaned_up += 1,
                    Correction::Restarted => self.restarted += 1,
                    Correction::RestartFailed => self.failed += 1,
                }
            }
        }
    }
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "probed={} newly_dead={} restarted={} cleaned_up={} consistent={} skipped={} failed={}",
            self.probed,
            self.newly_dead,
            self.restarted,
            self.cleaned_up,
            self.consistent,
            self.skipped,
            self.failed
        )
    }
}

/// What a pass did about one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Skipped,
    /// Probe passed.
    Alive,
    /// Probe failed, miss threshold not reached yet.
    Suspect,
    Dead { probed: bool, correction: Correction },
}

/// Result of acting on a newly dead worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correction {
    /// Registry already matched the expected state.
    Consistent,
    /// Process terminated and torn down, no restart.
    CleanedUp,
    /// Restart CLI succeeded.
    Restarted,
    /// Restart CLI could not run or exited non-zero.
    RestartFailed,
}

/// True if the registered state already satisfies `expected`.
///
/// A missing descriptor, or one that completed with OK/WARNING/ERROR, is
/// always consistent.
pub fn is_consistent(current: Option<&WorkerDescriptor>, expected: ExpectedState) -> bool {
    let Some(desc) = current else {
        return true;
    };
    if desc.has_completed() {
        return true;
    }
    if desc.status == WorkerStatus::Dead {
        return false;
    }
    match expected {
        ExpectedState::Stop => desc.state == WorkerState::Stopping,
        ExpectedState::Start | ExpectedState::Restart => {
            matches!(desc.state, WorkerState::Starting | WorkerState::Stopping)
        }
    }
}

struct Listener {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Watchdog over the worker fleet.
pub struct Supervisor {
    cfg: MonitorConfig,
    log: LogFacade,
    registry: Arc<dyn WorkerRegistry>,
    audit: AuditLogReader,
    prober: LivenessProber,
    lifecycle: Arc<dyn Lifecycle>,
    teardown: Arc<dyn Teardown>,
    dead: Mutex<DeadSet>,
    bus: Bus,
    listener: Listener,
}

impl Supervisor {
    /// Starts a builder with production defaults for every seam.
    pub fn builder(cfg: MonitorConfig, log: LogFacade) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg, log)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_internal(
        cfg: MonitorConfig,
        log: LogFacade,
        registry: Arc<dyn WorkerRegistry>,
        audit: AuditLogReader,
        prober: LivenessProber,
        lifecycle: Arc<dyn Lifecycle>,
        teardown: Arc<dyn Teardown>,
        bus: Bus,
        subs: SubscriberSet,
    ) -> Self {
        let listener = Self::subscriber_listener(&bus, subs);
        Self {
            cfg,
            log,
            registry,
            audit,
            prober,
            lifecycle,
            teardown,
            dead: Mutex::new(DeadSet::new()),
            bus,
            listener,
        }
    }

    /// Forwards bus events to the subscriber set until [`close`](Self::close).
    fn subscriber_listener(bus: &Bus, subs: SubscriberSet) -> Listener {
        let mut rx = bus.subscribe();
        let token = CancellationToken::new();
        let stop = token.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    msg = rx.recv() => match msg {
                        Ok(ev) => subs.emit(&ev),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "event listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = stop.cancelled() => {
                        loop {
                            match rx.try_recv() {
                                Ok(ev) => subs.emit(&ev),
                                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                                Err(_) => break,
                            }
                        }
                        break;
                    }
                }
            }
            subs.shutdown().await;
        });

        Listener { token, handle }
    }

    /// Receiver of every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Snapshot of the DeadSet.
    pub async fn dead_set(&self) -> DeadSet {
        self.dead.lock().await.clone()
    }

    /// Runs passes until `token` is cancelled or a termination signal arrives.
    pub async fn run(&self, token: CancellationToken) -> StopCause {
        let stop = stop_requested(&token);
        tokio::pin!(stop);
        let halt = CancellationToken::new();

        let cause = loop {
            let pass = self.pass(&halt);
            tokio::pin!(pass);
            tokio::select! {
                biased;
                cause = &mut stop => {
                    halt.cancel();
                    let partial = (&mut pass).await;
                    self.log
                        .debug(format!("Pass cut short by stop request: {partial}"));
                    break cause;
                }
                _ = &mut pass => {}
            }

            tokio::select! {
                biased;
                cause = &mut stop => break cause,
                _ = tokio::time::sleep(self.cfg.poll_interval) => {}
            }
        };

        self.log
            .syslog(format!("Profile monitor stopping ({cause})"));
        self.bus
            .publish(Event::new(EventKind::ShutdownRequested).with_reason(cause.as_str()));
        cause
    }

    /// Stops event delivery after flushing buffered events to every subscriber.
    pub async fn close(self) {
        self.listener.token.cancel();
        let _ = self.listener.handle.await;
    }

    /// One reconciliation pass over every registered worker.
    pub async fn run_pass(&self) -> PassReport {
        self.pass(&CancellationToken::new()).await
    }

    /// Pass that stops before the next worker once `halt` is cancelled.
    async fn pass(&self, halt: &CancellationToken) -> PassReport {
        let mut report = PassReport::default();

        let names = match self.registry.list().await {
            Ok(names) => names,
            Err(err) => {
                self.log
                    .error(format!("Unable to list workers: {}", err.as_message()));
                report.failed += 1;
                self.bus
                    .publish(Event::new(EventKind::PassCompleted).with_reason(report.to_string()));
                return report;
            }
        };

        self.dead.lock().await.retain_known(&names);
        self.bus
            .publish(Event::new(EventKind::PassStarted).with_reason(names.len().to_string()));
        self.log
            .debug(format!("Verifying state of {} workers", names.len()));

        for name in &names {
            if halt.is_cancelled() {
                break;
            }
            match AssertUnwindSafe(self.reconcile(name)).catch_unwind().await {
                Ok(Ok(outcome)) => report.record(outcome),
                Ok(Err(err)) => {
                    report.failed += 1;
                    let message = format!(
                        "Verification of worker {name} failed [{}]: {}",
                        err.as_label(),
                        err.as_message()
                    );
                    if err.is_transient() {
                        self.log.warn(message);
                    } else {
                        self.log.error(message);
                    }
                    self.bus.publish(
                        Event::new(EventKind::WorkerFailed)
                            .with_worker(name.as_str())
                            .with_reason(err.as_message()),
                    );
                }
                Err(panic) => {
                    report.failed += 1;
                    let msg = panic_message(&*panic);
                    self.log
                        .exception([format!("Verification of worker {name} panicked: {msg}")]);
                    self.bus.publish(
                        Event::new(EventKind::WorkerFailed)
                            .with_worker(name.as_str())
                            .with_reason(msg),
                    );
                }
            }
        }

        self.log
            .debug(format!("Completed verification pass: {report}"));
        self.bus
            .publish(Event::new(EventKind::PassCompleted).with_reason(report.to_string()));
        report
    }

    async fn reconcile(&self, name: &str) -> Result<Outcome, MonitorError> {
        let Some(desc) = self.registry.get(name).await? else {
            self.dead.lock().await.release(name);
            self.skip(name, "removed");
            return Ok(Outcome::Skipped);
        };

        if desc.state == WorkerState::Completed {
            self.skip(name, "completed");
            return Ok(Outcome::Skipped);
        }

        if self.cfg.is_excluded(name) {
            self.log
                .debug(format!("Worker {name} is excluded from corrective actions"));
            self.log_worker(&desc).await;
            self.skip(name, "excluded");
            return Ok(Outcome::Skipped);
        }

        let mut probed = false;
        let reported_dead =
            desc.status == WorkerStatus::Dead && self.dead.lock().await.insert(name);

        if reported_dead {
            self.declare_dead(name, "registry status DEAD");
        } else {
            if self.dead.lock().await.contains(name) {
                self.log_worker(&desc).await;
                self.skip(name, "dead_set");
                return Ok(Outcome::Skipped);
            }

            probed = true;
            let Some(reason) = self.probe(&desc).await else {
                self.dead.lock().await.record_pass(name);
                self.log_worker(&desc).await;
                return Ok(Outcome::Alive);
            };

            let threshold = self.cfg.miss_threshold();
            let reached = {
                let mut dead = self.dead.lock().await;
                dead.record_miss(name, threshold) && dead.insert(name)
            };
            if !reached {
                self.log
                    .debug(format!("Worker {name} failed a probe ({reason}), below threshold {threshold}"));
                self.log_worker(&desc).await;
                return Ok(Outcome::Suspect);
            }
            self.declare_dead(name, reason);
        }

        self.log_worker(&desc).await;
        let expected = self.expected_state(name).await;
        let correction = self.confirm_profile_state(name, expected).await?;
        Ok(Outcome::Dead { probed, correction })
    }

    /// `None` if the worker looks alive, otherwise the failed probe.
    async fn probe(&self, desc: &WorkerDescriptor) -> Option<&'static str> {
        let name = desc.name.as_str();
        self.log
            .debug(format!("Querying process table for worker {name}"));
        if !self.prober.process_alive(name).await {
            return Some("no daemon process");
        }
        if desc.state != WorkerState::Sleeping && !self.prober.log_advancing(name).await {
            return Some("log not advancing");
        }
        None
    }

    async fn expected_state(&self, name: &str) -> ExpectedState {
        match self.audit.get_expected_state(name).await {
            Ok(expected) => {
                self.log
                    .debug(format!("Expected state of worker {name}: {expected}"));
                expected
            }
            Err(err) => {
                self.log.warn(format!(
                    "Unable to read audit log for worker {name}, assuming restart: {}",
                    err.as_message()
                ));
                ExpectedState::Restart
            }
        }
    }

    /// Re-reads the registry and acts unless the worker already matches `expected`.
    pub async fn confirm_profile_state(
        &self,
        name: &str,
        expected: ExpectedState,
    ) -> Result<Correction, MonitorError> {
        let current = self.registry.get(name).await?;
        if current.is_none() {
            self.dead.lock().await.release(name);
        }
        let Some(desc) = current.filter(|d| !is_consistent(Some(d), expected)) else {
            self.log.debug(format!(
                "Worker {name} already consistent with expected state {expected}, no action taken"
            ));
            self.bus.publish(
                Event::new(EventKind::CorrectionSkipped)
                    .with_worker(name)
                    .with_expected(expected),
            );
            return Ok(Correction::Consistent);
        };

        Ok(match expected {
            ExpectedState::Stop => {
                self.profile_clean_up(&desc).await;
                self.bus.publish(
                    Event::new(EventKind::CleanupPerformed)
                        .with_worker(name)
                        .with_expected(expected),
                );
                Correction::CleanedUp
            }
            ExpectedState::Start | ExpectedState::Restart => {
                self.trigger_profile_operation(&desc, expected).await
            }
        })
    }

    /// Terminates the worker's daemon (if the process table knows one) and runs its teardown.
    ///
    /// Termination and teardown failures are logged and swallowed.
    pub async fn profile_clean_up(&self, desc: &WorkerDescriptor) {
        let name = desc.name.as_str();
        self.log
            .debug(format!("Performing cleanup of worker {name}"));

        let table = self.prober.table();
        match table.daemon_pid(name).await {
            Some(pid) => {
                if let Err(err) = table.terminate(pid).await {
                    self.log
                        .debug(format!("Unable to terminate worker {name} (pid {pid}): {err}"));
                }
            }
            None => {
                let recorded = desc.pid.map_or_else(|| "none".to_string(), |p| p.to_string());
                self.log.debug(format!(
                    "No daemon process found for worker {name} (recorded pid {recorded})"
                ));
            }
        }

        self.log
            .debug(format!("Invoking teardown of worker {name}"));
        if let Err(reason) = self.teardown.teardown(desc).await {
            self.log
                .debug(format!("Teardown of worker {name} failed: {reason}"));
        }
        self.log.debug("Cleanup actions complete");
    }

    /// Cleans the worker up, then asks the lifecycle CLI to restart it.
    ///
    /// The worker leaves the DeadSet whatever the CLI outcome, so the next pass
    /// probes it again.
    pub async fn trigger_profile_operation(
        &self,
        desc: &WorkerDescriptor,
        expected: ExpectedState,
    ) -> Correction {
        let name = desc.name.as_str();
        self.log
            .debug(format!("Attempting to restart worker {name}"));
        self.profile_clean_up(desc).await;

        let result = self.lifecycle.run(Operation::Restart, name).await;
        self.dead.lock().await.release(name);

        match result {
            Ok(out) => {
                self.log.command_result(
                    &format!("Automatic restart of worker {name}"),
                    out.exit_code,
                    &out.stdout,
                );
                if out.is_benign() {
                    self.log
                        .info(format!("Completed restart of worker {name}"));
                    self.bus.publish(
                        Event::new(EventKind::RestartTriggered)
                            .with_worker(name)
                            .with_exit_code(out.exit_code)
                            .with_expected(expected),
                    );
                    Correction::Restarted
                } else {
                    self.log.warn(format!(
                        "Unable to restart worker {name}, rc: [{}]",
                        out.exit_code
                    ));
                    self.bus.publish(
                        Event::new(EventKind::RestartFailed)
                            .with_worker(name)
                            .with_exit_code(out.exit_code)
                            .with_reason(out.stdout.trim())
                            .with_expected(expected),
                    );
                    Correction::RestartFailed
                }
            }
            Err(err) => {
                self.log.error(format!(
                    "Unable to run restart for worker {name}: {}",
                    err.as_message()
                ));
                self.bus.publish(
                    Event::new(EventKind::RestartFailed)
                        .with_worker(name)
                        .with_reason(err.as_message())
                        .with_expected(expected),
                );
                Correction::RestartFailed
            }
        }
    }

    fn declare_dead(&self, name: &str, reason: &str) {
        self.log
            .warn(format!("Worker {name} declared dead: {reason}"));
        self.bus.publish(
            Event::new(EventKind::WorkerDead)
                .with_worker(name)
                .with_reason(reason),
        );
    }

    fn skip(&self, name: &str, reason: &'static str) {
        self.log
            .debug(format!("Skipping worker {name}: {reason}"));
        self.bus.publish(
            Event::new(EventKind::WorkerSkipped)
                .with_worker(name)
                .with_reason(reason),
        );
    }

    /// Logs the tail of the worker's own log, its last teardown and its persisted error.
    async fn log_worker(&self, desc: &WorkerDescriptor) {
        let name = desc.name.as_str();
        self.log.debug(format!(
            "###### Log collection for worker {name} [{} / {}] ######",
            desc.state.as_str(),
            desc.status.as_str()
        ));
        for line in self.prober.tail(name).await {
            self.log.debug(line);
        }
        let teardown = self.prober.teardown_context(name).await;
        if !teardown.is_empty() {
            self.log
                .debug(format!("Last teardown recorded by worker {name}:"));
            for line in teardown {
                self.log.debug(line);
            }
        }
        if let Some(error) = &desc.last_error {
            self.log
                .debug(format!("Persisted error of worker {name}: {error}"));
        }
        self.log
            .debug(format!("###### Completed log collection for worker {name} ######"));
    }
}
