use std::sync::Arc;

use super::audit::AuditLogReader;
use super::lifecycle::{Lifecycle, NoTeardown, Teardown, WorkloadCli};
use super::prober::{LivenessProber, ProcTable, ProcessTable};
use super::registry::{JsonDirRegistry, WorkerRegistry};
use super::supervisor::Supervisor;
use crate::config::MonitorConfig;
use crate::events::Bus;
use crate::logging::LogFacade;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for a [`Supervisor`].
///
/// Every seam defaults to its production adapter:
/// - registry: [`JsonDirRegistry`] over `registry_dir`
/// - lifecycle: [`WorkloadCli`] at `cli_path`
/// - process table: [`ProcTable`] matching `daemon_marker`
/// - teardown: [`NoTeardown`]
/// - subscribers: none
///
/// The supervisor already writes its own decisions to the log pipeline, so
/// [`LogWriter`](crate::LogWriter) is opt-in: adding it renders each event a
/// second time as a `[kind] worker=…` line.
pub struct SupervisorBuilder {
    cfg: MonitorConfig,
    log: LogFacade,
    registry: Option<Arc<dyn WorkerRegistry>>,
    lifecycle: Option<Arc<dyn Lifecycle>>,
    table: Option<Arc<dyn ProcessTable>>,
    teardown: Option<Arc<dyn Teardown>>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl SupervisorBuilder {
    pub fn new(cfg: MonitorConfig, log: LogFacade) -> Self {
        Self {
            cfg,
            log,
            registry: None,
            lifecycle: None,
            table: None,
            teardown: None,
            subscribers: Vec::new(),
        }
    }

    pub fn with_registry(mut self, registry: Arc<dyn WorkerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Arc<dyn Lifecycle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    pub fn with_process_table(mut self, table: Arc<dyn ProcessTable>) -> Self {
        self.table = Some(table);
        self
    }

    pub fn with_teardown(mut self, teardown: Arc<dyn Teardown>) -> Self {
        self.teardown = Some(teardown);
        self
    }

    /// Sets the event subscribers.
    ///
    /// Subscribers receive supervisor events through dedicated workers with
    /// bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the supervisor and spawns its event listener.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Supervisor {
        let cfg = self.cfg;
        let bus = Bus::new(cfg.bus_capacity_clamped());

        let registry: Arc<dyn WorkerRegistry> = match self.registry {
            Some(registry) => registry,
            None => Arc::new(JsonDirRegistry::new(cfg.registry_dir.clone())),
        };
        let lifecycle: Arc<dyn Lifecycle> = match self.lifecycle {
            Some(lifecycle) => lifecycle,
            None => Arc::new(WorkloadCli::new(cfg.cli_path.clone())),
        };
        let table: Arc<dyn ProcessTable> = match self.table {
            Some(table) => table,
            None => Arc::new(ProcTable::new(cfg.daemon_marker.clone())),
        };
        let teardown: Arc<dyn Teardown> = match self.teardown {
            Some(teardown) => teardown,
            None => Arc::new(NoTeardown),
        };
        let audit = AuditLogReader::new(cfg.audit_dir.clone(), cfg.audit_files, cfg.audit_lookback);
        let prober = LivenessProber::new(table, cfg.log_dir.clone(), cfg.staleness, cfg.tail_lines);
        let subs = SubscriberSet::new(self.subscribers, bus.clone());

        Supervisor::new_internal(
            cfg,
            self.log,
            registry,
            audit,
            prober,
            lifecycle,
            teardown,
            bus,
            subs,
        )
    }
}
