//! # Runtime configuration.
//!
//! Provides [`Config`], the centralized settings for the log pipeline
//! ([`LogConfig`]) and the supervisor loop ([`MonitorConfig`]).
//!
//! Config is used in two ways:
//! 1. **Pipeline creation**: `LoggingContext::init(&config.log)`
//! 2. **Supervisor creation**: `Supervisor::builder(config.monitor, facade)`
//!
//! ## Sentinel values
//! - `required_misses = 0` → treated as `1`
//! - `bus_capacity = 0` → clamped to `1`
//!
//! ## File format
//! ```toml
//! [log]
//! log_dir = "/var/log/profilevisor"
//! grace_ms = 50
//!
//! [monitor]
//! poll_interval_secs = 60
//! staleness_secs = 30
//! excluded = ["CBRS_SETUP"]
//! ```
//! Missing keys take their defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::MonitorError;

/// Settings of the log pipeline.
#[derive(Clone, Debug)]
pub struct LogConfig {
    /// Directory holding `debug.log`, `exception.log` and `daemon/<worker>.log`.
    pub log_dir: PathBuf,

    /// Optional process label used in record identities when logging from the main thread.
    ///
    /// - `None` → identity falls back to `(PID n)`
    /// - `Some(label)` → `(process ID label [PID n])`
    pub process_label: Option<String>,

    /// Upper bound for the "wait until the queue is empty" step of shutdown.
    pub drain_timeout: Duration,

    /// Fixed wait after the queue reported empty, covering the in-flight dequeue.
    pub grace: Duration,

    /// Mirror SYSLOG records to the host system log.
    pub syslog: bool,
}

impl Default for LogConfig {
    /// Default configuration:
    ///
    /// - `log_dir = /var/log/profilevisor`
    /// - `drain_timeout = 5s`
    /// - `grace = 50ms`
    /// - `syslog = true`
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("/var/log/profilevisor"),
            process_label: None,
            drain_timeout: Duration::from_secs(5),
            grace: Duration::from_millis(50),
            syslog: true,
        }
    }
}

/// Settings of the supervisor loop.
///
/// ## Field semantics
/// - `poll_interval`: sleep between two reconciliation passes
/// - `staleness`: a worker log older than this is considered stale
/// - `required_misses`: consecutive failed probes before a worker enters the DeadSet (`0` = `1`)
/// - `excluded`: workers never corrected (still logged)
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    /// Sleep between reconciliation passes.
    pub poll_interval: Duration,

    /// Maximum age of the newest worker log line before the log counts as stale.
    pub staleness: Duration,

    /// Consecutive failed probes required before a worker is declared dead.
    pub required_misses: u32,

    /// Number of lines read from the end of a worker log.
    pub tail_lines: usize,

    /// Directory where per-worker logs live (`<log_dir>/daemon/<name>.log`).
    pub log_dir: PathBuf,

    /// Directory holding `workload_operations.log` and its rotations.
    pub audit_dir: PathBuf,

    /// Number of audit files scanned (current file plus rotations).
    pub audit_files: usize,

    /// Audit entries older than this are ignored.
    pub audit_lookback: Duration,

    /// Quarantined workers: logged every pass, never corrected.
    pub excluded: Vec<String>,

    /// Lifecycle CLI used for corrective restarts.
    pub cli_path: PathBuf,

    /// Marker that identifies worker daemons in the process table.
    pub daemon_marker: String,

    /// Directory of the JSON worker registry.
    pub registry_dir: PathBuf,

    /// Capacity of the event bus ring buffer.
    pub bus_capacity: usize,
}

impl MonitorConfig {
    /// Returns the miss threshold, never below one.
    #[inline]
    pub fn miss_threshold(&self) -> u32 {
        self.required_misses.max(1)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// True if `name` is on the exclusion list (case-insensitive).
    pub fn is_excluded(&self, name: &str) -> bool {
        self.excluded.iter().any(|e| e.eq_ignore_ascii_case(name))
    }
}

impl Default for MonitorConfig {
    /// Default configuration:
    ///
    /// - `poll_interval = 60s`, `staleness = 30s`, `required_misses = 1`
    /// - `tail_lines = 20`, `audit_files = 3`, `audit_lookback = 24h`
    /// - `excluded = ["CBRS_SETUP"]`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            staleness: Duration::from_secs(30),
            required_misses: 1,
            tail_lines: 20,
            log_dir: PathBuf::from("/var/log/profilevisor"),
            audit_dir: PathBuf::from("/var/log/profilevisor"),
            audit_files: 3,
            audit_lookback: Duration::from_secs(24 * 60 * 60),
            excluded: vec!["CBRS_SETUP".to_string()],
            cli_path: PathBuf::from("/opt/profilevisor/bin/workload"),
            daemon_marker: "profile-daemon".to_string(),
            registry_dir: PathBuf::from("/var/lib/profilevisor/registry"),
            bus_capacity: 1024,
        }
    }
}

/// Global configuration: log pipeline plus supervisor loop.
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Log pipeline settings.
    pub log: LogConfig,
    /// Supervisor loop settings.
    pub monitor: MonitorConfig,
}

impl Config {
    /// Parses a TOML document; missing keys keep their defaults.
    ///
    /// `monitor.log_dir` defaults to `log.log_dir` when only the latter is given.
    pub fn from_toml_str(raw: &str) -> Result<Self, MonitorError> {
        let file: ConfigFile = toml::from_str(raw).map_err(|e| MonitorError::Config {
            reason: e.to_string(),
        })?;
        Ok(file.into_config())
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MonitorError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| MonitorError::Config {
            reason: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml_str(&raw)
    }
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    log: LogSection,
    monitor: MonitorSection,
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct LogSection {
    log_dir: Option<PathBuf>,
    process_label: Option<String>,
    drain_timeout_secs: Option<u64>,
    grace_ms: Option<u64>,
    syslog: Option<bool>,
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct MonitorSection {
    poll_interval_secs: Option<u64>,
    staleness_secs: Option<u64>,
    required_misses: Option<u32>,
    tail_lines: Option<usize>,
    log_dir: Option<PathBuf>,
    audit_dir: Option<PathBuf>,
    audit_files: Option<usize>,
    audit_lookback_secs: Option<u64>,
    excluded: Option<Vec<String>>,
    cli_path: Option<PathBuf>,
    daemon_marker: Option<String>,
    registry_dir: Option<PathBuf>,
    bus_capacity: Option<usize>,
}

impl ConfigFile {
    fn into_config(self) -> Config {
        let mut log = LogConfig::default();
        let l = self.log;
        if let Some(v) = l.log_dir {
            log.log_dir = v;
        }
        log.process_label = l.process_label;
        if let Some(v) = l.drain_timeout_secs {
            log.drain_timeout = Duration::from_secs(v);
        }
        if let Some(v) = l.grace_ms {
            log.grace = Duration::from_millis(v);
        }
        if let Some(v) = l.syslog {
            log.syslog = v;
        }

        let mut monitor = MonitorConfig {
            log_dir: log.log_dir.clone(),
            audit_dir: log.log_dir.clone(),
            ..MonitorConfig::default()
        };
        let m = self.monitor;
        let secs = Duration::from_secs;
        if let Some(v) = m.poll_interval_secs {
            monitor.poll_interval = secs(v);
        }
        if let Some(v) = m.staleness_secs {
            monitor.staleness = secs(v);
        }
        if let Some(v) = m.required_misses {
            monitor.required_misses = v;
        }
        if let Some(v) = m.tail_lines {
            monitor.tail_lines = v;
        }
        if let Some(v) = m.log_dir {
            monitor.log_dir = v;
        }
        if let Some(v) = m.audit_dir {
            monitor.audit_dir = v;
        }
        if let Some(v) = m.audit_files {
            monitor.audit_files = v;
        }
        if let Some(v) = m.audit_lookback_secs {
            monitor.audit_lookback = secs(v);
        }
        if let Some(v) = m.excluded {
            monitor.excluded = v;
        }
        if let Some(v) = m.cli_path {
            monitor.cli_path = v;
        }
        if let Some(v) = m.daemon_marker {
            monitor.daemon_marker = v;
        }
        if let Some(v) = m.registry_dir {
            monitor.registry_dir = v;
        }
        if let Some(v) = m.bus_capacity {
            monitor.bus_capacity = v;
        }

        Config { log, monitor }
    }
}
