//! # Audit log reader: recovers the operator's last declared intent.
//!
//! The lifecycle CLI appends one line per operator command to
//! `<audit_dir>/workload_operations.log` (rotated to `.1`, `.2`, ...):
//!
//! ```text
//! 2024-03-09 07:05:01,042 - INFO - Starting profiles::	[fm_01,cmsync_02].	Message supplied with operation::	[nightly]
//! 2024-03-09 09:12:44,310 - INFO - Stopping categories::	[fm].	Message supplied with operation::	[]
//! 2024-03-09 10:00:00,000 - INFO - Restarting profiles::	[all].
//! ```
//!
//! ## Matching
//! A line targets worker `FM_01` when one of its target tokens equals
//! (case-insensitively) `FM_01`, its category `FM`, or `all`. The most recent
//! matching line wins; on equal timestamps the later line wins. No match within
//! the lookback window means [`ExpectedState::Restart`].
//!
//! Reading never mutates anything, so repeated calls agree as long as no new
//! lines were appended.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, TimeDelta};
use regex::Regex;

use super::lifecycle::Operation;
use crate::error::MonitorError;

/// File name of the current audit log.
pub const AUDIT_LOG: &str = "workload_operations.log";

const MESSAGE_MARKER: &str = "Message supplied with operation::";

static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})(?:,(\d{1,3}))?").unwrap()
});

static VERB: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(starting|stopping|restarting)\b").unwrap());

static INSTANCE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_\d+").unwrap());

/// What the operator last asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpectedState {
    Start,
    Stop,
    Restart,
}

impl ExpectedState {
    pub fn as_str(self) -> &'static str {
        match self {
            ExpectedState::Start => "start",
            ExpectedState::Stop => "stop",
            ExpectedState::Restart => "restart",
        }
    }
}

impl fmt::Display for ExpectedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl From<Operation> for ExpectedState {
    fn from(op: Operation) -> Self {
        match op {
            Operation::Start => ExpectedState::Start,
            Operation::Stop => ExpectedState::Stop,
            Operation::Restart => ExpectedState::Restart,
        }
    }
}

/// One parsed audit line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub timestamp: NaiveDateTime,
    pub operation: Operation,
    /// Target tokens, as written (`all`, categories, worker names).
    pub targets: Vec<String>,
    /// Operator message, if one was supplied.
    pub message: Option<String>,
}

impl AuditEntry {
    /// Parses one line; `None` for lines that are not lifecycle commands.
    pub fn parse(line: &str) -> Option<Self> {
        let ts = TIMESTAMP.captures(line)?;
        let mut timestamp = NaiveDateTime::parse_from_str(ts.get(1)?.as_str(), "%Y-%m-%d %H:%M:%S").ok()?;
        if let Some(ms) = ts.get(2).and_then(|m| m.as_str().parse::<i64>().ok()) {
            timestamp += TimeDelta::milliseconds(ms);
        }

        let rest = &line[ts.get(0)?.end()..];
        let verb = VERB.captures(rest)?.get(1)?;
        let operation = match verb.as_str().to_ascii_lowercase().as_str() {
            "starting" => Operation::Start,
            "stopping" => Operation::Stop,
            _ => Operation::Restart,
        };

        let after = &rest[verb.end()..];
        let (target_text, message) = match after.find(MESSAGE_MARKER) {
            Some(idx) => (
                &after[..idx],
                bracketed(&after[idx + MESSAGE_MARKER.len()..]),
            ),
            None => (after, None),
        };

        let targets = target_text
            .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        Some(Self {
            timestamp,
            operation,
            targets,
            message,
        })
    }

    /// True if any target token names `worker`, its category, or `all`.
    pub fn targets_worker(&self, worker: &str) -> bool {
        let category = category_of(worker);
        self.targets.iter().any(|t| {
            t.eq_ignore_ascii_case("all")
                || t.eq_ignore_ascii_case(worker)
                || t.eq_ignore_ascii_case(category)
        })
    }
}

/// Worker category: the name up to its first `_<digits>` group (`FM_01` → `FM`).
pub fn category_of(worker: &str) -> &str {
    match INSTANCE_SUFFIX.find(worker) {
        Some(m) => &worker[..m.start()],
        None => worker,
    }
}

fn bracketed(s: &str) -> Option<String> {
    let open = s.find('[')?;
    let close = s.rfind(']')?;
    (close > open)
        .then(|| s[open + 1..close].trim().to_string())
        .filter(|m| !m.is_empty())
}

/// Reads the audit log and its rotations.
#[derive(Debug, Clone)]
pub struct AuditLogReader {
    dir: PathBuf,
    files: usize,
    lookback: Duration,
}

impl AuditLogReader {
    /// `files` counts the current file plus rotations (minimum 1).
    pub fn new(dir: impl Into<PathBuf>, files: usize, lookback: Duration) -> Self {
        Self {
            dir: dir.into(),
            files: files.max(1),
            lookback,
        }
    }

    /// Audit files, oldest rotation first.
    fn paths(&self) -> Vec<PathBuf> {
        (0..self.files)
            .rev()
            .map(|i| audit_path(&self.dir, i))
            .collect()
    }

    /// Expected state of `worker` as of now.
    pub async fn get_expected_state(&self, worker: &str) -> Result<ExpectedState, MonitorError> {
        self.expected_state_at(worker, Local::now().naive_local())
            .await
    }

    /// Expected state of `worker` as of `now`; `Restart` if no line matches.
    pub async fn expected_state_at(
        &self,
        worker: &str,
        now: NaiveDateTime,
    ) -> Result<ExpectedState, MonitorError> {
        Ok(self
            .latest_entry_at(worker, now)
            .await?
            .map(|e| ExpectedState::from(e.operation))
            .unwrap_or(ExpectedState::Restart))
    }

    /// Most recent entry targeting `worker` within the lookback window.
    pub async fn latest_entry_at(
        &self,
        worker: &str,
        now: NaiveDateTime,
    ) -> Result<Option<AuditEntry>, MonitorError> {
        let lookback = TimeDelta::from_std(self.lookback).unwrap_or(TimeDelta::MAX);
        let oldest = now.checked_sub_signed(lookback).unwrap_or(NaiveDateTime::MIN);

        let mut best: Option<AuditEntry> = None;
        for path in self.paths() {
            let raw = match tokio::fs::read(&path).await {
                Ok(raw) => raw,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => return Err(MonitorError::Io { path, source }),
            };
            let text = String::from_utf8_lossy(&raw);

            for entry in text.lines().filter_map(AuditEntry::parse) {
                if entry.timestamp < oldest || !entry.targets_worker(worker) {
                    continue;
                }
                if best.as_ref().is_none_or(|b| entry.timestamp >= b.timestamp) {
                    best = Some(entry);
                }
            }
        }
        Ok(best)
    }
}

/// `<dir>/workload_operations.log` for `0`, `<dir>/workload_operations.log.<n>` otherwise.
pub fn audit_path(dir: &Path, rotation: usize) -> PathBuf {
    match rotation {
        0 => dir.join(AUDIT_LOG),
        n => dir.join(format!("{AUDIT_LOG}.{n}")),
    }
}
