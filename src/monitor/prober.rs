//! # Liveness prober.
//!
//! Two independent, read-only probes per worker:
//!
//! ```text
//! process_alive(name)  ── ProcessTable::daemon_pid(name) ──► Some(pid)?
//! log_advancing(name)  ── tail <log_dir>/daemon/<name>.log
//!                            ├─ contains "<html" / "<!doctype"     → false
//!                            ├─ newest dated line older than bound → false
//!                            └─ anything else (no file, no date,
//!                               unparseable date, fresh line)      → true
//! ```
//!
//! Ambiguous evidence always resolves toward "alive".

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime, TimeDelta};
use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::logging::worker_log_path;

/// Markers of content that is not the worker's own log output.
const SENTINELS: [&str; 2] = ["<html", "<!doctype"];

/// Bytes read from the end of a log per attempt when looking for the tail.
const TAIL_CHUNK: u64 = 16 * 1024;

/// Marker a worker writes when it begins tearing down.
pub const TEARDOWN_MARKER: &str = "Starting TEARDOWN";

static DATED_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").unwrap());

/// View of the OS process table.
#[async_trait]
pub trait ProcessTable: Send + Sync + 'static {
    /// Pid of the daemon running worker `name`, if any.
    async fn daemon_pid(&self, name: &str) -> Option<u32>;

    /// Forcibly terminates `pid`. A process that is already gone is not an error.
    async fn terminate(&self, pid: u32) -> std::io::Result<()>;
}

/// Process table backed by `/proc` and `kill(2)`.
///
/// A worker daemon is a process whose command line contains an argument ending
/// with the daemon marker, immediately followed by the worker name.
#[derive(Debug, Clone)]
pub struct ProcTable {
    root: PathBuf,
    marker: String,
}

impl ProcTable {
    pub fn new(marker: impl Into<String>) -> Self {
        Self::with_root("/proc", marker)
    }

    /// Scans an alternative procfs root.
    pub fn with_root(root: impl Into<PathBuf>, marker: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            marker: marker.into(),
        }
    }

    fn matches(&self, cmdline: &[u8], name: &str) -> bool {
        let args: Vec<&[u8]> = cmdline
            .split(|b| *b == 0)
            .filter(|a| !a.is_empty())
            .collect();
        args.windows(2)
            .any(|w| w[0].ends_with(self.marker.as_bytes()) && w[1] == name.as_bytes())
    }
}

#[async_trait]
impl ProcessTable for ProcTable {
    async fn daemon_pid(&self, name: &str) -> Option<u32> {
        let own = std::process::id();
        let mut entries = tokio::fs::read_dir(&self.root).await.ok()?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Some(pid) = entry
                .file_name()
                .to_str()
                .and_then(|s| s.parse::<u32>().ok())
            else {
                continue;
            };
            if pid == own {
                continue;
            }
            // processes may exit between read_dir and read
            let Ok(cmdline) = tokio::fs::read(entry.path().join("cmdline")).await else {
                continue;
            };
            if self.matches(&cmdline, name) {
                return Some(pid);
            }
        }
        None
    }

    #[allow(unsafe_code)] // kill(2) FFI
    async fn terminate(&self, pid: u32) -> std::io::Result<()> {
        let pid = libc::pid_t::try_from(pid)
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range"))?;
        // SAFETY: kill(2) has no memory-safety preconditions.
        let rc = unsafe { libc::kill(pid, libc::SIGKILL) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ESRCH) => Ok(()),
            _ => Err(err),
        }
    }
}

/// Liveness probes for workers.
#[derive(Clone)]
pub struct LivenessProber {
    table: Arc<dyn ProcessTable>,
    log_dir: PathBuf,
    staleness: Duration,
    tail_lines: usize,
}

impl LivenessProber {
    pub fn new(
        table: Arc<dyn ProcessTable>,
        log_dir: impl Into<PathBuf>,
        staleness: Duration,
        tail_lines: usize,
    ) -> Self {
        Self {
            table,
            log_dir: log_dir.into(),
            staleness,
            tail_lines: tail_lines.max(1),
        }
    }

    pub fn table(&self) -> &Arc<dyn ProcessTable> {
        &self.table
    }

    /// Path of the worker's own log file.
    pub fn log_path(&self, name: &str) -> PathBuf {
        worker_log_path(&self.log_dir, name)
    }

    /// True iff the process table reports a daemon for `name`.
    pub async fn process_alive(&self, name: &str) -> bool {
        self.table.daemon_pid(name).await.is_some()
    }

    /// True unless the worker's log shows foreign content or has gone stale.
    pub async fn log_advancing(&self, name: &str) -> bool {
        self.log_advancing_at(name, Local::now().naive_local())
            .await
    }

    /// [`log_advancing`](Self::log_advancing) evaluated at `now`.
    pub async fn log_advancing_at(&self, name: &str, now: NaiveDateTime) -> bool {
        let Ok(lines) = read_tail(&self.log_path(name), self.tail_lines).await else {
            return true;
        };
        judge_tail(&lines, now, self.staleness)
    }

    /// Last lines of the worker's log; empty if it cannot be read.
    pub async fn tail(&self, name: &str) -> Vec<String> {
        read_tail(&self.log_path(name), self.tail_lines)
            .await
            .unwrap_or_default()
    }

    /// The last [`TEARDOWN_MARKER`] line of the worker's log and up to
    /// `tail_lines` lines logged after it.
    ///
    /// Empty if the log cannot be read or the worker never tore down.
    pub async fn teardown_context(&self, name: &str) -> Vec<String> {
        let Ok(bytes) = tokio::fs::read(self.log_path(name)).await else {
            return Vec::new();
        };
        let text = String::from_utf8_lossy(&bytes);
        let lines: Vec<&str> = text.lines().collect();
        let Some(at) = lines.iter().rposition(|l| l.contains(TEARDOWN_MARKER)) else {
            return Vec::new();
        };
        let end = (at + 1 + self.tail_lines).min(lines.len());
        lines[at..end].iter().map(|l| l.to_string()).collect()
    }
}

fn judge_tail(lines: &[String], now: NaiveDateTime, staleness: Duration) -> bool {
    let foreign = lines.iter().any(|line| {
        let lower = line.to_ascii_lowercase();
        SENTINELS.iter().any(|s| lower.contains(s))
    });
    if foreign {
        return false;
    }

    let Some(newest) = lines.iter().rev().find(|l| DATED_LINE.is_match(l)) else {
        return true;
    };
    let stamp = newest.split(',').next().unwrap_or_default().trim();
    let Ok(at) = NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S") else {
        return true;
    };
    let bound = TimeDelta::from_std(staleness).unwrap_or(TimeDelta::MAX);
    now.signed_duration_since(at) <= bound
}

/// Reads the last `n` lines of `path`, growing the read window from the end as needed.
async fn read_tail(path: &Path, n: usize) -> std::io::Result<Vec<String>> {
    let mut file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();

    let mut window = TAIL_CHUNK.min(len);
    loop {
        file.seek(SeekFrom::Start(len - window)).await?;
        let mut buf = Vec::with_capacity(window as usize);
        (&mut file).take(window).read_to_end(&mut buf).await?;

        let text = String::from_utf8_lossy(&buf);
        let lines: Vec<&str> = text.lines().collect();
        // first line may be cut unless the window reaches the start
        let complete = if window == len {
            &lines[..]
        } else {
            lines.get(1..).unwrap_or_default()
        };
        if complete.len() >= n || window == len {
            let skip = complete.len().saturating_sub(n);
            return Ok(complete[skip..].iter().map(|l| l.to_string()).collect());
        }
        window = (window * 2).min(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap()
    }

    struct FakeTable(HashMap<String, u32>);

    #[async_trait]
    impl ProcessTable for FakeTable {
        async fn daemon_pid(&self, name: &str) -> Option<u32> {
            self.0.get(name).copied()
        }
        async fn terminate(&self, _pid: u32) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn prober(dir: &Path) -> LivenessProber {
        let table = FakeTable(HashMap::from([("FM_01".to_string(), 77)]));
        LivenessProber::new(Arc::new(table), dir, Duration::from_secs(30), 20)
    }

    fn write_log(dir: &Path, name: &str, body: &str) {
        let path = worker_log_path(dir, name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[tokio::test]
    async fn test_process_alive_uses_table() {
        let dir = tempfile::tempdir().unwrap();
        let p = prober(dir.path());
        assert!(p.process_alive("FM_01").await);
        assert!(!p.process_alive("FM_02").await);
    }

    #[tokio::test]
    async fn test_fresh_log_is_advancing() {
        let dir = tempfile::tempdir().unwrap();
        write_log(
            dir.path(),
            "FM_01",
            "2024-03-09 11:50:00,000 WORKLOAD INFO old\n2024-03-09 11:59:50,123 WORKLOAD INFO fresh\n  continuation\n",
        );
        assert!(prober(dir.path()).log_advancing_at("FM_01", now()).await);
    }

    #[tokio::test]
    async fn test_stale_log_is_not_advancing() {
        let dir = tempfile::tempdir().unwrap();
        write_log(dir.path(), "W1", "2024-03-09 11:50:00,000 WORKLOAD INFO ten minutes ago\n");
        assert!(!prober(dir.path()).log_advancing_at("W1", now()).await);
    }

    #[tokio::test]
    async fn test_sentinel_content_is_not_advancing() {
        let dir = tempfile::tempdir().unwrap();
        write_log(
            dir.path(),
            "FM_01",
            "2024-03-09 11:59:59,000 WORKLOAD INFO body:\n<!DOCTYPE html>\n",
        );
        assert!(!prober(dir.path()).log_advancing_at("FM_01", now()).await);
    }

    #[tokio::test]
    async fn test_ambiguous_evidence_counts_as_advancing() {
        let dir = tempfile::tempdir().unwrap();
        let p = prober(dir.path());
        // missing file
        assert!(p.log_advancing_at("NOPE", now()).await);
        // no dated line
        write_log(dir.path(), "A", "hello\nworld\n");
        assert!(p.log_advancing_at("A", now()).await);
        // unparseable timestamp
        write_log(dir.path(), "B", "2024-13-45 99:99:99,000 broken\n");
        assert!(p.log_advancing_at("B", now()).await);
    }

    #[tokio::test]
    async fn test_tail_returns_last_lines_of_large_file() {
        let dir = tempfile::tempdir().unwrap();
        let body: String = (0..5000).map(|i| format!("line {i:05} padding padding\n")).collect();
        write_log(dir.path(), "BIG", &body);
        let tail = prober(dir.path()).tail("BIG").await;
        assert_eq!(tail.len(), 20);
        assert_eq!(tail[0], "line 04980 padding padding");
        assert_eq!(tail[19], "line 04999 padding padding");
    }

    #[test]
    fn test_cmdline_matching() {
        let t = ProcTable::new("profile-daemon");
        assert!(t.matches(b"sh\0/opt/bin/profile-daemon\0FM_01\0", "FM_01"));
        assert!(!t.matches(b"sh\0/opt/bin/profile-daemon\0FM_010\0", "FM_01"));
        assert!(!t.matches(b"vim\0FM_01\0", "FM_01"));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_proc_table_scans_fake_root() {
        let dir = tempfile::tempdir().unwrap();
        // pids above pid_max never collide with the test process
        for (pid, cmd) in [
            ("4194390", "sh\0-c\0true\0"),
            ("4194391", "profile-daemon\0W2\0"),
            ("self", "x"),
        ] {
            std::fs::create_dir_all(dir.path().join(pid)).unwrap();
            std::fs::write(dir.path().join(pid).join("cmdline"), cmd).unwrap();
        }
        let t = ProcTable::with_root(dir.path(), "profile-daemon");
        assert_eq!(t.daemon_pid("W2").await, Some(4194391));
        assert_eq!(t.daemon_pid("W1").await, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_proc_table_terminate_kills_and_tolerates_gone() {
        use std::os::unix::process::ExitStatusExt;

        let mut child = tokio::process::Command::new("sleep").arg("5").spawn().unwrap();
        let pid = child.id().unwrap();
        let t = ProcTable::new("profile-daemon");
        t.terminate(pid).await.unwrap();
        let status = child.wait().await.unwrap();
        assert_eq!(status.signal(), Some(libc::SIGKILL));

        // above pid_max: ESRCH
        t.terminate(4194390).await.unwrap();
    }

    #[tokio::test]
    async fn test_teardown_context_follows_last_marker() {
        let dir = tempfile::tempdir().unwrap();
        let table = FakeTable(HashMap::new());
        let p = LivenessProber::new(Arc::new(table), dir.path(), Duration::from_secs(30), 2);

        assert!(p.teardown_context("FM_01").await.is_empty());

        write_log(dir.path(), "FM_01", "a\nb\n");
        assert!(p.teardown_context("FM_01").await.is_empty());

        write_log(
            dir.path(),
            "FM_01",
            "x - Starting TEARDOWN 1\nold\ny - Starting TEARDOWN 2\nc1\nc2\nc3\n",
        );
        assert_eq!(
            p.teardown_context("FM_01").await,
            ["y - Starting TEARDOWN 2", "c1", "c2"]
        );
    }
}
