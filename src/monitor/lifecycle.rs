//! # Lifecycle seams: the workload CLI and per-worker teardown.
//!
//! Corrective actions leave the supervisor through two traits:
//! - [`Lifecycle`] runs a lifecycle command (`restart`, ...) for one worker and
//!   reports its exit code and output. [`WorkloadCli`] shells out to the real tool.
//! - [`Teardown`] releases whatever a dead worker left behind. [`TeardownFn`]
//!   wraps a closure, [`NoTeardown`] does nothing.
//!
//! ## CLI invocation
//! ```text
//! <cli> restart <name> --force-stop --message="automatic restart triggered due to unwanted profile state."
//! <cli> stop <name>
//! ```

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use futures::future::BoxFuture;

use super::registry::WorkerDescriptor;
use crate::error::MonitorError;

/// Lifecycle command understood by the workload CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Start,
    Stop,
    Restart,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Start => "start",
            Operation::Stop => "stop",
            Operation::Restart => "restart",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Result of one CLI invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Process exit code; `-1` if the process was killed by a signal.
    pub exit_code: i32,
    /// Combined stdout and stderr.
    pub stdout: String,
}

impl CommandOutput {
    #[inline]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Non-zero exits whose output says the operation is unsupported are not failures.
    pub fn is_benign(&self) -> bool {
        self.success() || self.stdout.contains("unsupported")
    }
}

/// Runs lifecycle commands for workers.
#[async_trait]
pub trait Lifecycle: Send + Sync + 'static {
    /// Runs `operation` for worker `name`.
    ///
    /// `Err` only if the command could not be run at all; a non-zero exit is `Ok`.
    async fn run(&self, operation: Operation, name: &str) -> Result<CommandOutput, MonitorError>;
}

/// The workload CLI, invoked through `tokio::process`.
///
/// The child outlives a dropped `run` future: a restart is stop-then-start, and
/// killing it halfway would leave the worker stopped.
#[derive(Debug, Clone)]
pub struct WorkloadCli {
    program: PathBuf,
}

impl WorkloadCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments passed to the CLI for `operation` on `name`.
    pub fn args(operation: Operation, name: &str) -> Vec<String> {
        let mut args = vec![operation.as_str().to_string(), name.to_string()];
        if operation == Operation::Restart {
            args.push("--force-stop".to_string());
            args.push(format!(
                "--message=automatic {operation} triggered due to unwanted profile state."
            ));
        }
        args
    }
}

#[async_trait]
impl Lifecycle for WorkloadCli {
    async fn run(&self, operation: Operation, name: &str) -> Result<CommandOutput, MonitorError> {
        let out = tokio::process::Command::new(&self.program)
            .args(Self::args(operation, name))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| MonitorError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let mut stdout = String::from_utf8_lossy(&out.stdout).into_owned();
        stdout.push_str(&String::from_utf8_lossy(&out.stderr));
        Ok(CommandOutput {
            exit_code: out.status.code().unwrap_or(-1),
            stdout,
        })
    }
}

/// Releases the resources of a dead worker.
#[async_trait]
pub trait Teardown: Send + Sync + 'static {
    async fn teardown(&self, descriptor: &WorkerDescriptor) -> Result<(), String>;
}

/// Teardown that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTeardown;

#[async_trait]
impl Teardown for NoTeardown {
    async fn teardown(&self, _descriptor: &WorkerDescriptor) -> Result<(), String> {
        Ok(())
    }
}

/// Closure-backed teardown.
///
/// The closure receives an owned copy of the descriptor and produces a fresh
/// future per call.
///
/// ## Example
/// ```rust
/// use profilevisor::{TeardownFn, WorkerDescriptor};
///
/// let teardown = TeardownFn::new(|worker: WorkerDescriptor| async move {
///     if worker.name.is_empty() {
///         return Err("unnamed worker".to_string());
///     }
///     Ok(())
/// });
/// # let _ = teardown;
/// ```
pub struct TeardownFn<F> {
    f: F,
}

impl<F> TeardownFn<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> TeardownFn<F>
where
    F: Fn(WorkerDescriptor) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
{
    fn call(&self, descriptor: &WorkerDescriptor) -> BoxFuture<'static, Result<(), String>> {
        Box::pin((self.f)(descriptor.clone()))
    }
}

#[async_trait]
impl<F, Fut> Teardown for TeardownFn<F>
where
    F: Fn(WorkerDescriptor) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
{
    async fn teardown(&self, descriptor: &WorkerDescriptor) -> Result<(), String> {
        self.call(descriptor).await
    }
}
