//! Error types used by the log pipeline and the supervisor loop.
//!
//! This module defines two main error enums:
//!
//! - [`LogError`]: fatal local conditions of the log pipeline (directory or file cannot be prepared).
//! - [`MonitorError`]: failures of the supervisor's external collaborators (registry, CLI, config).
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging
//! and additional utilities such as [`MonitorError::is_transient`].

use std::path::PathBuf;

use thiserror::Error;

/// # Errors produced by the log pipeline.
///
/// Raised only from [`LoggingContext::init`](crate::LoggingContext::init); once the
/// pipeline runs, consumer-side failures are never surfaced to producers.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LogError {
    /// The log directory could not be created (or a non-directory is in the way).
    #[error("could not create log directory {path:?}: {source}")]
    CreateDir {
        /// Directory that was being prepared.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A log file could not be opened for appending.
    #[error("could not open log file {path:?}: {source}")]
    OpenFile {
        /// File that was being opened.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl LogError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use profilevisor::LogError;
    ///
    /// let err = LogError::CreateDir {
    ///     path: "/nope".into(),
    ///     source: std::io::Error::other("denied"),
    /// };
    /// assert_eq!(err.as_label(), "log_create_dir");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            LogError::CreateDir { .. } => "log_create_dir",
            LogError::OpenFile { .. } => "log_open_file",
        }
    }
}

/// # Errors produced by the supervisor's collaborators.
///
/// Most of these are transient: the supervisor logs them and the next pass
/// naturally retries.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum MonitorError {
    /// The worker registry could not be read or written.
    #[error("registry error for {key:?}: {reason}")]
    Registry {
        /// Registry key involved.
        key: String,
        /// Human-readable reason.
        reason: String,
    },

    /// A persisted worker descriptor could not be decoded.
    #[error("could not decode descriptor {key:?}: {source}")]
    Decode {
        /// Registry key involved.
        key: String,
        /// Underlying decoder error.
        #[source]
        source: serde_json::Error,
    },

    /// The lifecycle CLI could not be spawned at all.
    #[error("could not spawn {program:?}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Local I/O failure (audit or worker log reading, procfs scan).
    #[error("i/o error on {path:?}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is missing or malformed.
    #[error("invalid configuration: {reason}")]
    Config {
        /// Human-readable reason.
        reason: String,
    },
}

impl MonitorError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use profilevisor::MonitorError;
    ///
    /// let err = MonitorError::Config { reason: "bad".into() };
    /// assert_eq!(err.as_label(), "monitor_config");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            MonitorError::Registry { .. } => "monitor_registry",
            MonitorError::Decode { .. } => "monitor_decode",
            MonitorError::Spawn { .. } => "monitor_spawn",
            MonitorError::Io { .. } => "monitor_io",
            MonitorError::Config { .. } => "monitor_config",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            MonitorError::Registry { key, reason } => format!("registry {key}: {reason}"),
            MonitorError::Decode { key, source } => format!("decode {key}: {source}"),
            MonitorError::Spawn { program, source } => {
                format!("spawn {}: {source}", program.display())
            }
            MonitorError::Io { path, source } => format!("io {}: {source}", path.display()),
            MonitorError::Config { reason } => format!("config: {reason}"),
        }
    }

    /// Indicates whether the next supervisor pass may succeed where this one failed.
    ///
    /// Returns `false` only for [`MonitorError::Config`].
    ///
    /// # Example
    /// ```
    /// use profilevisor::MonitorError;
    ///
    /// let err = MonitorError::Registry { key: "FM_01".into(), reason: "timeout".into() };
    /// assert!(err.is_transient());
    ///
    /// let cfg = MonitorError::Config { reason: "bad toml".into() };
    /// assert!(!cfg.is_transient());
    /// ```
    pub fn is_transient(&self) -> bool {
        !matches!(self, MonitorError::Config { .. })
    }
}
