//! # profile-monitor
//!
//! Runs the worker watchdog until SIGINT/SIGTERM/SIGQUIT.
//!
//! ```text
//! profile-monitor [config.toml]
//! ```
//! Without an argument the built-in defaults are used. `RUST_LOG` controls the
//! diagnostics printed to stderr; worker and supervisor records go to the log
//! pipeline under `log.log_dir`.

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use profilevisor::{Config, LoggingContext, Supervisor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cfg = match std::env::args_os().nth(1) {
        Some(path) => Config::load(&path)
            .with_context(|| format!("failed to load {}", path.to_string_lossy()))?,
        None => Config::default(),
    };

    let ctx = LoggingContext::init(&cfg.log).context("failed to initialize logging")?;
    let log = ctx.facade();
    log.syslog("Profile monitor started");
    tracing::info!(
        poll_interval = ?cfg.monitor.poll_interval,
        registry = %cfg.monitor.registry_dir.display(),
        "supervisor starting"
    );

    let sup = Supervisor::builder(cfg.monitor, log).build();
    let cause = sup.run(CancellationToken::new()).await;
    tracing::info!(%cause, "supervisor stopped");

    sup.close().await;
    let report = ctx.shutdown().await;
    if !report.drained {
        tracing::warn!("log queue not drained before shutdown");
    }
    Ok(())
}
