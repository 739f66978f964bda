// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod git;
pub mod logging;
pub mod supervisor;
pub mod types;

use tracing::{debug, error, info};

use crate::config::WatchConfig;
use crate::engine::{WatchLoop, WatchOptions};
use crate::errors::Result;
use crate::exec::{latch, Latch};
use crate::git::GitOracle;
use crate::supervisor::{ProcessSupervisor, StopPolicy};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - the git oracle for `config.git_dir`
/// - the process supervisor for `config.command`
/// - Ctrl-C / SIGTERM handling
/// - the watch loop
pub async fn run(config: WatchConfig) -> Result<()> {
    let oracle = GitOracle::new(config.git_dir.clone());
    let supervisor = ProcessSupervisor::new(
        config.command.clone(),
        StopPolicy {
            graceful: config.graceful_stop,
            timeout: config.stop_timeout,
        },
    )?;
    debug!(git_dir = %config.git_dir.display(), "watching repository");

    let (shutdown, shutdown_waiter) = latch::<()>();
    tokio::spawn(forward_shutdown_signal(shutdown));

    let watch = WatchLoop::new(
        oracle,
        supervisor,
        WatchOptions::from(&config),
        shutdown_waiter,
    );
    watch.run().await
}

/// Fire `shutdown` on the first interrupt or terminate signal.
async fn forward_shutdown_signal(shutdown: Latch<()>) {
    match wait_for_signal().await {
        Ok(name) => {
            info!(signal = name, "received shutdown signal");
            shutdown.fire(());
        }
        Err(e) => error!(error = %e, "failed to listen for shutdown signals"),
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|_| "SIGINT"),
        _ = term.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|_| "ctrl-c")
}
