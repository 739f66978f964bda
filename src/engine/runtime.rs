// src/engine/runtime.rs

use std::fmt;
use std::time::Instant;

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::errors::{PullWatchError, Result};
use crate::exec::CancelToken;
use crate::git::CommitOracle;
use crate::supervisor::{ExitReport, ExitWatch, Supervisor};
use crate::types::{CommitRef, Comparison};

use super::core::{ExitDisposition, Phase, WatchAction, WatchCore};
use super::{WatchOptions, SETTLE_DELAY, SHUTDOWN_TIMEOUT};

/// Drives the watch in response to timer, exit and shutdown events.
///
/// This is the async IO shell around [`WatchCore`]: it reads heads through a
/// [`CommitOracle`], starts and stops the child through a [`Supervisor`], and
/// feeds what it sees into the core.
pub struct WatchLoop<O, S> {
    oracle: O,
    supervisor: S,
    core: WatchCore,
    shutdown: CancelToken,
}

impl<O, S> fmt::Debug for WatchLoop<O, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchLoop")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<O: CommitOracle, S: Supervisor> WatchLoop<O, S> {
    /// `shutdown` doubles as the cancellation token for in-flight git
    /// commands.
    pub fn new(oracle: O, supervisor: S, options: WatchOptions, shutdown: CancelToken) -> Self {
        Self {
            oracle,
            supervisor,
            core: WatchCore::new(options),
            shutdown,
        }
    }

    /// Run until shutdown.
    ///
    /// Startup failures and failures while stopping the child at shutdown are
    /// returned; errors on individual poll ticks are logged and retried on
    /// the next tick.
    pub async fn run(mut self) -> Result<()> {
        match self.startup().await {
            Ok(()) => {}
            Err(err) if err.is_cancellation() => return self.shutdown().await,
            Err(err) => return Err(err),
        }

        let interval = self.core.options().poll_interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut exit_watch = self.next_exit_watch();
        let mut shutdown_signal = self.shutdown.clone();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.poll_tick().await {
                        if err.is_cancellation() {
                            debug!("update check aborted by shutdown");
                        } else {
                            warn!(error = %err, "error during update check");
                        }
                    }
                    exit_watch = self.next_exit_watch();
                }

                report = wait_for_exit(&mut exit_watch) => {
                    exit_watch = None;
                    self.handle_exit(report);
                }

                _ = shutdown_signal.fired() => {
                    return self.shutdown().await;
                }
            }
        }
    }

    async fn startup(&mut self) -> Result<()> {
        let local = self.oracle.local_head(&self.shutdown).await?;
        let remote = self.oracle.remote_head(&self.shutdown).await?;
        self.core.observe(&local, &remote);

        info!(interval = ?self.core.options().poll_interval, "starting watch");
        info!(commit = %local, "local commit");
        info!(commit = %remote, "remote commit");
        info!(command = %self.supervisor.command_line(), "command");

        let comparison = self.oracle.compare(&local, &remote, &self.shutdown).await?;
        log_classification(&local, &remote, comparison);

        let actions = self
            .core
            .classify(&local, &remote, comparison, Phase::Startup)?;

        if !actions.contains(&WatchAction::Start) {
            info!("not starting command on startup (use --run-on-start to override)");
        } else if self.core.options().run_on_start {
            info!("starting command on startup");
        }

        self.apply(&actions).await
    }

    async fn poll_tick(&mut self) -> Result<()> {
        self.remind_exit();

        let local = self.oracle.local_head(&self.shutdown).await?;
        let remote = self.oracle.remote_head(&self.shutdown).await?;
        if self.core.observe(&local, &remote) {
            debug!(commit = %remote, "remote head moved");
        }

        let comparison = self.oracle.compare(&local, &remote, &self.shutdown).await?;
        log_classification(&local, &remote, comparison);

        let actions = self.core.classify(&local, &remote, comparison, Phase::Poll)?;
        if actions.is_empty() {
            return Ok(());
        }

        info!(from = %local, to = %remote, "changes detected");
        self.apply(&actions).await
    }

    /// Execute actions in order, stopping at the first hard failure.
    async fn apply(&mut self, actions: &[WatchAction]) -> Result<()> {
        for action in actions {
            match action {
                WatchAction::Pull => {
                    let output = self.oracle.pull(&self.shutdown).await?;
                    info!("pulled changes");
                    debug!(%output, "git pull output");
                }
                WatchAction::Start => {
                    self.supervisor.start().await?;
                    self.core.on_started();
                }
                WatchAction::Restart => {
                    if let Err(err) = self.supervisor.stop().await {
                        error!(pid = ?self.supervisor.pid(), error = %err, "error stopping process");
                    }
                    tokio::time::sleep(SETTLE_DELAY).await;
                    self.supervisor.start().await?;
                    self.core.on_started();
                }
            }
        }
        Ok(())
    }

    fn handle_exit(&mut self, report: ExitReport) {
        let current = self.supervisor.current_generation();
        match self.core.on_exit(&report, current) {
            ExitDisposition::Stale => {
                debug!(generation = report.generation, current, "ignoring exit of replaced process");
            }
            ExitDisposition::Requested => {
                debug!(pid = report.pid, code = ?report.code, "process exited after stop request");
            }
            ExitDisposition::Unexplained => self.log_exit(report.pid, report.code),
        }
    }

    /// While the child stays dead, repeat the exit notice at the backoff pace.
    fn remind_exit(&mut self) {
        if !self.core.state().exited_unexplained || self.supervisor.is_running() {
            return;
        }
        if let Some(report) = self.supervisor.exit_watch().and_then(|w| w.report()) {
            self.log_exit(report.pid, report.code);
        }
    }

    fn log_exit(&self, pid: u32, code: Option<i32>) {
        if self.supervisor.should_log_exit(Instant::now()) {
            info!(pid, code = ?code, "process exited, waiting for changes before restart");
        }
    }

    fn next_exit_watch(&self) -> Option<ExitWatch> {
        self.supervisor
            .exit_watch()
            .filter(|watch| self.core.is_unhandled(watch.generation()))
    }

    async fn shutdown(&mut self) -> Result<()> {
        info!("shutting down");

        if !self.supervisor.is_running() {
            return Ok(());
        }

        let watch = self.supervisor.exit_watch();
        if let Err(err) = self.supervisor.stop().await {
            error!(pid = ?self.supervisor.pid(), error = %err, "error stopping process");
            return Err(err);
        }

        let Some(mut watch) = watch else {
            return Ok(());
        };

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, watch.exited()).await {
            Ok(report) => {
                debug!(pid = report.pid, code = ?report.code, "process terminated");
                Ok(())
            }
            Err(_) => Err(PullWatchError::ShutdownTimeout(SHUTDOWN_TIMEOUT)),
        }
    }
}

async fn wait_for_exit(watch: &mut Option<ExitWatch>) -> ExitReport {
    match watch {
        Some(watch) => watch.exited().await,
        None => std::future::pending().await,
    }
}

fn log_classification(local: &CommitRef, remote: &CommitRef, comparison: Comparison) {
    debug!(%local, %remote, "comparing commits");
    match comparison {
        Comparison::LocalBehindRemote => debug!("local commit is behind remote commit, pulling changes"),
        Comparison::LocalAheadOfRemote => debug!("local commit is ahead of remote commit, not pulling"),
        Comparison::Diverged => debug!("local and remote commits have diverged, not pulling"),
        Comparison::Equal => debug!("local and remote commits are the same, not pulling"),
        Comparison::Unknown => debug!("commit comparison result is unknown"),
    }
}
