// src/supervisor/process.rs

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::errors::{PullWatchError, Result};
use crate::exec::{latch, BoxFuture, Latch};
use crate::supervisor::backoff::ExitBackoff;
use crate::supervisor::signals::{self, OsSignals, TreeSignals};
use crate::supervisor::{ExitReport, ExitWatch, StopPolicy, Supervisor};

/// How long `start` waits for a force-killed predecessor to be reaped.
const PREDECESSOR_REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle for the currently running generation.
#[derive(Debug)]
struct LiveProcess {
    generation: u64,
    pgid: u32,
    stop_requested: Arc<AtomicBool>,
    exit: ExitWatch,
}

/// State shared between the supervisor and the per-generation exit waiter.
#[derive(Debug, Default)]
struct SupervisorState {
    generation: u64,
    current: Option<LiveProcess>,
    last_exit: Option<ExitWatch>,
    backoff: ExitBackoff,
}

/// Spawns and stops the supervised command.
///
/// The child inherits pullwatch's stdin/stdout/stderr and working directory,
/// and leads its own process group so stop signals reach its descendants.
/// Each `start` mints a new generation with its own completion signal; a
/// background task waits on the OS process and fires that signal.
///
/// A generation's group is swept with a kill once its leader is reaped, so
/// descendants never outlive the process they were started under.
#[derive(Debug)]
pub struct ProcessSupervisor {
    command: Vec<String>,
    policy: StopPolicy,
    signals: Arc<dyn TreeSignals>,
    state: Arc<Mutex<SupervisorState>>,
    // Serialises start/stop so two lifecycle operations never interleave.
    lifecycle: tokio::sync::Mutex<()>,
}

impl ProcessSupervisor {
    pub fn new(command: Vec<String>, policy: StopPolicy) -> Result<Self> {
        Self::with_signals(command, policy, OsSignals)
    }

    /// Like [`new`](Self::new), delivering stop signals through `signals`.
    pub fn with_signals(
        command: Vec<String>,
        policy: StopPolicy,
        signals: impl TreeSignals + 'static,
    ) -> Result<Self> {
        if command.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(PullWatchError::ConfigError(
                "no command provided".to_string(),
            ));
        }

        Ok(Self {
            command,
            policy,
            signals: Arc::new(signals),
            state: Arc::new(Mutex::new(SupervisorState::default())),
            lifecycle: tokio::sync::Mutex::new(()),
        })
    }

    pub fn policy(&self) -> StopPolicy {
        self.policy
    }

    /// Snapshot of the exit backoff, for inspection.
    pub fn backoff(&self) -> ExitBackoff {
        self.lock().backoff.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SupervisorState> {
        lock_state(&self.state)
    }

    async fn start_inner(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;

        let predecessor = {
            let mut state = self.lock();
            state.backoff.reset();
            state.current.take()
        };
        if let Some(prev) = predecessor {
            self.retire(prev).await;
        }

        let (program, args) = match self.command.split_first() {
            Some(split) => split,
            None => return Err(PullWatchError::ConfigError("no command provided".to_string())),
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        signals::isolate_group(&mut cmd);

        let child = cmd.spawn().map_err(|source| PullWatchError::Spawn {
            command: self.command_line(),
            source,
        })?;

        let Some(pid) = child.id() else {
            return Err(PullWatchError::Spawn {
                command: self.command_line(),
                source: std::io::Error::other("process exited before its id was read"),
            });
        };

        let (exit_latch, exit_waiter) = latch::<ExitReport>();
        let stop_requested = Arc::new(AtomicBool::new(false));

        let generation = {
            let mut state = self.lock();
            state.generation += 1;
            let generation = state.generation;
            let watch = ExitWatch::new(generation, pid, exit_waiter);
            state.current = Some(LiveProcess {
                generation,
                pgid: pid,
                stop_requested: Arc::clone(&stop_requested),
                exit: watch.clone(),
            });
            state.last_exit = Some(watch);
            state.backoff.reset();
            generation
        };

        info!(pid, generation, command = %self.command_line(), "started process");

        tokio::spawn(wait_for_exit(
            child,
            generation,
            pid,
            stop_requested,
            exit_latch,
            Arc::clone(&self.state),
            Arc::clone(&self.signals),
        ));

        Ok(())
    }

    /// Force-kill a previous generation and give it a moment to be reaped.
    async fn retire(&self, prev: LiveProcess) {
        prev.stop_requested.store(true, Ordering::SeqCst);

        info!(pid = prev.pgid, generation = prev.generation, "killing previous process before restart");
        if let Err(e) = self.signals.kill_tree(prev.pgid) {
            warn!(pid = prev.pgid, error = %e, "failed to clean up previous process");
        }

        let mut exit = prev.exit;
        if tokio::time::timeout(PREDECESSOR_REAP_TIMEOUT, exit.exited())
            .await
            .is_err()
        {
            warn!(pid = prev.pgid, "previous process not reaped after kill");
        }
    }

    async fn stop_inner(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;

        let (pgid, mut exit) = {
            let state = self.lock();
            match state.current.as_ref() {
                None => return Ok(()),
                Some(live) => {
                    live.stop_requested.store(true, Ordering::SeqCst);
                    (live.pgid, live.exit.clone())
                }
            }
        };

        if !self.policy.graceful {
            return self.kill_group(pgid);
        }

        info!(pid = pgid, "gracefully stopping process");
        if let Err(e) = self.signals.terminate_tree(pgid) {
            warn!(pid = pgid, error = %e, "terminate signal failed; force killing");
            return self.kill_group(pgid);
        }

        match tokio::time::timeout(self.policy.timeout, exit.exited()).await {
            Ok(report) => {
                debug!(pid = pgid, code = ?report.code, "process stopped gracefully");
                // Descendants that ignored the terminate signal.
                self.signals.kill_tree(pgid)
            }
            Err(_) => {
                info!(
                    pid = pgid,
                    timeout = ?self.policy.timeout,
                    "process ignored terminate signal; force killing"
                );
                self.kill_group(pgid)
            }
        }
    }

    /// Kill `pgid` even if its leader has been reaped in the meantime.
    fn kill_group(&self, pgid: u32) -> Result<()> {
        info!(pid = pgid, "force killing process");
        self.signals.kill_tree(pgid)
    }
}

impl Supervisor for ProcessSupervisor {
    fn start(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.start_inner())
    }

    fn stop(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.stop_inner())
    }

    fn force_stop(&self) -> Result<()> {
        let pgid = {
            let state = self.lock();
            match state.current.as_ref() {
                None => return Ok(()),
                Some(live) => {
                    live.stop_requested.store(true, Ordering::SeqCst);
                    live.pgid
                }
            }
        };

        self.kill_group(pgid)
    }

    fn is_running(&self) -> bool {
        self.lock().current.is_some()
    }

    fn pid(&self) -> Option<u32> {
        self.lock().current.as_ref().map(|live| live.pgid)
    }

    fn current_generation(&self) -> u64 {
        self.lock().generation
    }

    fn exit_watch(&self) -> Option<ExitWatch> {
        self.lock().last_exit.clone()
    }

    fn should_log_exit(&self, now: Instant) -> bool {
        self.lock().backoff.record_exit(now)
    }

    fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        let live = self.lock().current.take();
        if let Some(live) = live {
            live.stop_requested.store(true, Ordering::SeqCst);
            let _ = self.signals.kill_tree(live.pgid);
        }
    }
}

fn lock_state(state: &Mutex<SupervisorState>) -> MutexGuard<'_, SupervisorState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Background waiter for one generation.
///
/// Sweeps the group once the leader is reaped, then clears the running
/// handle (if it still belongs to this generation) and fires the completion
/// signal under the same lock, so observers never see a fired signal while
/// the supervisor still reports the process as running.
async fn wait_for_exit(
    mut child: Child,
    generation: u64,
    pid: u32,
    stop_requested: Arc<AtomicBool>,
    exit_latch: Latch<ExitReport>,
    state: Arc<Mutex<SupervisorState>>,
    signals: Arc<dyn TreeSignals>,
) {
    let code = match child.wait().await {
        Ok(status) => status.code(),
        Err(e) => {
            warn!(pid, generation, error = %e, "failed waiting for process");
            None
        }
    };

    // The group id stays reserved while any member is alive.
    if let Err(e) = signals.kill_tree(pid) {
        warn!(pid, generation, error = %e, "failed to clean up leftover processes");
    }

    let report = ExitReport {
        generation,
        pid,
        code,
        stop_requested: stop_requested.load(Ordering::SeqCst),
    };

    {
        let mut guard = lock_state(&state);
        if guard
            .current
            .as_ref()
            .is_some_and(|live| live.generation == generation)
        {
            guard.current = None;
        }
        exit_latch.fire(report);
    }

    debug!(pid, generation, code = ?code, stop_requested = report.stop_requested, "process exited");
}
