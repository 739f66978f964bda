use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use pullwatch::errors::{PullWatchError, Result};
use pullwatch::exec::{latch, BoxFuture, Latch};
use pullwatch::supervisor::{ExitBackoff, ExitReport, ExitWatch, Supervisor};

#[derive(Debug)]
struct Running {
    generation: u64,
    pid: u32,
    latch: Latch<ExitReport>,
}

#[derive(Debug, Default)]
struct FakeState {
    generation: u64,
    running: Option<Running>,
    last_exit: Option<ExitWatch>,
    backoff: ExitBackoff,
    starts: usize,
    stops: usize,
    force_stops: usize,
    exit_logs: usize,
    fail_next_start: Option<String>,
    ignore_stop: bool,
}

/// A `Supervisor` that never spawns anything.
///
/// Starts, stops and exits are simulated in memory with the same generation
/// and completion-signal semantics as the real supervisor. Clones share
/// state.
#[derive(Debug, Clone, Default)]
pub struct FakeSupervisor {
    state: Arc<Mutex<FakeState>>,
}

impl FakeSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn starts(&self) -> usize {
        self.lock().starts
    }

    pub fn stops(&self) -> usize {
        self.lock().stops
    }

    pub fn force_stops(&self) -> usize {
        self.lock().force_stops
    }

    /// How many unexplained-exit diagnostics the backoff let through.
    pub fn exit_logs(&self) -> usize {
        self.lock().exit_logs
    }

    /// The next `start` fails as if the program could not be spawned.
    pub fn fail_next_start(&self, msg: &str) {
        self.lock().fail_next_start = Some(msg.to_string());
    }

    /// `stop` returns without the process ever exiting.
    pub fn ignore_stop(&self, on: bool) {
        self.lock().ignore_stop = on;
    }

    /// Simulate the running process exiting on its own.
    ///
    /// Returns `false` if nothing was running.
    pub fn crash(&self, code: i32) -> bool {
        let mut state = self.lock();
        match state.running.take() {
            Some(run) => {
                run.latch.fire(ExitReport {
                    generation: run.generation,
                    pid: run.pid,
                    code: Some(code),
                    stop_requested: false,
                });
                true
            }
            None => false,
        }
    }

    fn finish(run: Running) {
        run.latch.fire(ExitReport {
            generation: run.generation,
            pid: run.pid,
            code: None,
            stop_requested: true,
        });
    }
}

impl Supervisor for FakeSupervisor {
    fn start(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.backoff.reset();

            if let Some(prev) = state.running.take() {
                Self::finish(prev);
            }

            if let Some(msg) = state.fail_next_start.take() {
                return Err(PullWatchError::Spawn {
                    command: "fake".to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, msg),
                });
            }

            state.generation += 1;
            state.starts += 1;
            let generation = state.generation;
            let pid = 1000 + generation as u32;

            let (exit_latch, waiter) = latch::<ExitReport>();
            state.last_exit = Some(ExitWatch::new(generation, pid, waiter));
            state.running = Some(Running {
                generation,
                pid,
                latch: exit_latch,
            });
            Ok(())
        })
    }

    fn stop(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.stops += 1;
            if state.ignore_stop {
                return Ok(());
            }
            if let Some(run) = state.running.take() {
                Self::finish(run);
            }
            Ok(())
        })
    }

    fn force_stop(&self) -> Result<()> {
        let mut state = self.lock();
        state.force_stops += 1;
        if let Some(run) = state.running.take() {
            Self::finish(run);
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.lock().running.is_some()
    }

    fn pid(&self) -> Option<u32> {
        self.lock().running.as_ref().map(|run| run.pid)
    }

    fn current_generation(&self) -> u64 {
        self.lock().generation
    }

    fn exit_watch(&self) -> Option<ExitWatch> {
        self.lock().last_exit.clone()
    }

    fn should_log_exit(&self, now: Instant) -> bool {
        let mut state = self.lock();
        let log = state.backoff.record_exit(now);
        if log {
            state.exit_logs += 1;
        }
        log
    }

    fn command_line(&self) -> String {
        "fake-server --port 8080".to_string()
    }
}
