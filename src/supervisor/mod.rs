// src/supervisor/mod.rs

//! Lifecycle of the single supervised child process.
//!
//! - [`process`] holds [`ProcessSupervisor`], the production implementation.
//! - [`signals`] delivers terminate/kill to a whole process tree.
//! - [`backoff`] throttles diagnostics for a child that keeps exiting.
//!
//! The watch loop only talks to the [`Supervisor`] trait so tests can swap in
//! a fake that never spawns anything.

use std::time::{Duration, Instant};

use crate::errors::Result;
use crate::exec::{BoxFuture, LatchWaiter};

pub mod backoff;
pub mod process;
pub mod signals;

pub use backoff::ExitBackoff;
pub use process::ProcessSupervisor;
pub use signals::{OsSignals, TreeSignals};

/// How `stop` treats the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPolicy {
    /// Send a terminate signal first and wait before killing.
    pub graceful: bool,
    /// How long to wait for a graceful exit.
    pub timeout: Duration,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self {
            graceful: false,
            timeout: Duration::from_secs(5),
        }
    }
}

/// What the completion signal of one process generation carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    pub generation: u64,
    pub pid: u32,
    /// Exit code, `None` when killed by a signal.
    pub code: Option<i32>,
    /// Whether `stop`/`force_stop`/`start` asked for this exit.
    pub stop_requested: bool,
}

/// Handle on the completion signal of one process generation.
///
/// Fires exactly once, when the OS process has exited and been reaped. Any
/// number of clones may wait on it, before or after it fires.
#[derive(Debug, Clone)]
pub struct ExitWatch {
    generation: u64,
    pid: u32,
    waiter: LatchWaiter<ExitReport>,
}

impl ExitWatch {
    pub fn new(generation: u64, pid: u32, waiter: LatchWaiter<ExitReport>) -> Self {
        Self {
            generation,
            pid,
            waiter,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn has_exited(&self) -> bool {
        self.waiter.is_fired()
    }

    pub fn report(&self) -> Option<ExitReport> {
        self.waiter.peek()
    }

    pub async fn exited(&mut self) -> ExitReport {
        self.waiter.fired().await
    }
}

/// Owner of at most one live process tree.
pub trait Supervisor: Send + Sync {
    /// Start a new generation, force-killing any previous one first.
    fn start(&self) -> BoxFuture<'_, Result<()>>;

    /// Stop the running child; no-op when idle.
    fn stop(&self) -> BoxFuture<'_, Result<()>>;

    /// Kill the running child's whole tree without waiting.
    fn force_stop(&self) -> Result<()>;

    fn is_running(&self) -> bool;

    /// Process (group) id of the running child.
    fn pid(&self) -> Option<u32>;

    /// Generation number of the most recent start, 0 before the first.
    fn current_generation(&self) -> u64;

    /// Completion handle of the most recent generation, running or not.
    fn exit_watch(&self) -> Option<ExitWatch>;

    /// Apply the exit-backoff policy to an unexplained exit seen at `now`.
    ///
    /// Returns whether a diagnostic should be logged.
    fn should_log_exit(&self, now: Instant) -> bool;

    /// The supervised command line, for display.
    fn command_line(&self) -> String;
}
