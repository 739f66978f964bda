// src/engine/core.rs

//! Pure decision state machine for the watch loop.
//!
//! `WatchCore` turns observations (commit refs, comparison results, exit
//! reports) into [`WatchAction`]s. It performs no IO and owns no Tokio types,
//! so every branch can be unit tested directly.

use crate::errors::{PullWatchError, Result};
use crate::supervisor::ExitReport;
use crate::types::{CommitRef, Comparison};

use super::WatchOptions;

/// Step to perform, in order, after a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchAction {
    /// `git pull`; a failure aborts the remaining actions.
    Pull,
    /// Start the command (nothing is expected to be running).
    Start,
    /// Stop the running command, settle, start it again.
    Restart,
}

/// Whether a classification happens at startup or on a poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Startup,
    Poll,
}

/// How the loop should treat a fired completion signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDisposition {
    /// Signal from a generation that has since been replaced.
    Stale,
    /// The exit was asked for by stop/restart.
    Requested,
    /// The child exited or crashed on its own.
    Unexplained,
}

/// Orchestrator-owned state, reused across poll iterations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchState {
    pub last_local: Option<CommitRef>,
    pub last_remote: Option<CommitRef>,
    /// The current child exited without being asked to.
    pub exited_unexplained: bool,
    /// Newest generation whose completion signal has been handled.
    pub handled_generation: u64,
}

#[derive(Debug)]
pub struct WatchCore {
    state: WatchState,
    options: WatchOptions,
}

impl WatchCore {
    pub fn new(options: WatchOptions) -> Self {
        Self {
            state: WatchState::default(),
            options,
        }
    }

    pub fn state(&self) -> &WatchState {
        &self.state
    }

    pub fn options(&self) -> &WatchOptions {
        &self.options
    }

    /// Record freshly read heads. Returns true if the remote head moved.
    pub fn observe(&mut self, local: &CommitRef, remote: &CommitRef) -> bool {
        let moved = self
            .state
            .last_remote
            .as_ref()
            .is_some_and(|prev| prev != remote);
        self.state.last_local = Some(local.clone());
        self.state.last_remote = Some(remote.clone());
        moved
    }

    /// Decide what to do about a classification.
    ///
    /// `Unknown` is always an error; it is never mapped to a safe default.
    pub fn classify(
        &self,
        local: &CommitRef,
        remote: &CommitRef,
        comparison: Comparison,
        phase: Phase,
    ) -> Result<Vec<WatchAction>> {
        let actions = match (comparison, phase) {
            (Comparison::Unknown, _) => {
                return Err(PullWatchError::AncestryContradiction {
                    local: local.clone(),
                    remote: remote.clone(),
                });
            }
            (Comparison::LocalBehindRemote, Phase::Startup) => {
                vec![WatchAction::Pull, WatchAction::Start]
            }
            (Comparison::LocalBehindRemote, Phase::Poll) if self.options.no_restart => {
                vec![WatchAction::Pull]
            }
            (Comparison::LocalBehindRemote, Phase::Poll) => {
                vec![WatchAction::Pull, WatchAction::Restart]
            }
            (_, Phase::Startup) if self.options.run_on_start => vec![WatchAction::Start],
            _ => Vec::new(),
        };
        Ok(actions)
    }

    /// A new generation is running; forget the previous exit.
    pub fn on_started(&mut self) {
        self.state.exited_unexplained = false;
    }

    /// Classify a fired completion signal.
    ///
    /// `current_generation` is the supervisor's newest generation; reports
    /// from anything older are stale.
    pub fn on_exit(&mut self, report: &ExitReport, current_generation: u64) -> ExitDisposition {
        self.state.handled_generation = self.state.handled_generation.max(report.generation);

        if report.generation != current_generation {
            return ExitDisposition::Stale;
        }
        if report.stop_requested {
            return ExitDisposition::Requested;
        }

        self.state.exited_unexplained = true;
        ExitDisposition::Unexplained
    }

    /// Whether the given generation still needs its completion handled.
    pub fn is_unhandled(&self, generation: u64) -> bool {
        generation > self.state.handled_generation
    }
}
