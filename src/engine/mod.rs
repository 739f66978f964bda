// src/engine/mod.rs

//! Orchestration engine for pullwatch.
//!
//! The watch loop reacts to three event sources, one event at a time:
//! - the poll timer (re-read heads, classify, maybe pull and restart);
//! - the supervised process's completion signal;
//! - the shutdown signal.
//!
//! Decisions live in the pure [`core::WatchCore`]; the async shell in
//! [`runtime::WatchLoop`] performs the git and process IO.

use std::time::Duration;

use crate::config::WatchConfig;

pub mod core;
pub mod runtime;

pub use core::{ExitDisposition, Phase, WatchAction, WatchCore, WatchState};
pub use runtime::WatchLoop;

/// Pause between stopping the old child and starting the new one, so the OS
/// can release ports and file handles.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Upper bound on waiting for the child to exit once shutdown was requested.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Loop behaviour derived from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    pub poll_interval: Duration,
    /// Start the command at startup even if the repository is up to date.
    pub run_on_start: bool,
    /// Pull new commits without restarting the command.
    pub no_restart: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            poll_interval: crate::config::DEFAULT_POLL_INTERVAL,
            run_on_start: false,
            no_restart: false,
        }
    }
}

impl From<&WatchConfig> for WatchOptions {
    fn from(cfg: &WatchConfig) -> Self {
        Self {
            poll_interval: cfg.poll_interval,
            run_on_start: cfg.run_on_start,
            no_restart: cfg.no_restart,
        }
    }
}
