// src/supervisor/signals.rs

//! Whole-tree signal delivery.
//!
//! Children are spawned as leaders of their own process group (a new process
//! group on windows) so one call reaches everything they fork:
//!
//! - unix: `killpg(pgid, SIGTERM | SIGKILL)`;
//! - windows: `taskkill /T` (graceful) and `taskkill /F /T` (forced).
//!
//! A group that no longer exists counts as success.
//!
//! [`ProcessSupervisor`](super::ProcessSupervisor) reaches these through the
//! [`TreeSignals`] trait; [`OsSignals`] is the real implementation.

use std::fmt;

use tokio::process::Command;

use crate::errors::Result;

/// Make the command the leader of a fresh process group.
#[cfg(unix)]
pub fn isolate_group(cmd: &mut Command) {
    cmd.process_group(0);
}

#[cfg(windows)]
pub fn isolate_group(cmd: &mut Command) {
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
}

/// Delivery of stop signals to a whole process tree.
pub trait TreeSignals: Send + Sync + fmt::Debug {
    /// Ask every process in the tree to shut down.
    fn terminate_tree(&self, pgid: u32) -> Result<()>;

    /// Kill every process in the tree.
    fn kill_tree(&self, pgid: u32) -> Result<()>;
}

/// Signals sent through the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSignals;

impl TreeSignals for OsSignals {
    fn terminate_tree(&self, pgid: u32) -> Result<()> {
        terminate_tree(pgid)
    }

    fn kill_tree(&self, pgid: u32) -> Result<()> {
        kill_tree(pgid)
    }
}

/// Ask the whole tree rooted at `pgid` to shut down.
pub fn terminate_tree(pgid: u32) -> Result<()> {
    imp::terminate_tree(pgid)
}

/// Unconditionally kill the whole tree rooted at `pgid`.
pub fn kill_tree(pgid: u32) -> Result<()> {
    imp::kill_tree(pgid)
}

#[cfg(unix)]
mod imp {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;
    use tracing::debug;

    use crate::errors::{PullWatchError, Result};

    pub fn terminate_tree(pgid: u32) -> Result<()> {
        signal_group(pgid, Signal::SIGTERM)
    }

    pub fn kill_tree(pgid: u32) -> Result<()> {
        signal_group(pgid, Signal::SIGKILL)
    }

    fn signal_group(pgid: u32, sig: Signal) -> Result<()> {
        let raw = i32::try_from(pgid).map_err(|_| PullWatchError::Signal {
            pgid,
            detail: "process group id out of range".to_string(),
        })?;

        match killpg(Pid::from_raw(raw), sig) {
            Ok(()) => {
                debug!(pgid, signal = ?sig, "signal sent to process group");
                Ok(())
            }
            Err(Errno::ESRCH) => {
                debug!(pgid, signal = ?sig, "process group already gone");
                Ok(())
            }
            Err(e) => Err(PullWatchError::Signal {
                pgid,
                detail: e.to_string(),
            }),
        }
    }
}

#[cfg(windows)]
mod imp {
    use std::process::Command;

    use tracing::debug;

    use crate::errors::{PullWatchError, Result};

    // taskkill exit code when no matching process exists.
    const TASKKILL_NOT_FOUND: i32 = 128;

    pub fn terminate_tree(pid: u32) -> Result<()> {
        taskkill(pid, &["/T", "/PID"])
    }

    pub fn kill_tree(pid: u32) -> Result<()> {
        taskkill(pid, &["/F", "/T", "/PID"])
    }

    fn taskkill(pid: u32, flags: &[&str]) -> Result<()> {
        let output = Command::new("taskkill")
            .args(flags)
            .arg(pid.to_string())
            .output()
            .map_err(|e| PullWatchError::Signal {
                pgid: pid,
                detail: e.to_string(),
            })?;

        match output.status.code() {
            Some(0) => {
                debug!(pid, ?flags, "taskkill succeeded");
                Ok(())
            }
            Some(TASKKILL_NOT_FOUND) => Ok(()),
            _ => Err(PullWatchError::Signal {
                pgid: pid,
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }
}
