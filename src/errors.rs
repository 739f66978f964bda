// src/errors.rs

//! Crate-wide error type.
//!
//! Each variant maps onto one failure category of the watcher. The loop
//! decides per category whether an error is fatal (startup, final shutdown)
//! or logged and retried on the next poll tick.

use std::time::Duration;

use thiserror::Error;

use crate::types::CommitRef;

#[derive(Error, Debug)]
pub enum PullWatchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("no upstream branch configured")]
    NoUpstream,

    #[error("remote unreachable: {0}")]
    RemoteUnreachable(String),

    #[error("command `{command}` failed: {detail}")]
    Execution { command: String, detail: String },

    #[error("commit {0} is missing from the local object store")]
    MissingCommit(CommitRef),

    #[error("inconsistent ancestry: {local} and {remote} are each an ancestor of the other")]
    AncestryContradiction { local: CommitRef, remote: CommitRef },

    #[error("failed to pull changes: {0}")]
    Pull(String),

    #[error("failed to start command `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to signal process group {pgid}: {detail}")]
    Signal { pgid: u32, detail: String },

    #[error("process failed to terminate within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("command `{command}` timed out after {after:?}")]
    Timeout { command: String, after: Duration },

    #[error("operation cancelled by shutdown")]
    Cancelled,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PullWatchError {
    /// True when the error only reflects a shutdown in progress.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, PullWatchError::Cancelled)
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PullWatchError>;
