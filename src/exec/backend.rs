// src/exec/backend.rs

//! Pluggable command execution.
//!
//! Git queries go through a [`CommandRunner`] instead of calling
//! `tokio::process::Command` directly. Production code uses
//! [`TokioCommandRunner`]; tests swap in a scripted runner that answers from a
//! table keyed by the command line.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::errors::{PullWatchError, Result};
use crate::exec::latch::CancelToken;

/// Boxed, sendable future used at the trait seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Per-command timeout applied to every git invocation.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// A fully described external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub workdir: PathBuf,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new<I, S>(program: &str, args: I, workdir: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            workdir: workdir.into(),
            env: Vec::new(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    /// The command line as a single string, e.g. `git rev-parse HEAD`.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Captured result of a command that ran to completion.
///
/// A non-zero exit is *not* an error at this layer: callers such as
/// `merge-base --is-ancestor` give meaning to specific exit codes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `None` if the process was terminated by a signal.
    pub code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Convenience constructor for a successful run.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            code: Some(0),
        }
    }

    /// Convenience constructor for a run that exited with `code`.
    pub fn exited(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            code: Some(code),
        }
    }

    /// Trimmed stdout.
    pub fn text(&self) -> &str {
        self.stdout.trim()
    }
}

/// Trait abstracting how external commands are executed.
pub trait CommandRunner: Send + Sync {
    /// Run `spec` to completion.
    ///
    /// Fails with an execution error if the program cannot be launched, with
    /// `Timeout` if it outlives `spec.timeout`, and with `Cancelled` if
    /// `cancel` fires first. In the last two cases the child is killed.
    fn run<'a>(
        &'a self,
        spec: CommandSpec,
        cancel: &CancelToken,
    ) -> BoxFuture<'a, Result<CommandOutput>>;
}

/// Runner backed by `tokio::process::Command`.
#[derive(Debug, Clone, Default)]
pub struct TokioCommandRunner;

impl TokioCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for TokioCommandRunner {
    fn run<'a>(
        &'a self,
        spec: CommandSpec,
        cancel: &CancelToken,
    ) -> BoxFuture<'a, Result<CommandOutput>> {
        // Own the token so the future doesn't borrow the caller's.
        let mut cancel = cancel.clone();

        Box::pin(async move {
            let command_line = spec.command_line();
            if cancel.is_fired() {
                return Err(PullWatchError::Cancelled);
            }

            debug!(command = %command_line, dir = %spec.workdir.display(), "executing command");

            let mut cmd = Command::new(&spec.program);
            cmd.args(&spec.args)
                .current_dir(&spec.workdir)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);
            for (key, value) in &spec.env {
                cmd.env(key, value);
            }

            let child = cmd.spawn().map_err(|e| PullWatchError::Execution {
                command: command_line.clone(),
                detail: e.to_string(),
            })?;

            tokio::select! {
                res = tokio::time::timeout(spec.timeout, child.wait_with_output()) => {
                    match res {
                        Ok(Ok(output)) => {
                            let out = CommandOutput {
                                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                                code: output.status.code(),
                            };
                            debug!(command = %command_line, code = ?out.code, "command finished");
                            Ok(out)
                        }
                        Ok(Err(e)) => Err(PullWatchError::Execution {
                            command: command_line,
                            detail: e.to_string(),
                        }),
                        Err(_elapsed) => Err(PullWatchError::Timeout {
                            command: command_line,
                            after: spec.timeout,
                        }),
                    }
                }
                _ = cancel.fired() => {
                    debug!(command = %command_line, "command cancelled; child killed on drop");
                    Err(PullWatchError::Cancelled)
                }
            }
        })
    }
}
