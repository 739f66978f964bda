use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use pullwatch::errors::{PullWatchError, Result};
use pullwatch::exec::{BoxFuture, CancelToken, CommandOutput, CommandRunner, CommandSpec};

/// One canned answer.
#[derive(Debug, Clone)]
enum Reply {
    Output(CommandOutput),
    LaunchFailure(String),
    /// Block until cancelled.
    Hang,
}

#[derive(Debug, Default)]
struct Script {
    replies: HashMap<String, Vec<Reply>>,
    calls: Vec<String>,
    specs: Vec<CommandSpec>,
}

/// A `CommandRunner` that answers from a table keyed by command line.
///
/// Registering the same command line several times queues the answers in
/// order; the last one repeats forever. Unregistered commands fail with an
/// execution error naming the command.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRunner {
    script: Arc<Mutex<Script>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, command_line: &str, output: CommandOutput) -> Self {
        self.push(command_line, Reply::Output(output));
        self
    }

    /// Shorthand for a zero exit with `stdout`.
    pub fn ok(self, command_line: &str, stdout: &str) -> Self {
        self.on(command_line, CommandOutput::ok(stdout))
    }

    /// Shorthand for a non-zero exit with `stderr`.
    pub fn fail(self, command_line: &str, code: i32, stderr: &str) -> Self {
        self.on(command_line, CommandOutput::exited(code, stderr))
    }

    /// The program cannot be launched at all.
    pub fn launch_failure(self, command_line: &str, detail: &str) -> Self {
        self.push(command_line, Reply::LaunchFailure(detail.to_string()));
        self
    }

    /// The command never finishes unless cancelled.
    pub fn hang(self, command_line: &str) -> Self {
        self.push(command_line, Reply::Hang);
        self
    }

    /// Command lines run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, command_line: &str) -> usize {
        self.calls().iter().filter(|c| *c == command_line).count()
    }

    /// Full specs run so far, in order.
    pub fn specs(&self) -> Vec<CommandSpec> {
        self.script.lock().unwrap().specs.clone()
    }

    fn push(&self, command_line: &str, reply: Reply) {
        self.script
            .lock()
            .unwrap()
            .replies
            .entry(command_line.to_string())
            .or_default()
            .push(reply);
    }

    fn next_reply(&self, spec: &CommandSpec) -> Option<Reply> {
        let line = spec.command_line();
        let mut script = self.script.lock().unwrap();
        script.calls.push(line.clone());
        script.specs.push(spec.clone());

        let queue = script.replies.get_mut(&line)?;
        if queue.len() > 1 {
            Some(queue.remove(0))
        } else {
            queue.first().cloned()
        }
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(
        &'a self,
        spec: CommandSpec,
        cancel: &CancelToken,
    ) -> BoxFuture<'a, Result<CommandOutput>> {
        let mut cancel = cancel.clone();
        Box::pin(async move {
            if cancel.is_fired() {
                return Err(PullWatchError::Cancelled);
            }

            match self.next_reply(&spec) {
                Some(Reply::Output(out)) => Ok(out),
                Some(Reply::LaunchFailure(detail)) => Err(PullWatchError::Execution {
                    command: spec.command_line(),
                    detail,
                }),
                Some(Reply::Hang) => {
                    cancel.fired().await;
                    Err(PullWatchError::Cancelled)
                }
                None => Err(PullWatchError::Execution {
                    command: spec.command_line(),
                    detail: "unexpected command in test script".to_string(),
                }),
            }
        })
    }
}
