// src/git/oracle.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::errors::{PullWatchError, Result};
use crate::exec::{
    BoxFuture, CancelToken, CommandOutput, CommandRunner, CommandSpec, TokioCommandRunner,
    DEFAULT_COMMAND_TIMEOUT,
};
use crate::types::{CommitRef, Comparison};

/// Answers questions about the local and remote branch heads.
///
/// Every operation takes a [`CancelToken`]; when it fires, in-flight git
/// commands are killed and the operation fails with `Cancelled`.
pub trait CommitOracle: Send + Sync {
    /// Commit currently checked out (`HEAD`).
    fn local_head<'a>(&'a self, cancel: &CancelToken) -> BoxFuture<'a, Result<CommitRef>>;

    /// Head of the configured upstream branch, as reported by the remote.
    fn remote_head<'a>(&'a self, cancel: &CancelToken) -> BoxFuture<'a, Result<CommitRef>>;

    /// Whether `ancestor` is reachable from `descendant`.
    ///
    /// Commits missing from the local object store trigger one fetch before
    /// the check; if still missing the result is `MissingCommit`.
    fn is_ancestor<'a>(
        &'a self,
        ancestor: &'a CommitRef,
        descendant: &'a CommitRef,
        cancel: &CancelToken,
    ) -> BoxFuture<'a, Result<bool>>;

    /// Update remote-tracking refs and objects.
    fn fetch<'a>(&'a self, cancel: &CancelToken) -> BoxFuture<'a, Result<()>>;

    /// Integrate the upstream branch into the working tree.
    fn pull<'a>(&'a self, cancel: &CancelToken) -> BoxFuture<'a, Result<String>>;

    /// Classify `local` against `remote`.
    ///
    /// Read-only: never pulls. Identical refs are `Equal` without touching
    /// the repository. Two refs that are each other's ancestor are reported
    /// as `AncestryContradiction` rather than resolved to a guess.
    fn compare<'a>(
        &'a self,
        local: &'a CommitRef,
        remote: &'a CommitRef,
        cancel: &CancelToken,
    ) -> BoxFuture<'a, Result<Comparison>> {
        let cancel = cancel.clone();

        Box::pin(async move {
            if local == remote {
                return Ok(Comparison::Equal);
            }

            let local_in_remote = self.is_ancestor(local, remote, &cancel).await?;
            let remote_in_local = self.is_ancestor(remote, local, &cancel).await?;

            match Comparison::from_ancestry(local_in_remote, remote_in_local) {
                Comparison::Unknown => Err(PullWatchError::AncestryContradiction {
                    local: local.clone(),
                    remote: remote.clone(),
                }),
                other => Ok(other),
            }
        })
    }
}

/// [`CommitOracle`] backed by the `git` command line.
#[derive(Debug, Clone)]
pub struct GitOracle<R = TokioCommandRunner> {
    runner: R,
    dir: PathBuf,
    timeout: Duration,
}

impl GitOracle<TokioCommandRunner> {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_runner(dir, TokioCommandRunner::new())
    }
}

impl<R: CommandRunner> GitOracle<R> {
    pub fn with_runner(dir: impl Into<PathBuf>, runner: R) -> Self {
        Self {
            runner,
            dir: dir.into(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    async fn git(&self, args: &[&str], cancel: &CancelToken) -> Result<CommandOutput> {
        let spec = CommandSpec::new("git", args.iter().copied(), &self.dir)
            .with_timeout(self.timeout)
            .with_env("GIT_TERMINAL_PROMPT", "0");
        self.runner.run(spec, cancel).await
    }

    /// Run git and require a zero exit; returns trimmed stdout.
    async fn git_checked(&self, args: &[&str], cancel: &CancelToken) -> Result<String> {
        let out = self.git(args, cancel).await?;
        if !out.success() {
            return Err(command_failed(args, &out));
        }
        Ok(out.text().to_string())
    }

    /// Resolve the current branch's upstream into `(remote, remote ref)`.
    ///
    /// The remote is `.` when the branch tracks another local branch.
    async fn upstream(&self, cancel: &CancelToken) -> Result<(String, String)> {
        let args = ["symbolic-ref", "-q", "HEAD"];
        let out = self.git(&args, cancel).await?;
        if !out.success() {
            if out.stderr.contains("not a git repository") {
                return Err(command_failed(&args, &out));
            }
            debug!(stderr = %out.stderr.trim(), "HEAD is not on a branch");
            return Err(PullWatchError::NoUpstream);
        }
        let head_ref = out.text().to_string();

        // Remote and ref names cannot contain spaces.
        let args = [
            "for-each-ref",
            "--format=%(upstream:remotename) %(upstream:remoteref)",
            head_ref.as_str(),
        ];
        let out = self.git(&args, cancel).await?;
        if !out.success() {
            return Err(command_failed(&args, &out));
        }

        match out.text().split_once(' ') {
            Some((remote, remote_ref)) if !remote.is_empty() && !remote_ref.is_empty() => {
                Ok((remote.to_string(), remote_ref.to_string()))
            }
            _ => {
                debug!(branch = %head_ref, "branch has no upstream configured");
                Err(PullWatchError::NoUpstream)
            }
        }
    }

    /// Ask `remote` for `refname`. `Ok(None)` if the remote has no such ref.
    async fn ls_remote(
        &self,
        remote: &str,
        refname: &str,
        cancel: &CancelToken,
    ) -> Result<Option<CommitRef>> {
        let out = self.git(&["ls-remote", remote, refname], cancel).await?;
        if !out.success() {
            return Err(PullWatchError::RemoteUnreachable(format!(
                "{}: {}",
                remote,
                out.stderr.trim()
            )));
        }

        let hash = out
            .stdout
            .lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                Some((fields.next()?, fields.next()?))
            })
            .find(|(_, name)| *name == refname)
            .map(|(hash, _)| CommitRef::new(hash));

        Ok(hash)
    }

    async fn has_commit(&self, commit: &CommitRef, cancel: &CancelToken) -> Result<bool> {
        let object = format!("{}^{{commit}}", commit);
        let out = self.git(&["cat-file", "-e", &object], cancel).await?;
        Ok(out.success())
    }

    async fn missing_commits(
        &self,
        commits: [&CommitRef; 2],
        cancel: &CancelToken,
    ) -> Result<Vec<CommitRef>> {
        let mut missing = Vec::new();
        for commit in commits {
            if !self.has_commit(commit, cancel).await? {
                missing.push(commit.clone());
            }
        }
        Ok(missing)
    }

    /// Make sure both commits exist locally, fetching once if needed.
    async fn ensure_present(&self, commits: [&CommitRef; 2], cancel: &CancelToken) -> Result<()> {
        let missing = self.missing_commits(commits, cancel).await?;
        if missing.is_empty() {
            return Ok(());
        }

        info!(?missing, "commits not found locally; fetching");
        self.fetch_inner(cancel).await?;

        match self.missing_commits(commits, cancel).await?.into_iter().next() {
            Some(commit) => Err(PullWatchError::MissingCommit(commit)),
            None => Ok(()),
        }
    }

    async fn fetch_inner(&self, cancel: &CancelToken) -> Result<()> {
        let out = self.git(&["fetch"], cancel).await?;
        if !out.success() {
            return Err(PullWatchError::RemoteUnreachable(format!(
                "fetch failed: {}",
                out.stderr.trim()
            )));
        }
        Ok(())
    }
}

impl<R: CommandRunner> CommitOracle for GitOracle<R> {
    fn local_head<'a>(&'a self, cancel: &CancelToken) -> BoxFuture<'a, Result<CommitRef>> {
        let cancel = cancel.clone();
        Box::pin(async move {
            let args = ["rev-parse", "HEAD"];
            let hash = self.git_checked(&args, &cancel).await?;
            if hash.is_empty() {
                return Err(PullWatchError::Execution {
                    command: format!("git {}", args.join(" ")),
                    detail: "empty output".to_string(),
                });
            }
            Ok(CommitRef::new(hash))
        })
    }

    fn remote_head<'a>(&'a self, cancel: &CancelToken) -> BoxFuture<'a, Result<CommitRef>> {
        let cancel = cancel.clone();
        Box::pin(async move {
            let (remote, refname) = self.upstream(&cancel).await?;

            if let Some(hash) = self.ls_remote(&remote, &refname, &cancel).await? {
                return Ok(hash);
            }

            debug!(%remote, %refname, "remote reported no such branch; falling back to HEAD");
            self.ls_remote(&remote, "HEAD", &cancel)
                .await?
                .ok_or_else(|| {
                    PullWatchError::RemoteUnreachable(format!(
                        "remote '{}' reported neither {} nor HEAD",
                        remote, refname
                    ))
                })
        })
    }

    fn is_ancestor<'a>(
        &'a self,
        ancestor: &'a CommitRef,
        descendant: &'a CommitRef,
        cancel: &CancelToken,
    ) -> BoxFuture<'a, Result<bool>> {
        let cancel = cancel.clone();
        Box::pin(async move {
            self.ensure_present([ancestor, descendant], &cancel).await?;

            let args = [
                "merge-base",
                "--is-ancestor",
                ancestor.as_str(),
                descendant.as_str(),
            ];
            let out = self.git(&args, &cancel).await?;

            // Exit 1 is git's "not an ancestor" answer, not a failure.
            match out.code {
                Some(0) => Ok(true),
                Some(1) => Ok(false),
                _ => Err(command_failed(&args, &out)),
            }
        })
    }

    fn fetch<'a>(&'a self, cancel: &CancelToken) -> BoxFuture<'a, Result<()>> {
        let cancel = cancel.clone();
        Box::pin(async move { self.fetch_inner(&cancel).await })
    }

    fn pull<'a>(&'a self, cancel: &CancelToken) -> BoxFuture<'a, Result<String>> {
        let cancel = cancel.clone();
        Box::pin(async move {
            let out = self.git(&["pull"], &cancel).await?;
            if !out.success() {
                let detail = if out.stderr.trim().is_empty() {
                    out.text().to_string()
                } else {
                    out.stderr.trim().to_string()
                };
                return Err(PullWatchError::Pull(detail));
            }
            Ok(out.text().to_string())
        })
    }
}

fn command_failed(args: &[&str], out: &CommandOutput) -> PullWatchError {
    let code = out
        .code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string());
    PullWatchError::Execution {
        command: format!("git {}", args.join(" ")),
        detail: format!("exit {}: {}", code, out.stderr.trim()),
    }
}
