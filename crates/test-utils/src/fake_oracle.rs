use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use pullwatch::errors::{PullWatchError, Result};
use pullwatch::exec::{BoxFuture, CancelToken};
use pullwatch::git::CommitOracle;
use pullwatch::types::CommitRef;

#[derive(Debug, Default)]
struct RepoState {
    parents: HashMap<String, Vec<String>>,
    local: String,
    remote: String,
    remote_error: Option<String>,
    pull_error: Option<String>,
    contradiction: bool,
    hang_remote: bool,
    pulls: usize,
    remote_reads: usize,
    fetches: usize,
}

/// In-memory commit graph standing in for a git repository.
///
/// Cheap to clone: clones share state, so a test keeps one handle to move
/// the remote head while the watch loop owns another.
#[derive(Debug, Clone, Default)]
pub struct FakeRepo {
    state: Arc<Mutex<RepoState>>,
}

impl FakeRepo {
    /// A repository with a single root commit `c0`, checked out and pushed.
    pub fn new() -> Self {
        let repo = Self::default();
        repo.commit("c0", &[]);
        repo.set_local("c0");
        repo.set_remote("c0");
        repo
    }

    fn lock(&self) -> MutexGuard<'_, RepoState> {
        self.state.lock().unwrap()
    }

    pub fn commit(&self, id: &str, parents: &[&str]) -> &Self {
        self.lock().parents.insert(
            id.to_string(),
            parents.iter().map(|p| p.to_string()).collect(),
        );
        self
    }

    pub fn set_local(&self, id: &str) {
        self.lock().local = id.to_string();
    }

    pub fn set_remote(&self, id: &str) {
        self.lock().remote = id.to_string();
    }

    /// Commit `id` on top of the current remote head and move the remote to it.
    pub fn push_remote(&self, id: &str) {
        let mut state = self.lock();
        let parent = state.remote.clone();
        state.parents.insert(id.to_string(), vec![parent]);
        state.remote = id.to_string();
    }

    /// Commit `id` on top of the current local head and check it out.
    pub fn commit_local(&self, id: &str) {
        let mut state = self.lock();
        let parent = state.local.clone();
        state.parents.insert(id.to_string(), vec![parent]);
        state.local = id.to_string();
    }

    pub fn local(&self) -> String {
        self.lock().local.clone()
    }

    pub fn remote(&self) -> String {
        self.lock().remote.clone()
    }

    /// Make `remote_head` fail as unreachable until cleared.
    pub fn set_remote_error(&self, msg: Option<&str>) {
        self.lock().remote_error = msg.map(str::to_string);
    }

    pub fn set_pull_error(&self, msg: Option<&str>) {
        self.lock().pull_error = msg.map(str::to_string);
    }

    /// Report every ancestry query as true.
    pub fn set_contradiction(&self, on: bool) {
        self.lock().contradiction = on;
    }

    /// Make `remote_head` block until cancelled.
    pub fn set_hang_remote(&self, on: bool) {
        self.lock().hang_remote = on;
    }

    pub fn pulls(&self) -> usize {
        self.lock().pulls
    }

    pub fn remote_reads(&self) -> usize {
        self.lock().remote_reads
    }

    pub fn fetches(&self) -> usize {
        self.lock().fetches
    }

    fn reachable(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        let state = self.lock();
        for id in [ancestor, descendant] {
            if !state.parents.contains_key(id) {
                return Err(PullWatchError::MissingCommit(CommitRef::new(id)));
            }
        }
        if state.contradiction {
            return Ok(true);
        }

        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([descendant.to_string()]);
        while let Some(id) = queue.pop_front() {
            if id == ancestor {
                return Ok(true);
            }
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(parents) = state.parents.get(&id) {
                queue.extend(parents.iter().cloned());
            }
        }
        Ok(false)
    }
}

impl CommitOracle for FakeRepo {
    fn local_head<'a>(&'a self, _cancel: &CancelToken) -> BoxFuture<'a, Result<CommitRef>> {
        Box::pin(async move { Ok(CommitRef::new(self.local())) })
    }

    fn remote_head<'a>(&'a self, cancel: &CancelToken) -> BoxFuture<'a, Result<CommitRef>> {
        let mut cancel = cancel.clone();
        Box::pin(async move {
            let (hang, error) = {
                let mut state = self.lock();
                state.remote_reads += 1;
                (state.hang_remote, state.remote_error.clone())
            };
            if hang {
                cancel.fired().await;
                return Err(PullWatchError::Cancelled);
            }
            if let Some(msg) = error {
                return Err(PullWatchError::RemoteUnreachable(msg));
            }
            Ok(CommitRef::new(self.remote()))
        })
    }

    fn is_ancestor<'a>(
        &'a self,
        ancestor: &'a CommitRef,
        descendant: &'a CommitRef,
        _cancel: &CancelToken,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { self.reachable(ancestor.as_str(), descendant.as_str()) })
    }

    fn fetch<'a>(&'a self, _cancel: &CancelToken) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.lock().fetches += 1;
            Ok(())
        })
    }

    fn pull<'a>(&'a self, _cancel: &CancelToken) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let mut state = self.lock();
            if let Some(msg) = state.pull_error.clone() {
                return Err(PullWatchError::Pull(msg));
            }
            state.pulls += 1;
            state.local = state.remote.clone();
            Ok(format!("Fast-forward to {}", state.local))
        })
    }
}
