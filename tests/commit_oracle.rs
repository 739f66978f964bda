// tests/commit_oracle.rs

mod common;
use crate::common::{init_tracing, with_timeout, ScriptedRunner};

use std::error::Error;

use pullwatch::errors::PullWatchError;
use pullwatch::exec::{latch, CancelToken, CommandOutput};
use pullwatch::git::{CommitOracle, GitOracle};
use pullwatch::types::{CommitRef, Comparison};

type TestResult = Result<(), Box<dyn Error>>;

const HEAD_REF: &str = "git symbolic-ref -q HEAD";

fn upstream_of(branch: &str) -> String {
    format!("git for-each-ref --format=%(upstream:remotename) %(upstream:remoteref) refs/heads/{branch}")
}

/// Script HEAD on `branch` tracking `upstream` ("<remote> <remote ref>").
fn tracking(runner: ScriptedRunner, branch: &str, upstream: &str) -> ScriptedRunner {
    runner
        .ok(HEAD_REF, &format!("refs/heads/{branch}\n"))
        .ok(&upstream_of(branch), &format!("{upstream}\n"))
}

fn oracle(runner: &ScriptedRunner) -> GitOracle<ScriptedRunner> {
    GitOracle::with_runner("/srv/app", runner.clone())
}

/// A token that never fires; the sender is leaked for the test's duration.
fn never() -> CancelToken {
    let (tx, rx) = latch::<()>();
    std::mem::forget(tx);
    rx
}

fn c(s: &str) -> CommitRef {
    CommitRef::new(s)
}

/// Script both commits as present locally.
fn present(runner: ScriptedRunner, commits: &[&str]) -> ScriptedRunner {
    commits.iter().fold(runner, |r, id| {
        r.ok(&format!("git cat-file -e {id}^{{commit}}"), "")
    })
}

#[tokio::test]
async fn local_head_is_trimmed() -> TestResult {
    init_tracing();
    let runner = ScriptedRunner::new().ok("git rev-parse HEAD", "abc123\n");

    let head = oracle(&runner).local_head(&never()).await?;
    assert_eq!(head, c("abc123"));

    let spec = &runner.specs()[0];
    assert_eq!(spec.workdir.to_str(), Some("/srv/app"));
    assert!(spec.env.contains(&("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())));
    Ok(())
}

#[tokio::test]
async fn local_head_failure_is_an_execution_error() -> TestResult {
    let runner = ScriptedRunner::new().fail("git rev-parse HEAD", 128, "fatal: bad revision");
    let err = oracle(&runner).local_head(&never()).await.unwrap_err();
    assert!(matches!(err, PullWatchError::Execution { .. }), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn remote_head_uses_upstream_branch() -> TestResult {
    init_tracing();
    let runner = tracking(ScriptedRunner::new(), "main", "origin refs/heads/main").ok(
        "git ls-remote origin refs/heads/main",
        "def456\trefs/heads/main\n0000\trefs/heads/main-old\n",
    );

    let head = oracle(&runner).remote_head(&never()).await?;
    assert_eq!(head, c("def456"));
    Ok(())
}

#[tokio::test]
async fn remote_head_keeps_slashes_in_remote_and_branch() -> TestResult {
    let runner = tracking(
        ScriptedRunner::new(),
        "login",
        "team/origin refs/heads/feature/login",
    )
    .ok(
        "git ls-remote team/origin refs/heads/feature/login",
        "aaa111\trefs/heads/feature/login",
    );

    let head = oracle(&runner).remote_head(&never()).await?;
    assert_eq!(head, c("aaa111"));
    Ok(())
}

#[tokio::test]
async fn remote_head_follows_a_local_upstream() -> TestResult {
    let runner = tracking(ScriptedRunner::new(), "topic", ". refs/heads/main")
        .ok("git ls-remote . refs/heads/main", "ccc333\trefs/heads/main\n");

    let head = oracle(&runner).remote_head(&never()).await?;
    assert_eq!(head, c("ccc333"));
    assert_eq!(runner.call_count("git ls-remote . refs/heads/main"), 1);
    Ok(())
}

#[tokio::test]
async fn detached_head_has_no_upstream() -> TestResult {
    let runner = ScriptedRunner::new().fail(HEAD_REF, 1, "");
    let err = oracle(&runner).remote_head(&never()).await.unwrap_err();
    assert!(matches!(err, PullWatchError::NoUpstream), "got {err:?}");
    assert_eq!(runner.calls().len(), 1, "no upstream lookup without a branch");
    Ok(())
}

#[tokio::test]
async fn remote_head_falls_back_to_remote_head_ref() -> TestResult {
    let runner = tracking(ScriptedRunner::new(), "main", "origin refs/heads/main")
        .ok("git ls-remote origin refs/heads/main", "")
        .ok("git ls-remote origin HEAD", "bbb222\tHEAD\n");

    let head = oracle(&runner).remote_head(&never()).await?;
    assert_eq!(head, c("bbb222"));
    Ok(())
}

#[tokio::test]
async fn missing_upstream_is_reported() -> TestResult {
    let runner = tracking(ScriptedRunner::new(), "main", " ");
    let err = oracle(&runner).remote_head(&never()).await.unwrap_err();
    assert!(matches!(err, PullWatchError::NoUpstream), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn not_a_repository_is_an_execution_error() -> TestResult {
    let runner = ScriptedRunner::new().fail(
        HEAD_REF,
        128,
        "fatal: not a git repository (or any of the parent directories): .git",
    );
    let err = oracle(&runner).remote_head(&never()).await.unwrap_err();
    assert!(matches!(err, PullWatchError::Execution { .. }), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn unreachable_remote_is_reported() -> TestResult {
    let runner = tracking(ScriptedRunner::new(), "main", "origin refs/heads/main").fail(
        "git ls-remote origin refs/heads/main",
        128,
        "fatal: unable to access 'https://example.invalid/': Could not resolve host",
    );
    let err = oracle(&runner).remote_head(&never()).await.unwrap_err();
    assert!(matches!(err, PullWatchError::RemoteUnreachable(_)), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn equal_refs_never_touch_git() -> TestResult {
    let runner = ScriptedRunner::new();
    let cmp = oracle(&runner)
        .compare(&c("abc123"), &c("abc123"), &never())
        .await?;
    assert_eq!(cmp, Comparison::Equal);
    assert!(runner.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn behind_ahead_and_diverged() -> TestResult {
    init_tracing();
    let cases = [
        (0, 1, Comparison::LocalBehindRemote),
        (1, 0, Comparison::LocalAheadOfRemote),
        (1, 1, Comparison::Diverged),
    ];

    // Exit 0 means "is an ancestor", exit 1 means "is not".
    for (local_in_remote, remote_in_local, expected) in cases {
        let runner = present(ScriptedRunner::new(), &["abc123", "def456"])
            .on(
                "git merge-base --is-ancestor abc123 def456",
                CommandOutput::exited(local_in_remote, ""),
            )
            .on(
                "git merge-base --is-ancestor def456 abc123",
                CommandOutput::exited(remote_in_local, ""),
            );

        let cmp = oracle(&runner)
            .compare(&c("abc123"), &c("def456"), &never())
            .await?;
        assert_eq!(cmp, expected);
        assert_eq!(runner.call_count("git pull"), 0, "comparison never pulls");
    }
    Ok(())
}

#[tokio::test]
async fn mutual_ancestry_is_a_contradiction() -> TestResult {
    let runner = present(ScriptedRunner::new(), &["abc123", "def456"])
        .ok("git merge-base --is-ancestor abc123 def456", "")
        .ok("git merge-base --is-ancestor def456 abc123", "");

    let err = oracle(&runner)
        .compare(&c("abc123"), &c("def456"), &never())
        .await
        .unwrap_err();
    assert!(matches!(err, PullWatchError::AncestryContradiction { .. }), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn merge_base_failure_is_not_false() -> TestResult {
    let runner = present(ScriptedRunner::new(), &["abc123", "def456"]).fail(
        "git merge-base --is-ancestor abc123 def456",
        128,
        "fatal: corrupt object",
    );

    let err = oracle(&runner)
        .is_ancestor(&c("abc123"), &c("def456"), &never())
        .await
        .unwrap_err();
    assert!(matches!(err, PullWatchError::Execution { .. }), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn missing_commit_triggers_one_fetch() -> TestResult {
    init_tracing();
    let runner = ScriptedRunner::new()
        .ok("git cat-file -e abc123^{commit}", "")
        .fail("git cat-file -e def456^{commit}", 1, "")
        .ok("git cat-file -e def456^{commit}", "")
        .ok("git fetch", "")
        .ok("git merge-base --is-ancestor abc123 def456", "");

    let ancestor = oracle(&runner)
        .is_ancestor(&c("abc123"), &c("def456"), &never())
        .await?;
    assert!(ancestor);
    assert_eq!(runner.call_count("git fetch"), 1);
    Ok(())
}

#[tokio::test]
async fn commit_still_missing_after_fetch() -> TestResult {
    let runner = ScriptedRunner::new()
        .ok("git cat-file -e abc123^{commit}", "")
        .fail("git cat-file -e def456^{commit}", 1, "")
        .ok("git fetch", "");

    let err = oracle(&runner)
        .is_ancestor(&c("abc123"), &c("def456"), &never())
        .await
        .unwrap_err();
    match err {
        PullWatchError::MissingCommit(commit) => assert_eq!(commit, c("def456")),
        other => panic!("expected MissingCommit, got {other:?}"),
    }
    assert_eq!(runner.call_count("git fetch"), 1, "exactly one fetch");
    assert_eq!(runner.call_count("git merge-base --is-ancestor abc123 def456"), 0);
    Ok(())
}

#[tokio::test]
async fn failed_fetch_is_unreachable() -> TestResult {
    let runner = ScriptedRunner::new().fail("git fetch", 128, "fatal: could not read from remote");
    let err = oracle(&runner).fetch(&never()).await.unwrap_err();
    assert!(matches!(err, PullWatchError::RemoteUnreachable(_)), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn pull_success_and_failure() -> TestResult {
    let runner = ScriptedRunner::new()
        .ok("git pull", "Updating abc123..def456\nFast-forward\n")
        .fail("git pull", 1, "error: Your local changes would be overwritten");
    let oracle = oracle(&runner);

    let out = oracle.pull(&never()).await?;
    assert!(out.contains("Fast-forward"));

    let err = oracle.pull(&never()).await.unwrap_err();
    match err {
        PullWatchError::Pull(detail) => assert!(detail.contains("local changes")),
        other => panic!("expected Pull, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn cancellation_aborts_in_flight_queries() -> TestResult {
    init_tracing();
    let runner = tracking(ScriptedRunner::new(), "main", "origin refs/heads/main")
        .hang("git ls-remote origin refs/heads/main");
    let oracle = oracle(&runner);

    let (tx, rx) = latch::<()>();
    let query = oracle.remote_head(&rx);
    let fire = async {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        tx.fire(());
    };

    let (result, ()) = with_timeout(async { tokio::join!(query, fire) }).await;
    assert!(result.unwrap_err().is_cancellation());

    let err = oracle.local_head(&rx).await.unwrap_err();
    assert!(err.is_cancellation(), "fired token rejects new commands");
    Ok(())
}
