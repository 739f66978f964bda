// tests/watch_loop.rs

mod common;
use crate::common::{
    eventually, init_tracing, options, with_timeout, FakeRepo, FakeSupervisor, RunningLoop,
    SETTLE, TICK,
};

use std::error::Error;
use std::time::Duration;

use pullwatch::engine::WatchLoop;
use pullwatch::errors::PullWatchError;
use pullwatch::exec::latch;
use pullwatch::supervisor::Supervisor;

type TestResult = Result<(), Box<dyn Error>>;

/// Let the loop run for a few poll ticks.
async fn several_ticks() {
    tokio::time::sleep(TICK * 5).await;
}

#[tokio::test]
async fn equal_heads_do_nothing() -> TestResult {
    init_tracing();

    let repo = FakeRepo::new();
    let sup = FakeSupervisor::new();
    let running = RunningLoop::spawn(&repo, &sup, options().options());

    several_ticks().await;
    assert!(repo.remote_reads() >= 3, "loop should keep polling");
    assert_eq!(repo.pulls(), 0);
    assert_eq!(sup.starts(), 0);
    assert_eq!(sup.stops(), 0);

    running.stop().await?;
    Ok(())
}

#[tokio::test]
async fn run_on_start_starts_even_when_up_to_date() -> TestResult {
    init_tracing();

    let repo = FakeRepo::new();
    let sup = FakeSupervisor::new();
    let running = RunningLoop::spawn(&repo, &sup, options().run_on_start(true).options());

    assert!(eventually(SETTLE, || sup.starts() == 1).await);
    several_ticks().await;
    assert_eq!(sup.starts(), 1, "no restart without remote changes");
    assert_eq!(repo.pulls(), 0);

    running.stop().await?;
    assert!(!sup.is_running());
    Ok(())
}

#[tokio::test]
async fn behind_at_startup_pulls_then_starts() -> TestResult {
    init_tracing();

    let repo = FakeRepo::new();
    repo.push_remote("c1");
    let sup = FakeSupervisor::new();
    let running = RunningLoop::spawn(&repo, &sup, options().options());

    assert!(eventually(SETTLE, || sup.starts() == 1).await);
    assert_eq!(repo.pulls(), 1);
    assert_eq!(repo.local(), "c1");
    assert_eq!(sup.stops(), 0, "nothing to stop on first start");

    running.stop().await?;
    Ok(())
}

#[tokio::test]
async fn new_remote_commit_pulls_and_restarts() -> TestResult {
    init_tracing();

    let repo = FakeRepo::new();
    let sup = FakeSupervisor::new();
    let running = RunningLoop::spawn(&repo, &sup, options().run_on_start(true).options());
    assert!(eventually(SETTLE, || sup.starts() == 1).await);
    let first_generation = sup.current_generation();

    repo.push_remote("c1");

    assert!(eventually(SETTLE, || sup.starts() == 2).await);
    assert_eq!(repo.pulls(), 1);
    assert_eq!(repo.local(), "c1");
    assert_eq!(sup.stops(), 1, "old child stopped before the new one starts");
    assert!(sup.current_generation() > first_generation);
    assert!(sup.is_running());

    running.stop().await?;
    Ok(())
}

#[tokio::test]
async fn local_ahead_does_nothing() -> TestResult {
    init_tracing();

    let repo = FakeRepo::new();
    repo.commit_local("c1");
    let sup = FakeSupervisor::new();
    let running = RunningLoop::spawn(&repo, &sup, options().options());

    several_ticks().await;
    assert_eq!(repo.pulls(), 0);
    assert_eq!(sup.starts(), 0);
    assert_eq!(repo.local(), "c1");

    running.stop().await?;
    Ok(())
}

#[tokio::test]
async fn diverged_heads_are_left_alone_without_error() -> TestResult {
    init_tracing();

    let repo = FakeRepo::new();
    repo.commit("left", &["c0"]);
    repo.commit("right", &["c0"]);
    repo.set_local("left");
    repo.set_remote("right");

    let sup = FakeSupervisor::new();
    let running = RunningLoop::spawn(&repo, &sup, options().run_on_start(true).options());

    several_ticks().await;
    assert_eq!(repo.pulls(), 0);
    assert_eq!(sup.starts(), 1, "only the run-on-start launch");
    assert_eq!(sup.stops(), 0);
    assert!(!running.handle.is_finished(), "diverged is not an error");

    running.stop().await?;
    Ok(())
}

#[tokio::test]
async fn no_restart_pulls_but_keeps_the_child() -> TestResult {
    init_tracing();

    let repo = FakeRepo::new();
    let sup = FakeSupervisor::new();
    let running = RunningLoop::spawn(
        &repo,
        &sup,
        options().run_on_start(true).no_restart(true).options(),
    );
    assert!(eventually(SETTLE, || sup.starts() == 1).await);

    repo.push_remote("c1");
    assert!(eventually(SETTLE, || repo.pulls() == 1).await);
    several_ticks().await;

    assert_eq!(repo.local(), "c1");
    assert_eq!(sup.starts(), 1);
    assert_eq!(sup.stops(), 0);

    running.stop().await?;
    Ok(())
}

#[tokio::test]
async fn unexplained_exit_waits_for_next_change() -> TestResult {
    init_tracing();

    let repo = FakeRepo::new();
    let sup = FakeSupervisor::new();
    let running = RunningLoop::spawn(&repo, &sup, options().run_on_start(true).options());
    assert!(eventually(SETTLE, || sup.starts() == 1).await);

    assert!(sup.crash(3));
    assert!(eventually(SETTLE, || sup.exit_logs() == 1).await);

    several_ticks().await;
    assert_eq!(sup.starts(), 1, "a bare exit never triggers a restart");
    assert_eq!(sup.exit_logs(), 1, "reminders are throttled by the backoff");

    repo.push_remote("c1");
    assert!(eventually(SETTLE, || sup.starts() == 2).await);
    assert!(sup.is_running());

    running.stop().await?;
    Ok(())
}

#[tokio::test]
async fn requested_exit_is_not_reported_as_crash() -> TestResult {
    init_tracing();

    let repo = FakeRepo::new();
    let sup = FakeSupervisor::new();
    let running = RunningLoop::spawn(&repo, &sup, options().run_on_start(true).options());
    assert!(eventually(SETTLE, || sup.starts() == 1).await);

    repo.push_remote("c1");
    assert!(eventually(SETTLE, || sup.starts() == 2).await);
    several_ticks().await;

    assert_eq!(sup.exit_logs(), 0);

    running.stop().await?;
    Ok(())
}

#[tokio::test]
async fn crash_of_restarted_child_is_still_noticed() -> TestResult {
    init_tracing();

    let repo = FakeRepo::new();
    let sup = FakeSupervisor::new();
    let running = RunningLoop::spawn(&repo, &sup, options().run_on_start(true).options());
    assert!(eventually(SETTLE, || sup.starts() == 1).await);

    repo.push_remote("c1");
    assert!(eventually(SETTLE, || sup.starts() == 2).await);

    assert!(sup.crash(1));
    assert!(eventually(SETTLE, || sup.exit_logs() == 1).await);

    running.stop().await?;
    Ok(())
}

#[tokio::test]
async fn remote_errors_are_retried_next_tick() -> TestResult {
    init_tracing();

    let repo = FakeRepo::new();
    let sup = FakeSupervisor::new();
    let running = RunningLoop::spawn(&repo, &sup, options().run_on_start(true).options());
    assert!(eventually(SETTLE, || sup.starts() == 1).await);

    repo.set_remote_error(Some("could not resolve host"));
    repo.push_remote("c1");
    let reads = repo.remote_reads();
    assert!(eventually(SETTLE, || repo.remote_reads() >= reads + 3).await);
    assert_eq!(repo.pulls(), 0);
    assert!(!running.handle.is_finished());

    repo.set_remote_error(None);
    assert!(eventually(SETTLE, || sup.starts() == 2).await);
    assert_eq!(repo.local(), "c1");

    running.stop().await?;
    Ok(())
}

#[tokio::test]
async fn failed_pull_skips_restart_and_retries() -> TestResult {
    init_tracing();

    let repo = FakeRepo::new();
    let sup = FakeSupervisor::new();
    let running = RunningLoop::spawn(&repo, &sup, options().run_on_start(true).options());
    assert!(eventually(SETTLE, || sup.starts() == 1).await);

    repo.set_pull_error(Some("local changes would be overwritten"));
    repo.push_remote("c1");
    several_ticks().await;
    assert_eq!(sup.stops(), 0, "no restart after a failed pull");
    assert_eq!(repo.local(), "c0");

    repo.set_pull_error(None);
    assert!(eventually(SETTLE, || sup.starts() == 2).await);
    assert_eq!(repo.local(), "c1");

    running.stop().await?;
    Ok(())
}

#[tokio::test]
async fn spawn_failure_on_restart_is_retried_on_next_change() -> TestResult {
    init_tracing();

    let repo = FakeRepo::new();
    let sup = FakeSupervisor::new();
    let running = RunningLoop::spawn(&repo, &sup, options().run_on_start(true).options());
    assert!(eventually(SETTLE, || sup.starts() == 1).await);

    sup.fail_next_start("binary vanished");
    repo.push_remote("c1");
    assert!(eventually(SETTLE, || repo.pulls() == 1).await);
    several_ticks().await;
    assert!(!sup.is_running());
    assert!(!running.handle.is_finished());

    repo.push_remote("c2");
    assert!(eventually(SETTLE, || sup.starts() == 2).await);
    assert!(sup.is_running());

    running.stop().await?;
    Ok(())
}

#[tokio::test]
async fn spawn_failure_at_startup_is_fatal() -> TestResult {
    init_tracing();

    let repo = FakeRepo::new();
    let sup = FakeSupervisor::new();
    sup.fail_next_start("no such file");

    let (_shutdown, waiter) = latch::<()>();
    let watch = WatchLoop::new(repo, sup, options().run_on_start(true).options(), waiter);

    let err = with_timeout(watch.run()).await.unwrap_err();
    assert!(matches!(err, PullWatchError::Spawn { .. }), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn remote_failure_at_startup_is_fatal() -> TestResult {
    init_tracing();

    let repo = FakeRepo::new();
    repo.set_remote_error(Some("connection refused"));
    let sup = FakeSupervisor::new();

    let (_shutdown, waiter) = latch::<()>();
    let watch = WatchLoop::new(repo, sup.clone(), options().options(), waiter);

    let err = with_timeout(watch.run()).await.unwrap_err();
    assert!(matches!(err, PullWatchError::RemoteUnreachable(_)), "got {err:?}");
    assert_eq!(sup.starts(), 0);
    Ok(())
}

#[tokio::test]
async fn contradictory_ancestry_is_an_error_not_a_pull() -> TestResult {
    init_tracing();

    let repo = FakeRepo::new();
    let sup = FakeSupervisor::new();
    let running = RunningLoop::spawn(&repo, &sup, options().run_on_start(true).options());
    assert!(eventually(SETTLE, || sup.starts() == 1).await);

    repo.set_contradiction(true);
    repo.push_remote("c1");
    several_ticks().await;

    assert_eq!(repo.pulls(), 0);
    assert_eq!(sup.starts(), 1);
    assert!(!running.handle.is_finished());

    running.stop().await?;
    Ok(())
}

#[tokio::test]
async fn shutdown_while_idle_returns_immediately() -> TestResult {
    init_tracing();

    let repo = FakeRepo::new();
    let sup = FakeSupervisor::new();
    let running = RunningLoop::spawn(&repo, &sup, options().options());

    several_ticks().await;
    running.stop().await?;
    assert_eq!(sup.stops(), 0);
    Ok(())
}

#[tokio::test]
async fn shutdown_stops_the_running_child() -> TestResult {
    init_tracing();

    let repo = FakeRepo::new();
    let sup = FakeSupervisor::new();
    let running = RunningLoop::spawn(&repo, &sup, options().run_on_start(true).options());
    assert!(eventually(SETTLE, || sup.starts() == 1).await);

    running.stop().await?;
    assert_eq!(sup.stops(), 1);
    assert!(!sup.is_running());
    Ok(())
}

#[tokio::test]
async fn shutdown_times_out_when_child_survives() -> TestResult {
    init_tracing();

    let repo = FakeRepo::new();
    let sup = FakeSupervisor::new();
    let running = RunningLoop::spawn(&repo, &sup, options().run_on_start(true).options());
    assert!(eventually(SETTLE, || sup.starts() == 1).await);

    sup.ignore_stop(true);
    let err = running.stop().await.unwrap_err();
    assert!(matches!(err, PullWatchError::ShutdownTimeout(_)), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn shutdown_aborts_a_hung_remote_query() -> TestResult {
    init_tracing();

    let repo = FakeRepo::new();
    let sup = FakeSupervisor::new();
    let running = RunningLoop::spawn(&repo, &sup, options().run_on_start(true).options());
    assert!(eventually(SETTLE, || sup.starts() == 1).await);

    repo.set_hang_remote(true);
    let reads = repo.remote_reads();
    assert!(eventually(SETTLE, || repo.remote_reads() > reads).await);

    let started = tokio::time::Instant::now();
    running.stop().await?;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!sup.is_running());
    Ok(())
}

#[tokio::test]
async fn shutdown_during_startup_is_clean() -> TestResult {
    init_tracing();

    let repo = FakeRepo::new();
    repo.set_hang_remote(true);
    let sup = FakeSupervisor::new();
    let running = RunningLoop::spawn(&repo, &sup, options().run_on_start(true).options());

    assert!(eventually(SETTLE, || repo.remote_reads() == 1).await);
    running.stop().await?;
    assert_eq!(sup.starts(), 0);
    Ok(())
}
