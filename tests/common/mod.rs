#![allow(dead_code)]

use std::time::Duration;

use tokio::task::JoinHandle;

use pullwatch::engine::{WatchLoop, WatchOptions};
use pullwatch::errors::Result;
use pullwatch::exec::{latch, Latch};

pub use pullwatch_test_utils::{
    eventually, init_tracing, with_timeout, FakeRepo, FakeSupervisor, ScriptedRunner,
    WatchConfigBuilder,
};

/// Poll interval used by loop tests.
pub const TICK: Duration = Duration::from_millis(40);

/// Upper bound for waiting on something the loop should do within a few ticks.
pub const SETTLE: Duration = Duration::from_secs(3);

/// A watch loop running on a background task, plus the handles to drive it.
pub struct RunningLoop {
    pub repo: FakeRepo,
    pub supervisor: FakeSupervisor,
    pub shutdown: Latch<()>,
    pub handle: JoinHandle<Result<()>>,
}

impl RunningLoop {
    pub fn spawn(repo: &FakeRepo, supervisor: &FakeSupervisor, options: WatchOptions) -> Self {
        let (shutdown, waiter) = latch::<()>();
        let watch = WatchLoop::new(repo.clone(), supervisor.clone(), options, waiter);
        let handle = tokio::spawn(watch.run());
        Self {
            repo: repo.clone(),
            supervisor: supervisor.clone(),
            shutdown,
            handle,
        }
    }

    /// Request shutdown and wait for the loop's result.
    pub async fn stop(self) -> Result<()> {
        self.shutdown.fire(());
        with_timeout(self.handle).await.expect("watch loop panicked")
    }
}

pub fn options() -> WatchConfigBuilder {
    WatchConfigBuilder::new().interval(TICK)
}
