#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use pullwatch::config::{WatchConfig, DEFAULT_POLL_INTERVAL, DEFAULT_STOP_TIMEOUT};
use pullwatch::engine::WatchOptions;

/// Builder for `WatchConfig` to simplify test setup.
pub struct WatchConfigBuilder {
    config: WatchConfig,
}

impl WatchConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: WatchConfig {
                poll_interval: DEFAULT_POLL_INTERVAL,
                git_dir: PathBuf::from("."),
                command: vec!["true".to_string()],
                graceful_stop: false,
                stop_timeout: DEFAULT_STOP_TIMEOUT,
                run_on_start: false,
                no_restart: false,
            },
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn git_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.git_dir = dir.into();
        self
    }

    pub fn command(mut self, cmd: &[&str]) -> Self {
        self.config.command = cmd.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn graceful(mut self, timeout: Duration) -> Self {
        self.config.graceful_stop = true;
        self.config.stop_timeout = timeout;
        self
    }

    pub fn run_on_start(mut self, val: bool) -> Self {
        self.config.run_on_start = val;
        self
    }

    pub fn no_restart(mut self, val: bool) -> Self {
        self.config.no_restart = val;
        self
    }

    pub fn build(self) -> WatchConfig {
        self.config
    }

    /// Loop options for the built config.
    pub fn options(self) -> WatchOptions {
        WatchOptions::from(&self.config)
    }
}

impl Default for WatchConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
