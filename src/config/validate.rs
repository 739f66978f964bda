// src/config/validate.rs

use std::path::PathBuf;
use std::time::Duration;

use crate::config::model::{RawConfigFile, WatchConfig, DEFAULT_POLL_INTERVAL, DEFAULT_STOP_TIMEOUT};
use crate::errors::{PullWatchError, Result};

impl TryFrom<RawConfigFile> for WatchConfig {
    type Error = PullWatchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let command = validate_command(raw.process.command)?;
        let poll_interval = validate_interval(
            raw.watch.interval.map(Duration::from).unwrap_or(DEFAULT_POLL_INTERVAL),
        )?;

        Ok(WatchConfig {
            poll_interval,
            git_dir: raw.watch.git_dir.unwrap_or_else(|| PathBuf::from(".")),
            command,
            graceful_stop: raw.process.graceful.unwrap_or(false),
            stop_timeout: raw
                .process
                .stop_timeout
                .map(Duration::from)
                .unwrap_or(DEFAULT_STOP_TIMEOUT),
            run_on_start: raw.watch.run_on_start.unwrap_or(false),
            no_restart: raw.watch.no_restart.unwrap_or(false),
        })
    }
}

fn validate_command(command: Option<Vec<String>>) -> Result<Vec<String>> {
    match command {
        Some(cmd) if cmd.first().is_some_and(|program| !program.trim().is_empty()) => Ok(cmd),
        _ => Err(PullWatchError::ConfigError("no command provided".to_string())),
    }
}

fn validate_interval(interval: Duration) -> Result<Duration> {
    if interval.is_zero() {
        return Err(PullWatchError::ConfigError(
            "poll interval must be greater than zero".to_string(),
        ));
    }
    Ok(interval)
}
