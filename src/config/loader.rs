// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::cli::CliArgs;
use crate::config::model::{RawConfigFile, WatchConfig};
use crate::errors::Result;

/// Load a configuration file and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; validation happens when the
/// merged result is converted into a [`WatchConfig`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let config: RawConfigFile = toml::from_str(&contents)?;
    debug!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Overlay command-line flags on top of file values.
///
/// Flags that were given win; boolean flags can only switch a setting on.
pub fn merge_cli(mut raw: RawConfigFile, args: &CliArgs) -> RawConfigFile {
    if let Some(interval) = args.interval {
        raw.watch.interval = Some(interval);
    }
    if let Some(ref dir) = args.git_dir {
        raw.watch.git_dir = Some(dir.clone());
    }
    if args.run_on_start {
        raw.watch.run_on_start = Some(true);
    }
    if args.no_restart {
        raw.watch.no_restart = Some(true);
    }
    if !args.command.is_empty() {
        raw.process.command = Some(args.command.clone());
    }
    if args.graceful {
        raw.process.graceful = Some(true);
    }
    if let Some(timeout) = args.stop_timeout {
        raw.process.stop_timeout = Some(timeout);
    }
    raw
}

/// Build the final configuration from CLI arguments (and `--config`, if
/// given).
pub fn resolve(args: &CliArgs) -> Result<WatchConfig> {
    let raw = match args.config {
        Some(ref path) => load_from_path(path)?,
        None => RawConfigFile::default(),
    };
    WatchConfig::try_from(merge_cli(raw, args))
}
