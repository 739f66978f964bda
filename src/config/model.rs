// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::HumanDuration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration as read from a TOML file, before validation.
///
/// Every field is optional; command-line flags are layered on top and
/// defaults fill whatever is still missing.
///
/// ```toml
/// [watch]
/// interval = "30s"
/// git_dir = "/srv/app"
/// run_on_start = true
///
/// [process]
/// command = ["./server", "--port", "8080"]
/// graceful = true
/// stop_timeout = "10s"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub watch: WatchSection,

    #[serde(default)]
    pub process: ProcessSection,
}

/// `[watch]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchSection {
    /// How often to poll the remote.
    pub interval: Option<HumanDuration>,

    /// Repository to watch.
    pub git_dir: Option<PathBuf>,

    /// Start the command at startup even when already up to date.
    pub run_on_start: Option<bool>,

    /// Pull without restarting (for commands that reload themselves).
    pub no_restart: Option<bool>,
}

/// `[process]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessSection {
    /// Program and arguments.
    pub command: Option<Vec<String>>,

    /// Try a terminate signal before killing.
    pub graceful: Option<bool>,

    /// Grace period for `graceful`.
    pub stop_timeout: Option<HumanDuration>,
}

/// Fully resolved configuration handed to [`crate::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    pub poll_interval: Duration,
    pub git_dir: PathBuf,
    pub command: Vec<String>,
    pub graceful_stop: bool,
    pub stop_timeout: Duration,
    pub run_on_start: bool,
    pub no_restart: bool,
}
