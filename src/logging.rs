// src/logging.rs

//! Logging setup for `pullwatch` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--verbose` / `--quiet` (if provided)
//! 2. `PULLWATCH_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `info`
//!
//! Logs go to STDERR; the supervised command owns stdout.

use anyhow::Result;
use tracing_subscriber::fmt;

/// Coarse log levels exposed on the command line.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Default,
    Verbose,
}

impl Verbosity {
    pub fn level(self) -> tracing::Level {
        match self {
            Verbosity::Quiet => tracing::Level::WARN,
            Verbosity::Default => tracing::Level::INFO,
            Verbosity::Verbose => tracing::Level::DEBUG,
        }
    }
}

/// Output options for [`init_logging`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFormat {
    pub verbosity: Option<Verbosity>,
    pub timestamps: bool,
    pub ansi: bool,
}

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(format: LogFormat) -> Result<()> {
    let level = resolve_level(format.verbosity, std::env::var("PULLWATCH_LOG").ok().as_deref());

    let builder = fmt()
        .with_max_level(level)
        .with_target(false)
        .with_ansi(format.ansi)
        .with_writer(std::io::stderr);

    let installed = if format.timestamps {
        builder.try_init()
    } else {
        builder.without_time().try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))
}

/// Flag first, then the environment, then `info`.
pub fn resolve_level(verbosity: Option<Verbosity>, env: Option<&str>) -> tracing::Level {
    match verbosity {
        Some(v) => v.level(),
        None => env
            .and_then(parse_level_str)
            .unwrap_or(tracing::Level::INFO),
    }
}

fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}
