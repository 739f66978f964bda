// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::Parser;

use crate::logging::Verbosity;
use crate::types::HumanDuration;

/// Command-line arguments for `pullwatch`.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "pullwatch",
    version,
    about = "Keep a git checkout in sync with its upstream and restart a command when it changes.",
    long_about = None
)]
pub struct CliArgs {
    /// How often to check the remote (e.g. "15s", "1m").
    ///
    /// Default: 15s.
    #[arg(short = 'i', long, value_name = "DURATION")]
    pub interval: Option<HumanDuration>,

    /// Git repository to watch.
    ///
    /// Default: the current directory.
    #[arg(short = 'g', long, value_name = "DIR")]
    pub git_dir: Option<PathBuf>,

    /// Optional TOML config file; flags override its values.
    #[arg(short = 'c', long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log debug details (commit comparisons, git output).
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Only log warnings and errors.
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Send a terminate signal first and wait before killing the command.
    #[arg(long)]
    pub graceful: bool,

    /// How long to wait after the terminate signal when `--graceful` is set.
    #[arg(long, value_name = "DURATION")]
    pub stop_timeout: Option<HumanDuration>,

    /// Start the command at startup even when no changes are pending.
    #[arg(long)]
    pub run_on_start: bool,

    /// Prefix log lines with a timestamp.
    #[arg(long)]
    pub timestamp: bool,

    /// Pull changes without restarting the command.
    #[arg(long)]
    pub no_restart: bool,

    /// Command to run, after `--`.
    #[arg(last = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl CliArgs {
    /// `--verbose` wins over `--quiet`; `None` leaves the choice to the
    /// environment.
    pub fn verbosity(&self) -> Option<Verbosity> {
        if self.verbose {
            Some(Verbosity::Verbose)
        } else if self.quiet {
            Some(Verbosity::Quiet)
        } else {
            None
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
