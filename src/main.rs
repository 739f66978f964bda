// src/main.rs

use std::io::IsTerminal;

use pullwatch::logging::{LogFormat, init_logging};
use pullwatch::{cli, config, run};
use tracing::warn;

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("pullwatch error: {err:#}");
        std::process::exit(1);
    }
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    init_logging(LogFormat {
        verbosity: args.verbosity(),
        timestamps: args.timestamp,
        ansi: std::io::stderr().is_terminal(),
    })?;

    if args.verbose && args.quiet {
        warn!("both --verbose and --quiet given, using --verbose");
    }

    let cfg = config::resolve(&args)?;
    run(cfg).await?;
    Ok(())
}
