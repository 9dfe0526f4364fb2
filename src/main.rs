use std::io::{self, BufWriter};

use anyhow::{Context, Result};
use clap::Parser;
use pathtrace::{cli::Cli, discover, paths};
use tracing_subscriber::EnvFilter;

/// Log to stderr, filtered by `RUST_LOG` if set, else by the `-v` count.
fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(cli.log_level().into()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let cmd = cli.command();
    let program = cmd.get_program().to_owned();

    let ignore = cli.ignore_roots().context("failed to resolve ignore roots")?;

    let report = discover::discover(cmd, &ignore)
        .with_context(|| format!("failed to trace {:?}", program))?;

    let stdout = io::stdout();
    paths::write_report(BufWriter::new(stdout.lock()), &report)
        .context("failed to write report")?;

    Ok(())
}
