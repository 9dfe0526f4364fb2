//! Command-line interface of the `pathtrace` binary.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;

use clap::Parser;

use crate::error::Result;
use crate::path::join_lexically;
use crate::paths::IgnoreRoots;

/// Ignore roots applied unless `--no-default-ignores` is given.
pub const DEFAULT_IGNORE_ROOTS: &[&str] = &["/proc", "/tmp"];

#[derive(Parser, Debug)]
#[command(name = "pathtrace")]
#[command(version)]
#[command(about = "List the files a command touches, found by tracing its syscalls", long_about = None)]
pub struct Cli {
    /// Leave out paths at or below DIR (repeatable)
    #[arg(short = 'i', long = "ignore", value_name = "DIR")]
    pub ignore: Vec<PathBuf>,

    /// Do not ignore /proc and /tmp by default
    #[arg(long = "no-default-ignores")]
    pub no_default_ignores: bool,

    /// Log diagnostics to stderr (-v info, -vv debug, -vvv trace). RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Command to trace, with its arguments
    #[arg(
        value_name = "COMMAND",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<OsString>,
}

impl Cli {
    /// Effective ignore roots: the defaults, if enabled, followed by every `--ignore`.
    ///
    /// Reported paths are always absolute, so relative roots are taken from our current
    /// directory.
    pub fn ignore_roots(&self) -> Result<IgnoreRoots> {
        let defaults = if self.no_default_ignores {
            &[][..]
        } else {
            DEFAULT_IGNORE_ROOTS
        };

        let mut roots: Vec<PathBuf> = defaults.iter().map(PathBuf::from).collect();

        for root in &self.ignore {
            if root.is_absolute() {
                roots.push(root.clone());
            } else {
                roots.push(join_lexically(&std::env::current_dir()?, root));
            }
        }

        Ok(IgnoreRoots::new(roots))
    }

    /// Build the command to trace. It inherits our environment, working directory, and
    /// standard streams.
    pub fn command(&self) -> Command {
        let mut argv = self.command.iter();

        // `required = true` guarantees a program, but an empty one fails to spawn anyway.
        let program = argv.next().cloned().unwrap_or_default();

        let mut cmd = Command::new(program);
        cmd.args(argv);
        cmd
    }

    /// Default log level for the `-v` count.
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}
