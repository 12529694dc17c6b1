use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

/// lockutils command-line interface
#[derive(Parser, Debug, Clone)]
#[command(name = "lockutils", version, about = "Named locks and guarded command execution", long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv). `RUST_LOG` overrides this.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, value_name = "DIR", global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run a command with a fresh temporary lock directory, removed afterwards
    Wrap {
        /// Command and arguments to run
        #[arg(value_name = "CMD", required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Run a command with retries, optionally while holding a named lock
    Run {
        /// Hold this named lock while the command runs
        #[arg(long, value_name = "NAME")]
        lock: Option<String>,

        /// Make the lock cross-process (needs a lock directory)
        #[arg(long, requires = "lock")]
        external: bool,

        /// Prefix for the lock file name
        #[arg(long, value_name = "PREFIX", requires = "lock")]
        prefix: Option<String>,

        /// Directory for lock files (defaults to LOCKUTILS_LOCK_PATH)
        #[arg(long, value_name = "DIR", requires = "lock")]
        lock_path: Option<PathBuf>,

        /// Execution option, e.g. `-o attempts=3 -o check_exit_code=0,1`
        #[arg(short = 'o', long = "option", value_name = "KEY=VALUE")]
        options: Vec<String>,

        /// Report failures as output instead of an error exit
        #[arg(long)]
        trycmd: bool,

        /// With --trycmd, drop stderr of successful commands
        #[arg(long, requires = "trycmd")]
        discard_warnings: bool,

        /// Command and arguments to run
        #[arg(value_name = "CMD", required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Delete the lock file for a named lock
    RemoveLock {
        #[arg(value_name = "NAME")]
        name: String,

        /// Prefix for the lock file name
        #[arg(long, value_name = "PREFIX")]
        prefix: Option<String>,

        /// Directory for lock files (defaults to LOCKUTILS_LOCK_PATH)
        #[arg(long, value_name = "DIR")]
        lock_path: Option<PathBuf>,
    },

    /// Print the number of available CPUs
    Workers,
}
