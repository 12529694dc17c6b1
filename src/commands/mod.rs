use anyhow::Result;

use crate::{
    app::context::AppContext,
    cli::{Cli, Commands},
};

pub mod remove_lock;
pub mod run;
pub mod workers;
pub mod wrap;

/// Unified interface implemented by each subcommand handler.
pub trait Command {
    /// Execute the subcommand and return the process exit code.
    ///
    /// # Errors
    /// Returns an error if the command could not be carried out.
    fn run(&self, ctx: &AppContext) -> Result<i32>;
}

/// Central dispatcher: routes parsed CLI to subcommand handlers.
///
/// # Errors
/// Returns an error if the invoked subcommand fails.
pub fn dispatch(cli: &Cli) -> Result<i32> {
    let ctx = AppContext::from_env(cli.verbose);

    match &cli.command {
        Commands::Wrap { command } => wrap::WrapCommand { command }.run(&ctx),
        Commands::Run {
            lock,
            external,
            prefix,
            lock_path,
            options,
            trycmd,
            discard_warnings,
            command,
        } => {
            let cmd = run::RunCommand {
                lock: lock.as_deref(),
                external: *external,
                prefix: prefix.as_deref(),
                lock_path: lock_path.as_deref(),
                options,
                trycmd: *trycmd,
                discard_warnings: *discard_warnings,
                command,
            };
            cmd.run(&ctx)
        }
        Commands::RemoveLock {
            name,
            prefix,
            lock_path,
        } => {
            let cmd = remove_lock::RemoveLockCommand {
                name,
                prefix: prefix.as_deref(),
                lock_path: lock_path.as_deref(),
            };
            cmd.run(&ctx)
        }
        Commands::Workers => workers::WorkersCommand.run(&ctx),
    }
}
