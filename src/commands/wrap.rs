use std::{os::unix::process::ExitStatusExt, process::ExitStatus};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::Command;
use crate::{app::context::AppContext, config::LOCK_PATH_ENV};

/// Runs a command with a private lock directory exported in the environment.
pub struct WrapCommand<'a> {
    pub command: &'a [String],
}

impl Command for WrapCommand<'_> {
    fn run(&self, _ctx: &AppContext) -> Result<i32> {
        let (program, args) = self
            .command
            .split_first()
            .context("no command given")?;

        let lock_dir = tempfile::Builder::new()
            .prefix("lockutils-")
            .tempdir()
            .context("failed to create temporary lock directory")?;
        debug!(path = %lock_dir.path().display(), "created lock directory");

        let status = std::process::Command::new(program)
            .args(args)
            .env(LOCK_PATH_ENV, lock_dir.path())
            .status()
            .with_context(|| format!("failed to run {program}"));

        let path = lock_dir.path().to_path_buf();
        if let Err(e) = lock_dir.close() {
            warn!(path = %path.display(), error = %e, "failed to remove lock directory");
        }

        Ok(exit_code_of(status?))
    }
}

/// Exit code to propagate; 128 + signal for a killed child.
fn exit_code_of(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| status.signal().map_or(1, |sig| 128 + sig))
}
