//! Command execution over an already-connected remote channel.

use std::{collections::HashMap, io};

use tracing::debug;

use super::{
    execute::{ExecutionResult, Stream, decode},
    mask::mask_password,
};
use crate::error::{Error, ProcessExecutionError, Result};

/// Exit status reported when the remote side returned none.
pub const UNKNOWN_EXIT_STATUS: i32 = -1;

/// Everything a remote command produced.
#[derive(Debug, Clone, Default)]
pub struct RemoteOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// [`UNKNOWN_EXIT_STATUS`] if the remote did not report one.
    pub exit_status: i32,
}

/// A transport that can run a command string remotely.
pub trait RemoteChannel {
    /// Run `cmd`, read all output and wait for the exit status.
    ///
    /// # Errors
    /// Returns an error if the transport fails.
    fn exec_command(&mut self, cmd: &str) -> io::Result<RemoteOutput>;
}

/// Run `cmd` over `channel`.
///
/// There is no retry. Output is masked on both success and failure, since it
/// may be echoed by the remote shell.
///
/// # Errors
/// - [`Error::InvalidArgument`] for a non-empty environment or input.
/// - [`Error::Spawn`] if the channel fails.
/// - [`Error::Execution`] for a non-zero exit when `check_exit_code` is set.
pub fn ssh_execute<C: RemoteChannel + ?Sized>(
    channel: &mut C,
    cmd: &str,
    process_input: Option<&[u8]>,
    addl_env: Option<&HashMap<String, String>>,
    check_exit_code: bool,
    binary: bool,
) -> Result<ExecutionResult> {
    let sanitized = mask_password(cmd);
    debug!("Running cmd (SSH): {sanitized}");

    if addl_env.is_some_and(|env| !env.is_empty()) {
        return Err(Error::InvalidArgument(
            "Environment not supported over SSH".to_string(),
        ));
    }
    if process_input.is_some_and(|input| !input.is_empty()) {
        return Err(Error::InvalidArgument(
            "process_input not supported over SSH".to_string(),
        ));
    }

    let output = channel.exec_command(cmd).map_err(|source| Error::Spawn {
        cmd: sanitized.clone(),
        source,
    })?;

    let stdout = mask_password(&decode(output.stdout));
    let stderr = mask_password(&decode(output.stderr));
    let exit_code = (output.exit_status != UNKNOWN_EXIT_STATUS).then_some(output.exit_status);

    if let Some(code) = exit_code {
        debug!("Result was {code}");
        if check_exit_code && code != 0 {
            return Err(ProcessExecutionError {
                exit_code,
                stdout,
                stderr,
                cmd: sanitized,
                description: None,
            }
            .into());
        }
    }

    Ok(ExecutionResult {
        stdout: Stream::new(stdout.into_bytes(), binary),
        stderr: Stream::new(stderr.into_bytes(), binary),
        exit_code,
    })
}
