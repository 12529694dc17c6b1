//! Error types for lock acquisition and command execution.

use std::{fmt, io, path::PathBuf};

use thiserror::Error;

/// Default description attached to a failed command.
pub const DEFAULT_DESCRIPTION: &str = "Unexpected error while running command.";

/// Main error type for lockutils operations.
#[derive(Error, Debug)]
pub enum Error {
    /// An external lock was requested but no lock directory is configured.
    #[error(
        "required option `lock_path` is not set; set LOCKUTILS_LOCK_PATH or pass a lock directory"
    )]
    MissingLockPath,

    /// An execution option had a bad value or conflicts with the channel.
    #[error("{0}")]
    InvalidArgument(String),

    /// An execution option name is not recognized.
    #[error("{0}")]
    UnknownArgument(String),

    /// Root execution requested without a helper while not privileged.
    #[error("Command requested root, but did not specify a root helper.")]
    NoRootHelper,

    /// The command ran but exited with a code outside the accepted set.
    #[error(transparent)]
    Execution(#[from] ProcessExecutionError),

    /// The OS could not create or talk to the process.
    #[error("failed to run {cmd}: {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: io::Error,
    },

    /// A lock file could not be opened, locked or removed.
    #[error("lock file {}: {source}", path.display())]
    LockFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Exit code carried by an execution failure, if any.
    pub const fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Execution(err) => err.exit_code,
            _ => None,
        }
    }
}

/// Result type alias for lockutils operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A command finished with an exit code the caller did not accept.
///
/// `stdout`, `stderr` and `cmd` are already masked for sensitive values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExecutionError {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub cmd: String,
    pub description: Option<String>,
}

impl ProcessExecutionError {
    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or(DEFAULT_DESCRIPTION)
    }
}

impl fmt::Display for ProcessExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self
            .exit_code
            .map_or_else(|| "-".to_string(), |c| c.to_string());
        write!(
            f,
            "{}\nCommand: {}\nExit code: {}\nStdout: {:?}\nStderr: {:?}",
            self.description(),
            self.cmd,
            code,
            self.stdout,
            self.stderr
        )
    }
}

impl std::error::Error for ProcessExecutionError {}
