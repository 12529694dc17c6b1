//! Named in-process and cross-process locks, and a hardened wrapper for
//! running external commands.
//!
//! ```no_run
//! use lockutils::{ExecuteOptions, LockOptions, Synchronized, execute};
//!
//! let sync = Synchronized::new("db-migrate", LockOptions::new());
//! let out = sync.run(|| execute(&["echo", "hi"], &ExecuteOptions::new()))??;
//! assert_eq!(out.stdout.to_text(), "hi\n");
//! # Ok::<(), lockutils::Error>(())
//! ```

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;

pub use config::LockConfig;
pub use crate::core::lock::{
    ExternalLock, LockEntry, LockHandle, LockOptions, LockRegistry, NamedLock, Synchronized,
    external_lock, internal_lock, lock, lock_file_path, remove_external_lock_file, synchronized,
};
pub use crate::core::process::{
    CheckExitCode, ExecuteOptions, ExecutionResult, LogErrors, RemoteChannel, RemoteOutput,
    Stream, execute, get_worker_count, mask_password, ssh_execute, trycmd,
};
pub use error::{Error, ProcessExecutionError, Result};
