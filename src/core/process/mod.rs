pub mod execute;
pub mod mask;
pub mod options;
pub mod ssh;

pub use execute::{ExecutionResult, Stream, execute, get_worker_count, trycmd};
pub use mask::mask_password;
pub use options::{CheckExitCode, ExecuteOptions, LogErrors, ProcessCallback};
pub use ssh::{RemoteChannel, RemoteOutput, ssh_execute};
