pub mod init;

pub use init::{flush_logs, init_tracing, init_tracing_with_file};
