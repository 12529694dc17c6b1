use crate::config::{self, LockConfig};

/// Shared state handed to every subcommand.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub cfg: LockConfig,
    pub verbosity: u8,
}

impl AppContext {
    pub const fn new(cfg: LockConfig, verbosity: u8) -> Self {
        Self { cfg, verbosity }
    }

    /// Convenience constructor using the process-wide configuration.
    pub fn from_env(verbosity: u8) -> Self {
        Self::new(config::current(), verbosity)
    }
}
