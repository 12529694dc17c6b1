use std::{
    env,
    path::PathBuf,
    sync::{PoisonError, RwLock},
};

use tracing::warn;

/// Environment variable naming the directory for external lock files.
pub const LOCK_PATH_ENV: &str = "LOCKUTILS_LOCK_PATH";
/// Environment variable that turns external locks into in-process locks.
pub const DISABLE_PROCESS_LOCKING_ENV: &str = "LOCKUTILS_DISABLE_PROCESS_LOCKING";

/// Lock configuration consumed by the named lock layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockConfig {
    /// Directory holding external lock files. Required for external locks.
    pub lock_path: Option<PathBuf>,
    /// When set, external lock requests only take the in-process lock.
    pub disable_process_locking: bool,
}

static CURRENT: RwLock<Option<LockConfig>> = RwLock::new(None);

impl LockConfig {
    /// Load configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Some(dir) = env::var_os(LOCK_PATH_ENV)
            && !dir.is_empty()
        {
            out.lock_path = Some(PathBuf::from(dir));
        }
        if let Ok(raw) = env::var(DISABLE_PROCESS_LOCKING_ENV) {
            match parse_bool(&raw) {
                Some(v) => out.disable_process_locking = v,
                None => warn!(
                    value = %raw,
                    "ignoring invalid {DISABLE_PROCESS_LOCKING_ENV}"
                ),
            }
        }

        out
    }

    #[must_use]
    pub fn with_lock_path(mut self, lock_path: impl Into<PathBuf>) -> Self {
        self.lock_path = Some(lock_path.into());
        self
    }

    #[must_use]
    pub const fn with_process_locking_disabled(mut self, disabled: bool) -> Self {
        self.disable_process_locking = disabled;
        self
    }
}

/// Process-wide default configuration, read from the environment on first use.
pub fn current() -> LockConfig {
    if let Some(cfg) = CURRENT
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
    {
        return cfg.clone();
    }
    let mut slot = CURRENT.write().unwrap_or_else(PoisonError::into_inner);
    slot.get_or_insert_with(LockConfig::from_env).clone()
}

/// Replace the process-wide default configuration.
pub fn set_current(cfg: LockConfig) {
    *CURRENT.write().unwrap_or_else(PoisonError::into_inner) = Some(cfg);
}

/// Set the default lock directory, keeping the rest of the current configuration.
pub fn set_defaults(lock_path: impl Into<PathBuf>) {
    let cfg = current().with_lock_path(lock_path);
    set_current(cfg);
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
