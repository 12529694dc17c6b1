use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::{debug, info};

use super::{
    external::ExternalLock,
    registry::{LockHandle, LockRegistry, sanitize_name},
};
use crate::{
    config::{self, LockConfig},
    error::{Error, Result},
};

/// Default poll interval while waiting for an external lock.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(10);

/// How a named lock is taken.
///
/// The defaults give an in-process lock from the global registry. Call sites
/// that share a lock file prefix can keep one preset and clone it.
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// Prefix for the lock file name, joined with a hyphen.
    pub prefix: Option<String>,
    /// Also take a cross-process file lock.
    pub external: bool,
    /// Lock directory; overrides the configured one.
    pub lock_path: Option<PathBuf>,
    /// Registry to take the in-process lock from; the global one if unset.
    pub registry: Option<LockRegistry>,
    /// Configuration; the process-wide default if unset.
    pub config: Option<LockConfig>,
    /// Poll interval while waiting for the external lock.
    pub delay: Duration,
    /// Log acquire and release lines.
    pub do_log: bool,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            prefix: None,
            external: false,
            lock_path: None,
            registry: None,
            config: None,
            delay: DEFAULT_DELAY,
            do_log: true,
        }
    }
}

impl LockOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for call sites that share a lock file prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub const fn external(mut self, external: bool) -> Self {
        self.external = external;
        self
    }

    #[must_use]
    pub fn lock_path(mut self, lock_path: impl Into<PathBuf>) -> Self {
        self.lock_path = Some(lock_path.into());
        self
    }

    #[must_use]
    pub fn registry(mut self, registry: LockRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    #[must_use]
    pub fn config(mut self, config: LockConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub const fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub const fn do_log(mut self, do_log: bool) -> Self {
        self.do_log = do_log;
        self
    }

    fn resolved_registry(&self) -> &LockRegistry {
        self.registry.as_ref().unwrap_or_else(|| LockRegistry::global())
    }

    fn resolved_config(&self) -> LockConfig {
        self.config.clone().unwrap_or_else(config::current)
    }

    /// Lock file path for `name`, or `None` if only the in-process lock applies.
    fn external_path(&self, name: &str) -> Result<Option<PathBuf>> {
        let cfg = self.resolved_config();
        if !self.external || cfg.disable_process_locking {
            return Ok(None);
        }
        let dir = non_empty(self.lock_path.as_deref()).or(cfg.lock_path.as_deref());
        resolve_lock_path(name, self.prefix.as_deref(), dir).map(Some)
    }
}

/// Path of the external lock file for `name`.
///
/// Falls back to the configured lock directory when `lock_path` is `None` or
/// empty.
///
/// # Errors
/// Returns [`Error::MissingLockPath`] if no lock directory is known.
pub fn lock_file_path(name: &str, prefix: Option<&str>, lock_path: Option<&Path>) -> Result<PathBuf> {
    match non_empty(lock_path) {
        Some(dir) => resolve_lock_path(name, prefix, Some(dir)),
        None => resolve_lock_path(name, prefix, config::current().lock_path.as_deref()),
    }
}

fn non_empty(dir: Option<&Path>) -> Option<&Path> {
    dir.filter(|d| !d.as_os_str().is_empty())
}

fn resolve_lock_path(name: &str, prefix: Option<&str>, dir: Option<&Path>) -> Result<PathBuf> {
    let mut file_name = sanitize_name(name);
    if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
        let sep = if prefix.ends_with('-') { "" } else { "-" };
        file_name = format!("{prefix}{sep}{file_name}");
    }

    let dir = dir
        .filter(|d| !d.as_os_str().is_empty())
        .ok_or(Error::MissingLockPath)?;
    Ok(dir.join(file_name))
}

/// Registry handle for `name`, not yet acquired.
pub fn internal_lock(name: &str, registry: Option<&LockRegistry>) -> LockHandle {
    registry.unwrap_or_else(|| LockRegistry::global()).get(name)
}

/// Unacquired external lock at the derived path for `name`.
///
/// # Errors
/// Returns [`Error::MissingLockPath`] if no lock directory is known.
pub fn external_lock(
    name: &str,
    prefix: Option<&str>,
    lock_path: Option<&Path>,
) -> Result<ExternalLock> {
    lock_file_path(name, prefix, lock_path).map(ExternalLock::new)
}

/// Delete the lock file for `name` while holding its in-process lock.
///
/// A file that cannot be removed is logged and otherwise ignored.
///
/// # Errors
/// Returns [`Error::MissingLockPath`] if no lock directory is known.
pub fn remove_external_lock_file(name: &str, options: &LockOptions) -> Result<()> {
    let cfg = options.resolved_config();
    let dir = non_empty(options.lock_path.as_deref()).or(cfg.lock_path.as_deref());
    let path = resolve_lock_path(name, options.prefix.as_deref(), dir)?;

    let _guard = NamedLock::acquire(name, &options.clone().external(false))?;
    if let Err(e) = fs::remove_file(&path) {
        info!(file = %path.display(), error = %e, "Failed to remove file");
    }
    Ok(())
}

/// A held named lock: the in-process entry, plus the file lock when external.
///
/// Dropping the guard releases the file lock first, then the in-process lock.
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct NamedLock {
    name: String,
    internal: LockHandle,
    external: Option<ExternalLock>,
    do_log: bool,
}

impl NamedLock {
    /// Acquire the named lock, blocking until it is available.
    ///
    /// The lock directory is resolved before anything is taken, so a missing
    /// directory leaves every lock untouched.
    ///
    /// # Errors
    /// Returns [`Error::MissingLockPath`] for an external lock without a lock
    /// directory, or [`Error::LockFile`] if the file lock fails.
    pub fn acquire(name: &str, options: &LockOptions) -> Result<Self> {
        let external_path = options.external_path(name)?;

        let internal = options.resolved_registry().get(name);
        internal.acquire();
        if options.do_log {
            debug!("Acquired semaphore \"{name}\"");
        }

        // Build the guard first so a failing file lock still releases the
        // in-process entry.
        let mut guard = Self {
            name: name.to_string(),
            internal,
            external: None,
            do_log: options.do_log,
        };

        if let Some(path) = external_path {
            let mut ext = ExternalLock::new(path);
            ext.acquire(options.delay, None)?;
            guard.external = Some(ext);
        }

        Ok(guard)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the held file lock, if this lock spans processes.
    pub fn lock_file(&self) -> Option<&Path> {
        self.external.as_ref().map(ExternalLock::path)
    }
}

impl Drop for NamedLock {
    fn drop(&mut self) {
        if let Some(mut ext) = self.external.take() {
            ext.release();
        }
        if self.do_log {
            debug!("Releasing semaphore \"{}\"", self.name);
        }
        self.internal.release();
    }
}

/// Acquire the named lock `name`. See [`NamedLock::acquire`].
///
/// # Errors
/// See [`NamedLock::acquire`].
pub fn lock(name: &str, options: &LockOptions) -> Result<NamedLock> {
    NamedLock::acquire(name, options)
}
