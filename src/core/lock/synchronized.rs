use std::{any::type_name, time::Instant};

use tracing::debug;

use super::named::{LockOptions, NamedLock};
use crate::error::{Error, Result};

/// Runs operations only while the named lock is held.
///
/// Exclusion is by name: every `Synchronized` built for the same name (and
/// registry) excludes every other, whatever operation it wraps.
#[derive(Debug, Clone)]
pub struct Synchronized {
    name: String,
    options: LockOptions,
}

impl Synchronized {
    pub fn new(name: impl Into<String>, options: LockOptions) -> Self {
        Self {
            name: name.into(),
            options: options.do_log(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `f` under the lock.
    ///
    /// # Errors
    /// Returns an error only if the lock could not be taken; `f` is not run then.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        let function = type_name_of(&f);
        self.run_as(function, f)
    }

    /// Like [`Synchronized::run`], with an explicit label for the log lines.
    ///
    /// # Errors
    /// Returns an error only if the lock could not be taken.
    pub fn run_as<R>(&self, function: &str, f: impl FnOnce() -> R) -> Result<R> {
        let mut timer = HoldTimer::start(&self.name, function);
        let _guard = NamedLock::acquire(&self.name, &self.options)?;
        timer.acquired();
        Ok(f())
    }

    /// Run a fallible `f` under the lock, folding lock errors into `E`.
    ///
    /// # Errors
    /// Returns the lock error converted into `E`, or whatever `f` returned.
    pub fn try_run<T, E>(
        &self,
        f: impl FnOnce() -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<Error>,
    {
        self.run(f)?
    }

    /// Turn `f` into a callable that takes the lock on every call.
    ///
    /// Operations with several arguments take them as a tuple.
    pub fn wrap<A, R, F>(self, f: F) -> impl Fn(A) -> Result<R>
    where
        F: Fn(A) -> R,
    {
        let function = type_name::<F>();
        move |args| self.run_as(function, || f(args))
    }
}

/// Wrap `f` so each call runs under the named lock `name`.
pub fn synchronized<A, R, F>(
    name: &str,
    options: LockOptions,
    f: F,
) -> impl Fn(A) -> Result<R> + use<A, R, F>
where
    F: Fn(A) -> R,
{
    Synchronized::new(name, options).wrap(f)
}

fn type_name_of<T>(_: &T) -> &'static str {
    type_name::<T>()
}

/// Logs wait and hold durations. The hold line is written on drop, so it
/// appears on every exit path, including unwinding.
struct HoldTimer<'a> {
    name: &'a str,
    function: &'a str,
    started: Instant,
    acquired: Option<Instant>,
}

impl<'a> HoldTimer<'a> {
    fn start(name: &'a str, function: &'a str) -> Self {
        Self {
            name,
            function,
            started: Instant::now(),
            acquired: None,
        }
    }

    fn acquired(&mut self) {
        let now = Instant::now();
        debug!(
            "Lock \"{}\" acquired by \"{}\" :: waited {:.3}s",
            self.name,
            self.function,
            now.duration_since(self.started).as_secs_f64()
        );
        self.acquired = Some(now);
    }
}

impl Drop for HoldTimer<'_> {
    fn drop(&mut self) {
        let held = self.acquired.map_or_else(
            || "N/A".to_string(),
            |at| format!("{:.3}s", at.elapsed().as_secs_f64()),
        );
        debug!(
            "Lock \"{}\" released by \"{}\" :: held {}",
            self.name, self.function, held
        );
    }
}
