use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Advisory lock on a file shared by cooperating processes.
///
/// The file is created on first acquire and is never written to.
#[derive(Debug)]
pub struct ExternalLock {
    path: PathBuf,
    file: Option<File>,
}

impl ExternalLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub const fn is_acquired(&self) -> bool {
        self.file.is_some()
    }

    /// Poll for the lock every `delay` until it is taken.
    ///
    /// With `timeout` of `None` this blocks until the lock is available.
    /// Returns `Ok(false)` if the timeout elapsed first.
    ///
    /// # Errors
    /// Returns an error if the lock file cannot be created or locked.
    pub fn acquire(&mut self, delay: Duration, timeout: Option<Duration>) -> Result<bool> {
        if self.file.is_some() {
            return Ok(true);
        }

        let file = self.open()?;
        let started = Instant::now();
        let mut logged = false;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    self.file = Some(file);
                    return Ok(true);
                }
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {}
                Err(source) => {
                    return Err(Error::LockFile {
                        path: self.path.clone(),
                        source,
                    });
                }
            }

            if timeout.is_some_and(|limit| started.elapsed() >= limit) {
                return Ok(false);
            }
            if !logged {
                debug!(path = %self.path.display(), "waiting for external lock");
                logged = true;
            }
            thread::sleep(delay);
        }
    }

    /// Release the lock if held. Releasing an unheld lock is a no-op.
    pub fn release(&mut self) {
        if let Some(file) = self.file.take()
            && let Err(e) = FileExt::unlock(&file)
        {
            warn!(path = %self.path.display(), error = %e, "failed to unlock external lock");
        }
    }

    fn open(&self) -> Result<File> {
        let lock_err = |source: io::Error| Error::LockFile {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(lock_err)?;
        }

        OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(lock_err)
    }
}

impl Drop for ExternalLock {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::mpsc, thread, time::Duration};

    use super::*;

    const DELAY: Duration = Duration::from_millis(5);

    #[test]
    fn lock_blocks_until_released() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("held.lock");
        let mut first = ExternalLock::new(&path);
        assert!(first.acquire(DELAY, None).expect("first lock"));

        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let mut second = ExternalLock::new(&path);
            second.acquire(DELAY, None).expect("second lock");
            tx.send(()).expect("send");
        });

        // The second lock should still be blocked.
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        first.release();

        // After releasing the first lock, the second must proceed.
        rx.recv_timeout(Duration::from_secs(2))
            .expect("second lock must proceed after release");
        handle.join().expect("thread join");
    }

    #[test]
    fn acquire_times_out_while_contended() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("busy.lock");
        let mut holder = ExternalLock::new(&path);
        assert!(holder.acquire(DELAY, None).expect("holder"));

        let mut other = ExternalLock::new(&path);
        let got = other
            .acquire(DELAY, Some(Duration::from_millis(50)))
            .expect("acquire");
        assert!(!got);
        assert!(!other.is_acquired());
    }

    #[test]
    fn creates_missing_parent_directories() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("nested").join("dir").join("x.lock");
        let mut lock = ExternalLock::new(&path);
        assert!(lock.acquire(DELAY, None).expect("lock"));
        assert!(path.exists());
    }
}
