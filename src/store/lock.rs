//! Lock files as a cross-process mutex
//!
//! Acquiring a lock atomically creates its file; releasing deletes it. The
//! file records the owner pid so the garbage collector can tell a crashed
//! owner from a live one.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::error::{Result, StashError};

/// Cloneable flag that aborts lock waits and background work
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How long to keep retrying a held lock
#[derive(Debug, Clone)]
pub enum LockWait {
    /// Give up after this long; zero means a single attempt
    Timeout(Duration),
    /// Retry until the token is cancelled
    Until(CancellationToken),
}

impl LockWait {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn immediate() -> Self {
        LockWait::Timeout(Duration::ZERO)
    }
}

impl Default for LockWait {
    fn default() -> Self {
        LockWait::Timeout(Self::DEFAULT_TIMEOUT)
    }
}

/// A held lock file, released on drop
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    released: bool,
}

impl FileLock {
    /// Single attempt; `None` when someone else holds the lock
    pub fn try_acquire(path: impl Into<PathBuf>) -> Result<Option<Self>> {
        let path = path.into();
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let lock = FileLock {
            path,
            released: false,
        };
        write!(file, "{}", std::process::id())?;
        trace!(path = %lock.path.display(), "lock acquired");
        Ok(Some(lock))
    }

    /// Retry every `retry` until acquired, timed out or cancelled
    pub fn acquire(path: impl Into<PathBuf>, wait: &LockWait, retry: Duration) -> Result<Self> {
        let path = path.into();
        let started = Instant::now();

        loop {
            if let Some(lock) = FileLock::try_acquire(&path)? {
                return Ok(lock);
            }

            match wait {
                LockWait::Timeout(timeout) => {
                    if started.elapsed() >= *timeout {
                        return Err(StashError::LockTimeout {
                            path,
                            timeout: *timeout,
                        });
                    }
                }
                LockWait::Until(token) => {
                    if token.is_cancelled() {
                        return Err(StashError::Cancelled { path });
                    }
                }
            }
            thread::sleep(retry);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(mut self) -> Result<()> {
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "lock file vanished before release");
            }
            Err(e) => return Err(e.into()),
        }
        trace!(path = %self.path.display(), "lock released");
        Ok(())
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Pid recorded in a lock file, `None` if the file is gone or unreadable
pub fn read_owner(path: &Path) -> Result<Option<u32>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content.trim().parse().ok()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Whether a process with this pid still runs
#[cfg(unix)]
pub fn owner_is_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: kill with signal 0 sends nothing and only reads its integer arguments
    let rc = unsafe { libc::kill(pid, 0) };
    // EPERM means the process exists under another user
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn owner_is_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.lock");
        let lock = FileLock::try_acquire(&path).unwrap().unwrap();
        assert!(FileLock::try_acquire(&path).unwrap().is_none());
        lock.release().unwrap();
        assert!(!path.exists());
        assert!(FileLock::try_acquire(&path).unwrap().is_some());
    }

    #[test]
    fn test_drop_releases() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.lock");
        {
            let _lock = FileLock::try_acquire(&path).unwrap().unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_lock_records_owner() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.lock");
        let _lock = FileLock::try_acquire(&path).unwrap().unwrap();
        assert_eq!(read_owner(&path).unwrap(), Some(std::process::id()));
        assert!(owner_is_alive(std::process::id()));
        assert_eq!(read_owner(&dir.path().join("missing")).unwrap(), None);
    }

    #[test]
    fn test_release_tolerates_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.lock");
        let lock = FileLock::try_acquire(&path).unwrap().unwrap();
        fs::remove_file(&path).unwrap();
        assert!(lock.release().is_ok());
    }

    #[test]
    fn test_zero_timeout_tries_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.lock");
        let _held = FileLock::try_acquire(&path).unwrap().unwrap();
        let err = FileLock::acquire(&path, &LockWait::immediate(), Duration::from_millis(1))
            .unwrap_err();
        assert!(matches!(err, StashError::LockTimeout { .. }));
        assert!(err.is_lock());
    }

    #[test]
    fn test_cancelled_wait() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.lock");
        let _held = FileLock::try_acquire(&path).unwrap().unwrap();

        let token = CancellationToken::new();
        let canceller = token.clone();
        let waiter = thread::spawn(move || {
            FileLock::acquire(&path, &LockWait::Until(token), Duration::from_millis(5))
        });
        thread::sleep(Duration::from_millis(30));
        canceller.cancel();

        let err = waiter.join().unwrap().unwrap_err();
        assert!(matches!(err, StashError::Cancelled { .. }));
    }

    #[test]
    fn test_wait_succeeds_after_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.lock");
        let held = FileLock::try_acquire(&path).unwrap().unwrap();

        let waiter_path = path.clone();
        let waiter = thread::spawn(move || {
            FileLock::acquire(
                &waiter_path,
                &LockWait::Timeout(Duration::from_secs(5)),
                Duration::from_millis(5),
            )
        });
        thread::sleep(Duration::from_millis(30));
        held.release().unwrap();

        assert!(waiter.join().unwrap().is_ok());
    }
}
