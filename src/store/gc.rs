//! Reclaims abandoned transactions and lock files
//!
//! Only entries under the transactions directory are ever removed:
//! - a lock file whose owner process is gone, or whose owner cannot be read
//!   and which is older than the grace period;
//! - a transaction directory without a lock file that is older than the
//!   grace period.
//!
//! A lock is renamed to a tombstone before it is deleted, and its owner is
//! checked again on the tombstone, so a lock retaken by a live process in
//! the meantime is put back rather than removed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::store::lock::{owner_is_alive, read_owner, CancellationToken};
use crate::store::TRANSACTION_LOCK;

const TOMBSTONE_EXTENSION: &str = "reap";

fn tombstone_path(lock: &Path) -> PathBuf {
    let name = lock
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    lock.with_file_name(format!("{}.{}.{}", name, Uuid::new_v4(), TOMBSTONE_EXTENSION))
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Summary of one collection pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    pub locks_removed: usize,
    pub transactions_removed: usize,
    /// Transactions left alone because they are in use or too young
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct GarbageCollector {
    transactions_dir: PathBuf,
    grace: Duration,
}

impl GarbageCollector {
    pub fn new(transactions_dir: impl Into<PathBuf>, grace: Duration) -> Self {
        GarbageCollector {
            transactions_dir: transactions_dir.into(),
            grace,
        }
    }

    /// Run one collection pass
    pub fn collect(&self) -> Result<GcReport> {
        let mut report = GcReport::default();
        let entries = match fs::read_dir(&self.transactions_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            if file_type.is_dir() {
                self.collect_transaction(&path, &mut report)?;
            } else if path.extension().is_some_and(|ext| ext == "lock")
                && self.remove_abandoned_lock(&path)?
            {
                report.locks_removed += 1;
            } else if path.extension().is_some_and(|ext| ext == TOMBSTONE_EXTENSION)
                && self.older_than_grace(&path)?
            {
                // Left behind by a collector that stopped mid-reap
                remove_if_present(&path)?;
                report.locks_removed += 1;
            }
        }

        if report.locks_removed > 0 || report.transactions_removed > 0 {
            info!(
                locks = report.locks_removed,
                transactions = report.transactions_removed,
                "garbage collected"
            );
        }
        Ok(report)
    }

    fn collect_transaction(&self, dir: &Path, report: &mut GcReport) -> Result<()> {
        let lock = dir.join(TRANSACTION_LOCK);
        if lock.exists() {
            if !self.remove_abandoned_lock(&lock)? {
                report.skipped += 1;
                return Ok(());
            }
            report.locks_removed += 1;
        } else if !self.older_than_grace(dir)? {
            report.skipped += 1;
            return Ok(());
        }

        match fs::remove_dir_all(dir) {
            Ok(()) => {
                debug!(dir = %dir.display(), "removed transaction");
                report.transactions_removed += 1;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Delete `lock` if nobody can still be holding it
    fn remove_abandoned_lock(&self, lock: &Path) -> Result<bool> {
        if !self.is_abandoned(lock)? {
            return Ok(false);
        }
        self.reap(lock)
    }

    fn is_abandoned(&self, lock: &Path) -> Result<bool> {
        match read_owner(lock)? {
            Some(pid) => Ok(!owner_is_alive(pid)),
            // Unreadable owner: maybe still being written
            None => self.older_than_grace(lock),
        }
    }

    /// Move `lock` to a private tombstone, then delete it only if its owner is still gone
    ///
    /// Another collector may have reaped the same lock already and a new owner
    /// taken it; the check on the tombstone sees that owner, and the lock is
    /// linked back into place.
    fn reap(&self, lock: &Path) -> Result<bool> {
        let tombstone = tombstone_path(lock);
        match fs::rename(lock, &tombstone) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        if self.is_abandoned(&tombstone)? {
            remove_if_present(&tombstone)?;
            debug!(lock = %lock.display(), "removed abandoned lock");
            return Ok(true);
        }

        match fs::hard_link(&tombstone, lock) {
            Ok(()) => debug!(lock = %lock.display(), "returned live lock"),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                warn!(lock = %lock.display(), "lock retaken while being returned")
            }
            Err(e) => return Err(e.into()),
        }
        remove_if_present(&tombstone)?;
        Ok(false)
    }

    fn older_than_grace(&self, path: &Path) -> Result<bool> {
        let modified = match fs::metadata(path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        Ok(age >= self.grace)
    }

    /// Collect every `interval` on a background thread until stopped
    pub fn spawn(self, interval: Duration) -> GcHandle {
        let token = CancellationToken::new();
        let worker_token = token.clone();

        let thread = thread::spawn(move || {
            while !worker_token.is_cancelled() {
                if let Err(e) = self.collect() {
                    warn!(error = %e, "garbage collection failed");
                }

                let deadline = Instant::now() + interval;
                while !worker_token.is_cancelled() {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    thread::sleep((deadline - now).min(Duration::from_millis(50)));
                }
            }
            debug!("garbage collector stopped");
        });

        GcHandle {
            token,
            thread: Some(thread),
        }
    }
}

/// Running background collector; stops when dropped
pub struct GcHandle {
    token: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl GcHandle {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.token.cancel();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for GcHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
