use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::domain::VersionMarker;
use crate::error::{Result, StashError};
use crate::store::lock::{FileLock, LockWait};
use crate::store::{TRANSACTION_DATA, TRANSACTION_LOCK};

/// Private staging area of one stash handle
struct Transaction {
    dir: PathBuf,
    _lock: FileLock,
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(dir = %self.dir.display(), error = %e, "failed to remove transaction");
            }
        }
    }
}

/// Handle on the stash of one marker
///
/// Files written with [`Stash::store`] stay private to this handle until
/// [`Stash::commit`] publishes them. Dropping the handle discards whatever
/// was not committed.
pub struct Stash {
    marker: VersionMarker,
    final_dir: PathBuf,
    transactions_dir: PathBuf,
    lock_wait: LockWait,
    lock_retry: Duration,
    transaction: Option<Transaction>,
    pending: BTreeSet<PathBuf>,
}

impl Stash {
    pub(crate) fn new(
        marker: VersionMarker,
        root: &Path,
        transactions_dir: PathBuf,
        lock_wait: LockWait,
        lock_retry: Duration,
    ) -> Self {
        Stash {
            final_dir: root.join(marker.directory_name()),
            marker,
            transactions_dir,
            lock_wait,
            lock_retry,
            transaction: None,
            pending: BTreeSet::new(),
        }
    }

    pub fn marker(&self) -> &VersionMarker {
        &self.marker
    }

    /// Whether a committed version of this stash exists
    pub fn exists(&self) -> bool {
        self.final_dir.is_dir()
    }

    /// Relative paths stored but not yet committed
    pub fn pending(&self) -> impl Iterator<Item = &Path> {
        self.pending.iter().map(PathBuf::as_path)
    }

    /// Staging directory of this handle, once something was stored
    pub fn transaction_dir(&self) -> Option<&Path> {
        self.transaction.as_ref().map(|t| t.dir.as_path())
    }

    fn begin(&mut self) -> Result<PathBuf> {
        if let Some(transaction) = &self.transaction {
            return Ok(transaction.dir.clone());
        }

        fs::create_dir_all(&self.transactions_dir)?;
        let dir = self.transactions_dir.join(Uuid::new_v4().to_string());
        fs::create_dir(&dir)?;
        let lock = FileLock::try_acquire(dir.join(TRANSACTION_LOCK))?.ok_or_else(|| {
            StashError::internal(format!("Fresh transaction {} is already locked", dir.display()))
        })?;
        fs::create_dir(dir.join(TRANSACTION_DATA))?;

        debug!(marker = %self.marker, dir = %dir.display(), "transaction started");
        self.transaction = Some(Transaction {
            dir: dir.clone(),
            _lock: lock,
        });
        Ok(dir)
    }

    /// Stream `reader` into the pending entry `relative_path`
    pub fn store(&mut self, mut reader: impl Read, relative_path: impl AsRef<Path>) -> Result<()> {
        let relative = validate_relative(relative_path.as_ref())?;
        let target = self.begin()?.join(TRANSACTION_DATA).join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = File::create(&target)?;
        let bytes = io::copy(&mut reader, &mut file)?;
        file.sync_all()?;

        debug!(marker = %self.marker, path = %relative.display(), bytes, "stored");
        self.pending.insert(relative);
        Ok(())
    }

    fn marker_lock(&self, wait: &LockWait) -> Result<FileLock> {
        fs::create_dir_all(&self.transactions_dir)?;
        let path = self
            .transactions_dir
            .join(format!("{}.lock", self.marker.directory_name()));
        FileLock::acquire(path, wait, self.lock_retry)
    }

    /// Publish the pending entries, waiting for the marker lock as configured
    pub fn commit(&mut self) -> Result<()> {
        let wait = self.lock_wait.clone();
        self.commit_with(&wait)
    }

    /// Publish the pending entries
    ///
    /// Fails with [`StashError::Conflict`] without publishing anything if any
    /// pending path is already committed. On any other failure the committed
    /// state is left as it was.
    pub fn commit_with(&mut self, wait: &LockWait) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let data_dir = match &self.transaction {
            Some(transaction) => transaction.dir.join(TRANSACTION_DATA),
            None => {
                return Err(StashError::internal(format!(
                    "{} has pending entries but no transaction",
                    self.marker
                )))
            }
        };

        let lock = self.marker_lock(wait)?;

        if let Some(existing) = self
            .pending
            .iter()
            .find(|relative| self.final_dir.join(relative).exists())
        {
            return Err(StashError::Conflict {
                marker: self.marker.identifier(),
                path: existing.clone(),
            });
        }

        if self.final_dir.exists() {
            self.move_pending(&data_dir)?;
        } else {
            self.publish_fresh(&data_dir)?;
        }
        lock.release()?;

        info!(marker = %self.marker, entries = self.pending.len(), "committed");
        self.pending.clear();
        Ok(())
    }

    /// Rename the staged tree into place, merging instead if the stash appeared meanwhile
    fn publish_fresh(&self, data_dir: &Path) -> Result<()> {
        match fs::rename(data_dir, &self.final_dir) {
            Ok(()) => Ok(()),
            Err(e) if self.final_dir.is_dir() => {
                debug!(marker = %self.marker, error = %e, "stash appeared while creating");
                self.move_pending(data_dir)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Move pending files one by one, undoing the moves on failure
    fn move_pending(&self, data_dir: &Path) -> Result<()> {
        let mut moved: Vec<&PathBuf> = Vec::new();
        let mut created: Vec<PathBuf> = Vec::new();

        for relative in &self.pending {
            let result = create_parents(&self.final_dir, relative, &mut created)
                .and_then(|_| fs::rename(data_dir.join(relative), self.final_dir.join(relative)));

            if let Err(e) = result {
                warn!(
                    marker = %self.marker,
                    path = %relative.display(),
                    error = %e,
                    rolled_back = moved.len(),
                    "commit failed"
                );
                self.roll_back(data_dir, &moved, &created);
                return Err(e.into());
            }
            moved.push(relative);
        }
        Ok(())
    }

    /// Return moved files to staging and drop the directories the move created
    fn roll_back(&self, data_dir: &Path, moved: &[&PathBuf], created: &[PathBuf]) {
        for relative in moved.iter().rev() {
            let target = self.final_dir.join(relative);
            if let Err(e) = fs::rename(&target, data_dir.join(relative)) {
                debug!(path = %target.display(), error = %e, "unstaged file deleted instead");
                let _ = fs::remove_file(&target);
            }
        }
        // Deepest first; only empty directories go
        for dir in created.iter().rev() {
            let _ = fs::remove_dir(dir);
        }
    }

    /// Open an entry: this handle's pending copy first, then the committed one
    pub fn get(&self, relative_path: impl AsRef<Path>) -> Result<Option<File>> {
        let relative = validate_relative(relative_path.as_ref())?;

        if self.pending.contains(&relative) {
            if let Some(transaction) = &self.transaction {
                let staged = transaction.dir.join(TRANSACTION_DATA).join(&relative);
                if let Some(file) = open_file(&staged)? {
                    return Ok(Some(file));
                }
            }
        }
        open_file(&self.final_dir.join(&relative))
    }

    /// Committed entries as sorted relative paths
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        if !self.final_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(&self.final_dir).min_depth(1) {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.final_dir)
                .map_err(|e| StashError::internal(e.to_string()))?;
            entries.push(relative.to_path_buf());
        }
        entries.sort();
        Ok(entries)
    }

    /// Remove the committed stash, waiting for the marker lock as configured
    pub fn delete(&mut self) -> Result<bool> {
        let wait = self.lock_wait.clone();
        self.delete_with(&wait)
    }

    /// Remove the committed stash; `false` if there was none
    pub fn delete_with(&mut self, wait: &LockWait) -> Result<bool> {
        let lock = self.marker_lock(wait)?;
        let existed = match fs::remove_dir_all(&self.final_dir) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        lock.release()?;

        if existed {
            info!(marker = %self.marker, "deleted");
        }
        Ok(existed)
    }
}

fn open_file(path: &Path) -> Result<Option<File>> {
    if !path.is_file() {
        return Ok(None);
    }
    match File::open(path) {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Create the missing parents of `relative` under `root`, recording each one
fn create_parents(root: &Path, relative: &Path, created: &mut Vec<PathBuf>) -> io::Result<()> {
    let Some(parent) = relative.parent() else {
        return Ok(());
    };

    let mut dir = root.to_path_buf();
    for component in parent.components() {
        dir.push(component);
        match fs::create_dir(&dir) {
            Ok(()) => created.push(dir.clone()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Normalized relative path; absolute paths and `..` are rejected
fn validate_relative(path: &Path) -> Result<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => {
                return Err(StashError::InvalidPath(format!(
                    "'{}' must be relative and stay inside the stash",
                    path.display()
                )))
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(StashError::InvalidPath(format!("'{}' names no file", path.display())));
    }
    Ok(clean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SemanticVersion;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn stash(root: &Path) -> Stash {
        let marker =
            VersionMarker::from_version(SemanticVersion::parse("20.21.0-beta").unwrap());
        Stash::new(
            marker,
            root,
            root.join(".transactions"),
            LockWait::default(),
            Duration::from_millis(5),
        )
    }

    fn read(file: Option<File>) -> String {
        let mut content = String::new();
        file.unwrap().read_to_string(&mut content).unwrap();
        content
    }

    #[test]
    fn test_validate_relative() {
        assert_eq!(validate_relative(Path::new("./a/b.txt")).unwrap(), PathBuf::from("a/b.txt"));
        assert!(validate_relative(Path::new("/etc/passwd")).is_err());
        assert!(validate_relative(Path::new("a/../../b")).is_err());
        assert!(validate_relative(Path::new(".")).is_err());
    }

    #[test]
    fn test_pending_entries_are_readable_before_commit() {
        let dir = TempDir::new().unwrap();
        let mut stash = stash(dir.path());
        stash.store(Cursor::new("x"), "a.txt").unwrap();

        assert_eq!(read(stash.get("a.txt").unwrap()), "x");
        assert!(stash.list().unwrap().is_empty());
        assert!(!stash.exists());
    }

    #[test]
    fn test_commit_renames_fresh_stash_into_place() {
        let dir = TempDir::new().unwrap();
        let mut stash = stash(dir.path());
        stash.store(Cursor::new("x"), "a.txt").unwrap();
        stash.store(Cursor::new("y"), "nested/b.txt").unwrap();
        stash.commit().unwrap();

        assert_eq!(
            stash.list().unwrap(),
            vec![PathBuf::from("a.txt"), PathBuf::from("nested/b.txt")]
        );
        assert_eq!(stash.pending().count(), 0);
        assert!(dir.path().join("unknown_20.21.0-beta/nested/b.txt").is_file());
    }

    #[test]
    fn test_commit_adds_to_existing_stash() {
        let dir = TempDir::new().unwrap();
        let mut stash = stash(dir.path());
        stash.store(Cursor::new("x"), "a.txt").unwrap();
        stash.commit().unwrap();
        stash.store(Cursor::new("y"), "b/c.txt").unwrap();
        stash.commit().unwrap();

        assert_eq!(
            stash.list().unwrap(),
            vec![PathBuf::from("a.txt"), PathBuf::from("b/c.txt")]
        );
    }

    #[test]
    fn test_failed_move_restores_committed_state() {
        let dir = TempDir::new().unwrap();
        let mut first = stash(dir.path());
        first.store(Cursor::new("file"), "x").unwrap();
        first.commit().unwrap();

        // b/c.txt moves, then x/y.txt fails because x is a file
        let mut second = stash(dir.path());
        second.store(Cursor::new("c"), "b/c.txt").unwrap();
        second.store(Cursor::new("y"), "x/y.txt").unwrap();
        let err = second.commit().unwrap_err();
        assert!(matches!(err, StashError::Io(_)));

        assert_eq!(first.list().unwrap(), vec![PathBuf::from("x")]);
        assert!(!dir.path().join("unknown_20.21.0-beta/b").exists());
        assert_eq!(read(second.get("b/c.txt").unwrap()), "c");

        let mut third = stash(dir.path());
        third.store(Cursor::new("c"), "b/c.txt").unwrap();
        third.commit().unwrap();
        assert_eq!(
            first.list().unwrap(),
            vec![PathBuf::from("b/c.txt"), PathBuf::from("x")]
        );
    }

    #[test]
    fn test_fresh_commit_merges_into_stash_created_meanwhile() {
        let dir = TempDir::new().unwrap();
        let mut stash = stash(dir.path());
        stash.store(Cursor::new("x"), "a.txt").unwrap();

        let final_dir = dir.path().join("unknown_20.21.0-beta");
        fs::create_dir_all(&final_dir).unwrap();
        fs::write(final_dir.join("other.txt"), "o").unwrap();

        let data_dir = stash.transaction_dir().unwrap().join(TRANSACTION_DATA);
        stash.publish_fresh(&data_dir).unwrap();
        assert_eq!(
            stash.list().unwrap(),
            vec![PathBuf::from("a.txt"), PathBuf::from("other.txt")]
        );
    }

    #[test]
    fn test_create_parents_records_new_directories_only() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();

        let mut created = Vec::new();
        create_parents(dir.path(), Path::new("a/b/c/d.txt"), &mut created).unwrap();
        assert_eq!(created, vec![dir.path().join("a/b"), dir.path().join("a/b/c")]);

        create_parents(dir.path(), Path::new("top.txt"), &mut created).unwrap();
        assert_eq!(created.len(), 2);
    }

    #[test]
    fn test_empty_commit_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut stash = stash(dir.path());
        stash.commit().unwrap();
        assert!(!stash.exists());
    }

    #[test]
    fn test_commit_times_out_on_held_marker_lock() {
        let dir = TempDir::new().unwrap();
        let mut stash = stash(dir.path());
        stash.store(Cursor::new("x"), "a.txt").unwrap();

        let lock_path = dir.path().join(".transactions/unknown_20.21.0-beta.lock");
        let _held = FileLock::try_acquire(&lock_path).unwrap().unwrap();
        let err = stash.commit_with(&LockWait::immediate()).unwrap_err();
        assert!(err.is_lock());
        assert!(!stash.exists());
        assert_eq!(stash.pending().count(), 1);
    }

    #[test]
    fn test_drop_discards_transaction() {
        let dir = TempDir::new().unwrap();
        let transaction = {
            let mut stash = stash(dir.path());
            stash.store(Cursor::new("x"), "a.txt").unwrap();
            stash.transaction_dir().unwrap().to_path_buf()
        };
        assert!(!transaction.exists());
    }

    #[test]
    fn test_delete() {
        let dir = TempDir::new().unwrap();
        let mut stash = stash(dir.path());
        assert!(!stash.delete().unwrap());
        stash.store(Cursor::new("x"), "a.txt").unwrap();
        stash.commit().unwrap();
        assert!(stash.delete().unwrap());
        assert!(stash.list().unwrap().is_empty());
    }
}
