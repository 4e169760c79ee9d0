use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use tracing::debug;

use crate::config::StoreConfig;
use crate::domain::marker::DIRECTORY_SEPARATOR;
use crate::domain::{MajorMinor, VersionMarker};
use crate::error::{Result, StashError};
use crate::resolver::{ClosestAncestorResolver, StashRepository};
use crate::store::gc::GarbageCollector;
use crate::store::lock::LockWait;
use crate::store::stash::Stash;
use crate::store::TRANSACTIONS_DIR;
use crate::topology::CommitTopology;

/// Directory-per-marker stash store on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalStashStore {
    root: PathBuf,
    lock_wait: LockWait,
    lock_retry: Duration,
}

impl LocalStashStore {
    /// Open (creating if needed) the store described by `config`
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let mut store = LocalStashStore::with_root(&config.root)?;
        store.lock_wait = LockWait::Timeout(config.lock_timeout());
        store.lock_retry = config.lock_retry();
        Ok(store)
    }

    /// Open a store at `root` with default lock timings
    pub fn with_root(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "opened stash store");

        Ok(LocalStashStore {
            root,
            lock_wait: LockWait::default(),
            lock_retry: Duration::from_millis(50),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn transactions_dir(&self) -> PathBuf {
        self.root.join(TRANSACTIONS_DIR)
    }

    fn handle(&self, marker: VersionMarker) -> Stash {
        Stash::new(
            marker,
            &self.root,
            self.transactions_dir(),
            self.lock_wait.clone(),
            self.lock_retry,
        )
    }

    /// Names of committed stash directories, sorted
    fn stash_dirs(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !name.starts_with('.') {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Existing stash for `marker`: exact, then same commit, then same version
    pub fn find(&self, marker: &VersionMarker) -> Result<Option<VersionMarker>> {
        if !marker.is_valid() {
            return Err(StashError::marker("Cannot look up an invalid marker"));
        }
        let names = self.stash_dirs()?;

        let exact = marker.directory_name();
        if names.contains(&exact) {
            if let Ok(found) = VersionMarker::parse_directory_name(&exact) {
                return Ok(Some(found));
            }
        }

        if let Some(hash) = marker.commit_hash() {
            let pattern = format!("(?i)^{}{}", regex::escape(hash), DIRECTORY_SEPARATOR);
            if let Some(found) = first_match(&names, &pattern, |m| m.has_commit(hash))? {
                return Ok(Some(found));
            }
        }

        if let Some(version) = marker.semantic_version() {
            let pattern = format!(
                "{}{}$",
                DIRECTORY_SEPARATOR,
                regex::escape(&version.to_string())
            );
            if let Some(found) =
                first_match(&names, &pattern, |m| m.semantic_version() == Some(version))?
            {
                return Ok(Some(found));
            }
        }

        Ok(None)
    }

    /// Handle on the existing stash matching `marker`, or a new pending one
    pub fn get_or_create(&self, marker: &VersionMarker) -> Result<Stash> {
        let marker = match self.find(marker)? {
            Some(found) => found,
            None => marker.clone(),
        };
        Ok(self.handle(marker))
    }

    /// Handle on the stash of exactly `marker`
    ///
    /// Nothing is created on disk until the handle commits. A stash created
    /// by another writer in the meantime is detected there, under the marker
    /// lock, and the commit adds to it.
    pub fn get_or_create_exact(&self, marker: &VersionMarker) -> Result<Stash> {
        if !marker.is_valid() {
            return Err(StashError::marker("Cannot create a stash for an invalid marker"));
        }
        Ok(self.handle(marker.clone()))
    }

    /// Remove the committed stash of exactly `marker`
    pub fn delete(&self, marker: &VersionMarker) -> Result<bool> {
        self.handle(marker.clone()).delete()
    }

    /// Closest stored ancestor of `marker`, exact when a topology is given
    pub fn closest(
        &self,
        marker: &VersionMarker,
        topology: Option<&mut dyn CommitTopology>,
    ) -> Result<VersionMarker> {
        let resolver = ClosestAncestorResolver::new(self);
        match topology {
            Some(topology) => resolver.closest_with_topology(marker, topology),
            None => resolver.closest_by_heuristic(marker),
        }
    }

    pub fn garbage_collector(&self, grace: Duration) -> GarbageCollector {
        GarbageCollector::new(self.transactions_dir(), grace)
    }
}

fn first_match(
    names: &[String],
    pattern: &str,
    accept: impl Fn(&VersionMarker) -> bool,
) -> Result<Option<VersionMarker>> {
    let regex = Regex::new(pattern)
        .map_err(|e| StashError::internal(format!("Invalid lookup pattern '{}': {}", pattern, e)))?;

    for name in names.iter().filter(|name| regex.is_match(name)) {
        match VersionMarker::parse_directory_name(name) {
            Ok(found) if accept(&found) => return Ok(Some(found)),
            Ok(_) => {}
            Err(e) => debug!(name = %name, error = %e, "ignoring foreign directory"),
        }
    }
    Ok(None)
}

impl StashRepository for LocalStashStore {
    fn list_all(&self) -> Result<Vec<VersionMarker>> {
        Ok(self
            .stash_dirs()?
            .iter()
            .filter_map(|name| VersionMarker::parse_directory_name(name).ok())
            .collect())
    }

    fn list_major_minor(&self, major_minor: &MajorMinor) -> Result<Vec<VersionMarker>> {
        let suffix = format!("{}{}.", DIRECTORY_SEPARATOR, major_minor);
        Ok(self
            .stash_dirs()?
            .iter()
            .filter(|name| name.contains(&suffix))
            .filter_map(|name| VersionMarker::parse_directory_name(name).ok())
            .filter(|m| {
                m.semantic_version()
                    .is_some_and(|v| v.major_minor() == major_minor)
            })
            .collect())
    }
}
