//! Closest-ancestor resolution over a stash repository
//!
//! Given a marker, find the stash that is the nearest true (or probable)
//! predecessor of it. Two strategies exist:
//!
//! - [`ClosestAncestorResolver::closest_with_topology`] walks the commit
//!   history and only returns confirmed ancestors.
//! - [`ClosestAncestorResolver::closest_by_heuristic`] looks at versions
//!   alone. It is weaker: it can return a stash that is not actually an
//!   ancestor, for example one built from a diverged release branch.
//!
//! A miss is not an error: both return [`VersionMarker::invalid`].

use std::collections::HashMap;

use tracing::debug;

use crate::domain::heuristics;
use crate::domain::{MajorMinor, ResolvedVersionMarker, SemanticVersion, VersionMarker};
use crate::error::{Result, StashError};
use crate::topology::CommitTopology;

/// Read access to the committed stashes of a store
pub trait StashRepository {
    /// Markers of every committed stash
    fn list_all(&self) -> Result<Vec<VersionMarker>>;

    /// Markers of the committed stashes of one release line
    fn list_major_minor(&self, major_minor: &MajorMinor) -> Result<Vec<VersionMarker>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|m| {
                m.semantic_version()
                    .is_some_and(|v| v.major_minor() == major_minor)
            })
            .collect())
    }
}

/// Entries that carry a version, newest first
fn versioned_newest_first(markers: Vec<VersionMarker>) -> Vec<(SemanticVersion, VersionMarker)> {
    let mut entries: Vec<(SemanticVersion, VersionMarker)> = markers
        .into_iter()
        .filter_map(|m| m.semantic_version().cloned().map(|v| (v, m)))
        .collect();
    entries.sort_by(|a, b| b.0.cmp(&a.0));
    entries
}

pub struct ClosestAncestorResolver<'r, R: StashRepository + ?Sized> {
    repository: &'r R,
}

impl<'r, R: StashRepository + ?Sized> ClosestAncestorResolver<'r, R> {
    pub fn new(repository: &'r R) -> Self {
        ClosestAncestorResolver { repository }
    }

    /// Newest stash whose version probably precedes the query, by version alone
    ///
    /// Requires the query to carry a version. Without branch-point data the
    /// heuristic accepts only same-tag predecessors and seed builds.
    pub fn closest_by_heuristic(&self, marker: &VersionMarker) -> Result<VersionMarker> {
        let query = marker.semantic_version().ok_or_else(|| {
            StashError::resolution(format!(
                "{} has no version to compare without commit topology",
                marker
            ))
        })?;

        let hit = versioned_newest_first(self.repository.list_all()?)
            .into_iter()
            .find(|(version, _)| heuristics::is_ancestor(query, version, None));

        match hit {
            Some((_, found)) => {
                debug!(query = %marker, found = %found, "heuristic match");
                Ok(found)
            }
            None => Ok(VersionMarker::invalid()),
        }
    }

    /// Nearest stash that `marker` descends from, confirmed by the topology
    pub fn closest_with_topology(
        &self,
        marker: &VersionMarker,
        topology: &mut dyn CommitTopology,
    ) -> Result<VersionMarker> {
        let query = topology.resolve(marker)?;
        let major_minor = query.semantic_version().major_minor().clone();
        let candidates =
            versioned_newest_first(self.repository.list_major_minor(&major_minor)?);

        // Exact commit on the query's own ancestry
        let mut visited = Vec::new();
        for step in topology.ancestry(&query)? {
            let step = step?;
            if let Some((_, hit)) = candidates
                .iter()
                .find(|(_, candidate)| candidate.has_commit(step.commit_hash()))
            {
                debug!(query = %query, found = %hit, "exact ancestry match");
                return Ok(hit.clone());
            }
            visited.push(step);
        }

        // Probable predecessor of a visited commit within the same release line
        let last_master_build = last_master_build(topology, &major_minor);
        for step in &visited {
            if let Some((_, hit)) = candidates.iter().find(|(version, _)| {
                heuristics::is_ancestor(step.semantic_version(), version, last_master_build)
            }) {
                debug!(query = %query, via = %step, found = %hit, "heuristic ancestry match");
                return Ok(hit.clone());
            }
        }

        self.confirmed_scan(&query, topology)
    }

    /// Repository-wide heuristic scan, each hit confirmed by exact ancestry
    fn confirmed_scan(
        &self,
        query: &ResolvedVersionMarker,
        topology: &mut dyn CommitTopology,
    ) -> Result<VersionMarker> {
        let mut branch_points: HashMap<MajorMinor, Option<u32>> = HashMap::new();

        for (version, entry) in versioned_newest_first(self.repository.list_all()?) {
            let last_master_build = *branch_points
                .entry(version.major_minor().clone())
                .or_insert_with(|| last_master_build(topology, version.major_minor()));

            if !heuristics::is_ancestor(query.semantic_version(), &version, last_master_build) {
                continue;
            }

            let resolved = match entry.to_resolved() {
                Some(resolved) => resolved,
                None => match topology.resolve(&entry) {
                    Ok(resolved) => resolved,
                    Err(e) => {
                        debug!(entry = %entry, error = %e, "skipping unresolvable stash");
                        continue;
                    }
                },
            };

            match topology.is_ancestor(&resolved, query) {
                Ok(true) => {
                    debug!(query = %query, found = %entry, "confirmed ancestor");
                    return Ok(entry);
                }
                Ok(false) => {}
                Err(e) => debug!(entry = %entry, error = %e, "ancestry check failed"),
            }
        }

        Ok(VersionMarker::invalid())
    }
}

fn last_master_build(topology: &mut dyn CommitTopology, major_minor: &MajorMinor) -> Option<u32> {
    match topology.last_version_before_branch_point(major_minor) {
        Ok(last) => last.map(|m| m.semantic_version().build()),
        Err(e) => {
            debug!(major_minor = %major_minor, error = %e, "no branch point");
            None
        }
    }
}
