//! Commit topology: ancestry graphs, build numbers and integration points
//!
//! [`CommitTopology`] is the seam the resolver talks to. It maps version
//! markers onto commits and answers ancestry questions about them.
//! [`GitCommitTopology`] implements it over any [`crate::git::Oracle`] using
//! a tag and branch naming policy.

pub mod build_number;
pub mod cache;
pub mod git_topology;
pub mod graph;
pub mod integration;

pub use cache::TopologyCache;
pub use git_topology::GitCommitTopology;
pub use graph::CommitGraph;

use crate::domain::{MajorMinor, ResolvedVersionMarker, VersionMarker};
use crate::error::Result;

/// Lazy walk over resolved markers, nearest first
pub type Ancestry<'a> = Box<dyn Iterator<Item = Result<ResolvedVersionMarker>> + 'a>;

/// Source-control view of version markers
pub trait CommitTopology {
    /// Fill in the missing half of a marker
    ///
    /// A complete marker is returned as is.
    fn resolve(&mut self, marker: &VersionMarker) -> Result<ResolvedVersionMarker>;

    /// Exact ancestry between two resolved markers; a marker is its own ancestor
    fn is_ancestor(
        &mut self,
        ancestor: &ResolvedVersionMarker,
        descendant: &ResolvedVersionMarker,
    ) -> Result<bool>;

    /// Markers of the same `major.minor` that `marker` descends from,
    /// starting with `marker` itself
    fn ancestry(&mut self, marker: &ResolvedVersionMarker) -> Result<Ancestry<'_>>;

    /// Last main-line version of `major_minor` before its release branch forked
    ///
    /// `None` while the release line has not branched yet.
    fn last_version_before_branch_point(
        &mut self,
        major_minor: &MajorMinor,
    ) -> Result<Option<ResolvedVersionMarker>>;
}
