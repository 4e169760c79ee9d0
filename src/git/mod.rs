//! Source-control oracle abstraction layer
//!
//! This module provides a trait-based abstraction over the source-control
//! questions the topology algorithms ask, allowing for multiple
//! implementations including real Git repositories and in-memory histories
//! for testing.
//!
//! # Overview
//!
//! The primary abstraction is the [Oracle] trait. The concrete
//! implementations include:
//!
//! - [repository::Git2Oracle]: A real implementation using the `git2` crate
//! - [mock::MockOracle]: An in-memory commit history for testing
//!
//! # Usage
//!
//! Algorithms never talk to an oracle directly; they go through
//! [crate::topology::TopologyCache], which memoizes every answer for the
//! lifetime of one resolution session.
//!
//! ```rust
//! # use build_stash::git::{CommitFilter, Oracle};
//! # fn example<O: Oracle>(oracle: &O) -> build_stash::Result<()> {
//! let seed = oracle.resolve_ref("v20.21")?.expect("seed tag exists");
//! let head = oracle.resolve_ref("main")?.expect("main exists");
//! let spine = oracle.list_commits(&seed, &head, CommitFilter::FirstParent)?;
//! println!("{} builds since the seed", spine.len());
//! # Ok(())
//! # }
//! ```

pub mod mock;
pub mod repository;

pub use mock::MockOracle;
pub use repository::Git2Oracle;

use crate::domain::Ref;
use crate::error::Result;
use crate::topology::CommitGraph;

/// Structured metadata of a tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
    /// Tag name without the `refs/tags/` prefix
    pub name: String,
    /// Commit the tag points at
    pub target: Ref,
    /// Message of an annotated tag
    pub message: Option<String>,
}

/// Kind of reference for exact-hierarchy existence checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    Branch,
    Tag,
}

impl RefKind {
    /// Fully qualified reference name
    pub fn qualify(&self, name: &str) -> String {
        match self {
            RefKind::Branch => format!("refs/heads/{}", name),
            RefKind::Tag => format!("refs/tags/{}", name),
        }
    }
}

/// Which commits of a range to list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommitFilter {
    /// Only commits on the first-parent chain of the range tip
    FirstParent,
    /// Only commits that descend from the range start
    AncestryPath,
}

/// Source-control questions asked by the topology algorithms
///
/// ## Ranges
///
/// A range `from..to` holds the commits reachable from `to` that are not
/// reachable from `from`; `from` itself is excluded and `to` included.
///
/// ## Error Handling
///
/// Unknown names are not errors for [Oracle::resolve_ref] or [Oracle::tag]
/// (they return `None`); every other method reports unknown commits as
/// [crate::error::StashError::Topology].
///
/// ## Implementations
///
/// - [Git2Oracle](repository::Git2Oracle): Real Git implementation using the `git2` crate
/// - [MockOracle](mock::MockOracle): In-memory history for tests
pub trait Oracle: Send {
    /// Resolve a commit hash, branch or tag name to a commit
    ///
    /// # Returns
    /// * `Ok(Some(Ref))` - The commit the name points at
    /// * `Ok(None)` - If nothing by that name exists
    fn resolve_ref(&self, name: &str) -> Result<Option<Ref>>;

    /// Whether `name` resolves to anything at all
    fn ref_exists(&self, name: &str) -> Result<bool> {
        Ok(self.resolve_ref(name)?.is_some())
    }

    /// Whether `name` exists as exactly the given kind of reference
    ///
    /// Distinguishes a branch from an identically named tag.
    fn ref_exists_exact(&self, name: &str, kind: RefKind) -> Result<bool>;

    /// Record every commit of the range `base..tip` (with its parents) into `graph`
    ///
    /// With no `base`, the whole history of `tip` is loaded.
    fn load_range(&self, base: Option<&Ref>, tip: &Ref, graph: &mut CommitGraph) -> Result<()>;

    /// Commits of the range `from..to`, nearest (`to`) first
    fn list_commits(&self, from: &Ref, to: &Ref, filter: CommitFilter) -> Result<Vec<Ref>>;

    /// Strict ancestry: `ancestor` is reachable from `descendant` and differs from it
    fn is_ancestor(&self, ancestor: &Ref, descendant: &Ref) -> Result<bool>;

    /// Metadata of the tag `name`, if it exists
    fn tag(&self, name: &str) -> Result<Option<TagInfo>>;

    /// All tag names in the repository
    fn list_tags(&self) -> Result<Vec<String>>;
}
