//! Branch integration points
//!
//! Locates the commit on a first-parent spine that first incorporated a
//! given commit. For a side-branch commit that is the merge commit which
//! absorbed its branch.

use std::collections::HashSet;

use tracing::debug;

use crate::domain::Ref;
use crate::error::{Result, StashError};
use crate::git::{CommitFilter, Oracle};
use crate::topology::TopologyCache;

/// Commit of the spine `start..end` that first integrated `subject`
///
/// # Errors
/// * [`StashError::NotInAncestry`] - `subject` is not reachable from `end`
/// * [`StashError::IntegrationPointNotFound`] - no ancestry path from
///   `subject` meets the spine
pub fn find_commit<O: Oracle>(
    cache: &mut TopologyCache<O>,
    start: &Ref,
    end: &Ref,
    subject: &Ref,
) -> Result<Ref> {
    if subject == end {
        return Ok(end.clone());
    }
    if !cache.is_ancestor(subject, end)? {
        return Err(StashError::NotInAncestry {
            subject: subject.to_string(),
            end: end.to_string(),
        });
    }
    if subject == start || cache.is_ancestor(subject, start)? {
        return Ok(start.clone());
    }

    let spine = cache.list_commits(start, end, CommitFilter::FirstParent)?;
    if spine.contains(subject) {
        return Ok(subject.clone());
    }
    let spine: HashSet<Ref> = spine.into_iter().collect();

    // Nearest first, so the last hit is the oldest merge into the spine
    let path = cache.list_commits(subject, end, CommitFilter::AncestryPath)?;
    let point = path.into_iter().filter(|c| spine.contains(c)).last();

    match point {
        Some(point) => {
            debug!(subject = %subject.short(), point = %point.short(), "integration point");
            Ok(point)
        }
        None => Err(StashError::IntegrationPointNotFound {
            subject: subject.to_string(),
            start: start.to_string(),
            end: end.to_string(),
        }),
    }
}
