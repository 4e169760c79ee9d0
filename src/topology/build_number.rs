//! Topological build numbers
//!
//! The build number of a commit relative to a base commit is one more than
//! the number of its ancestors in the loaded range `base..commit`; the base
//! itself is build 0. Along a first-parent spine this grows strictly, which
//! is what makes [`find_commit`] a binary search.

use tracing::debug;

use crate::domain::Ref;
use crate::error::{Result, StashError};
use crate::git::Oracle;
use crate::topology::{CommitGraph, TopologyCache};

/// Build number of `subject` relative to `base`
pub fn build_number<O: Oracle>(
    cache: &mut TopologyCache<O>,
    base: &Ref,
    subject: &Ref,
) -> Result<u32> {
    if base == subject {
        return Ok(0);
    }

    cache.load_range(base, subject)?;
    let graph = cache.graph(base);
    if !graph.contains(subject) {
        // Only commits already reachable from base fall out of the range
        return Err(StashError::NotInAncestry {
            subject: base.to_string(),
            end: subject.to_string(),
        });
    }

    count_to_build(graph.loaded_ancestor_count(subject, base))
}

fn count_to_build(ancestors: usize) -> Result<u32> {
    u32::try_from(ancestors + 1)
        .map_err(|_| StashError::internal(format!("{} ancestors overflow a build number", ancestors)))
}

/// Build number of `commit` when it descends from `base` inside the loaded graph
fn defined_build_number(graph: &mut CommitGraph, base: &Ref, commit: &Ref) -> Option<u32> {
    if commit == base {
        return Some(0);
    }
    if !graph.contains(commit) || !graph.ancestors(commit).contains(base) {
        return None;
    }
    count_to_build(graph.loaded_ancestor_count(commit, base)).ok()
}

/// Commit with build number `n` on the first-parent spine from `end` back to `base`
///
/// Spine entries whose build number is undefined (they do not descend from
/// `base`) compare as lower than any target, so the search steps past them.
///
/// # Errors
/// * [`StashError::BuildNumberOutOfRange`] - `n < 0` or `n` beyond the build number of `end`
/// * [`StashError::BuildNumberNotFound`] - the build exists but off the spine
pub fn find_commit<O: Oracle>(
    cache: &mut TopologyCache<O>,
    base: &Ref,
    end: &Ref,
    n: i64,
) -> Result<Ref> {
    let max = build_number(cache, base, end)?;
    if n < 0 || n > i64::from(max) {
        return Err(StashError::BuildNumberOutOfRange {
            base: base.to_string(),
            end: end.to_string(),
            requested: n,
            max,
        });
    }
    if n == 0 {
        return Ok(base.clone());
    }
    let target = n as u32;

    let graph = cache.graph(base);
    let mut spine: Vec<Ref> = graph.first_parent_ancestry(end, Some(base)).collect();
    spine.reverse();

    let (mut lo, mut hi) = (0, spine.len());
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        match defined_build_number(graph, base, &spine[mid]) {
            Some(build) if build == target => return Ok(spine[mid].clone()),
            Some(build) if build > target => hi = mid,
            _ => lo = mid + 1,
        }
    }

    debug!(base = %base.short(), end = %end.short(), n, "build number off the spine");
    Err(StashError::BuildNumberNotFound {
        base: base.to_string(),
        end: end.to_string(),
        requested: n,
    })
}
