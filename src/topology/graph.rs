//! In-memory commit ancestry graph
//!
//! Nodes are commits, each mapped to its ordered parent list; the first
//! parent is the main-line parent of a merge. The graph is filled
//! incrementally from oracle range loads, so a parent may be referenced
//! without being a node itself (it lies outside every loaded range).
//!
//! # Invariants
//!
//! - A commit's parent list never changes once recorded.
//! - Memoized ancestor sets are only stored once complete.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::domain::Ref;
use crate::error::{Result, StashError};

#[derive(Debug, Clone, Default)]
pub struct CommitGraph {
    parents: HashMap<Ref, Vec<Ref>>,
    /// Commits referenced as a parent of some node.
    referenced: HashSet<Ref>,
    ancestors: HashMap<Ref, HashSet<Ref>>,
}

impl CommitGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of commits whose parents are recorded
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn contains(&self, commit: &Ref) -> bool {
        self.parents.contains_key(commit)
    }

    /// Recorded parents of `commit`; empty when the commit is not a node
    pub fn parents(&self, commit: &Ref) -> &[Ref] {
        self.parents.get(commit).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn commits(&self) -> impl Iterator<Item = &Ref> {
        self.parents.keys()
    }

    /// Record `commit` with its parents.
    ///
    /// Re-adding a commit with the same parents is a no-op; a different
    /// parent list is rejected.
    pub fn add(&mut self, commit: Ref, parents: Vec<Ref>) -> Result<()> {
        if let Some(existing) = self.parents.get(&commit) {
            if *existing == parents {
                return Ok(());
            }
            return Err(StashError::GraphContract(format!(
                "{} already recorded with parents [{}], refusing [{}]",
                commit,
                join(existing),
                join(&parents)
            )));
        }

        // A known parent gaining its own parents can extend memoized sets.
        if self.referenced.contains(&commit) && !self.ancestors.is_empty() {
            trace!(commit = %commit.short(), "invalidating memoized ancestors");
            self.ancestors.clear();
        }

        self.referenced.extend(parents.iter().cloned());
        self.parents.insert(commit, parents);
        Ok(())
    }

    /// Full transitive ancestor set of `commit` (the commit itself excluded).
    pub fn ancestors(&mut self, commit: &Ref) -> &HashSet<Ref> {
        if !self.ancestors.contains_key(commit) {
            let computed = self.compute_ancestors(commit);
            self.ancestors.insert(commit.clone(), computed);
        }
        &self.ancestors[commit]
    }

    /// Number of ancestors of `commit` that are nodes of this graph,
    /// not counting `excluding`.
    pub fn loaded_ancestor_count(&mut self, commit: &Ref, excluding: &Ref) -> usize {
        self.ancestors(commit);
        self.ancestors[commit]
            .iter()
            .filter(|a| *a != excluding && self.parents.contains_key(*a))
            .count()
    }

    fn compute_ancestors(&self, commit: &Ref) -> HashSet<Ref> {
        let mut result = HashSet::new();
        let mut stack: Vec<&Ref> = self.parents(commit).iter().collect();

        while let Some(next) = stack.pop() {
            if !result.insert(next.clone()) {
                continue;
            }
            if let Some(memo) = self.ancestors.get(next) {
                result.extend(memo.iter().cloned());
                continue;
            }
            stack.extend(self.parents(next).iter());
        }

        result.remove(commit);
        result
    }

    /// Walk first parents from `commit`, yielding `commit` itself first and
    /// ending before `stop` or when no parent is recorded.
    pub fn first_parent_ancestry<'a>(
        &'a self,
        commit: &Ref,
        stop: Option<&Ref>,
    ) -> FirstParentAncestry<'a> {
        FirstParentAncestry {
            graph: self,
            next: Some(commit.clone()),
            stop: stop.cloned(),
        }
    }
}

fn join(refs: &[Ref]) -> String {
    refs.iter().map(Ref::short).collect::<Vec<_>>().join(", ")
}

/// Lazy first-parent ("spine") walk, see [`CommitGraph::first_parent_ancestry`]
pub struct FirstParentAncestry<'a> {
    graph: &'a CommitGraph,
    next: Option<Ref>,
    stop: Option<Ref>,
}

impl Iterator for FirstParentAncestry<'_> {
    type Item = Ref;

    fn next(&mut self) -> Option<Ref> {
        let current = self.next.take()?;
        if self.stop.as_ref() == Some(&current) {
            return None;
        }
        self.next = self.graph.parents(&current).first().cloned();
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(s: &str) -> Ref {
        Ref::new(s)
    }

    fn add(graph: &mut CommitGraph, commit: &str, parents: &[&str]) {
        graph
            .add(r(commit), parents.iter().map(|p| r(p)).collect())
            .unwrap();
    }

    /// a <- b <- c <- m (merge of c and f), a <- f
    fn diamond() -> CommitGraph {
        let mut graph = CommitGraph::new();
        add(&mut graph, "a", &[]);
        add(&mut graph, "b", &["a"]);
        add(&mut graph, "c", &["b"]);
        add(&mut graph, "f", &["a"]);
        add(&mut graph, "m", &["c", "f"]);
        graph
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut graph = diamond();
        assert!(graph.add(r("m"), vec![r("c"), r("f")]).is_ok());
        assert_eq!(graph.len(), 5);
    }

    #[test]
    fn test_contradictory_parents_rejected() {
        let mut graph = diamond();
        let err = graph.add(r("m"), vec![r("f"), r("c")]).unwrap_err();
        assert!(matches!(err, StashError::GraphContract(_)));
        assert_eq!(graph.parents(&r("m")), &[r("c"), r("f")]);
    }

    #[test]
    fn test_ancestors() {
        let mut graph = diamond();
        let ancestors = graph.ancestors(&r("m")).clone();
        let expected: HashSet<Ref> = ["a", "b", "c", "f"].iter().map(|s| r(s)).collect();
        assert_eq!(ancestors, expected);
        assert!(graph.ancestors(&r("a")).is_empty());
    }

    #[test]
    fn test_ancestors_include_unloaded_parents() {
        let mut graph = CommitGraph::new();
        add(&mut graph, "y", &["x"]);
        assert!(graph.ancestors(&r("y")).contains(&r("x")));
        assert_eq!(graph.loaded_ancestor_count(&r("y"), &r("zzz")), 0);
    }

    #[test]
    fn test_memo_invalidated_when_boundary_parent_is_loaded() {
        let mut graph = CommitGraph::new();
        add(&mut graph, "y", &["x"]);
        assert_eq!(graph.ancestors(&r("y")).len(), 1);
        add(&mut graph, "x", &["w"]);
        assert_eq!(graph.ancestors(&r("y")).len(), 2);
    }

    #[test]
    fn test_ancestors_tolerate_cycles() {
        let mut graph = CommitGraph::new();
        add(&mut graph, "p", &["q"]);
        add(&mut graph, "q", &["p"]);
        let ancestors = graph.ancestors(&r("p")).clone();
        assert_eq!(ancestors, [r("q")].into_iter().collect());
    }

    #[test]
    fn test_deep_history_does_not_recurse() {
        let mut graph = CommitGraph::new();
        add(&mut graph, "c0", &[]);
        for i in 1..20_000 {
            let parent = format!("c{}", i - 1);
            add(&mut graph, &format!("c{}", i), &[&parent]);
        }
        assert_eq!(graph.ancestors(&r("c19999")).len(), 19_999);
    }

    #[test]
    fn test_first_parent_ancestry() {
        let graph = diamond();
        let spine: Vec<Ref> = graph.first_parent_ancestry(&r("m"), None).collect();
        assert_eq!(spine, vec![r("m"), r("c"), r("b"), r("a")]);

        let stopped: Vec<Ref> = graph.first_parent_ancestry(&r("m"), Some(&r("b"))).collect();
        assert_eq!(stopped, vec![r("m"), r("c")]);
    }

    #[test]
    fn test_first_parent_ancestry_yields_unloaded_boundary() {
        let mut graph = CommitGraph::new();
        add(&mut graph, "y", &["x"]);
        let spine: Vec<Ref> = graph.first_parent_ancestry(&r("y"), None).collect();
        assert_eq!(spine, vec![r("y"), r("x")]);
    }
}
