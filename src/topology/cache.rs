use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::domain::Ref;
use crate::error::{Result, StashError};
use crate::git::{CommitFilter, Oracle, RefKind, TagInfo};
use crate::topology::CommitGraph;

/// Memoizing front of an [`Oracle`] for one resolution session.
///
/// Every answer is kept for the lifetime of the cache; build a fresh cache
/// when the repository may have moved. Graphs are kept per base commit, each
/// holding the union of the ranges loaded relative to that base.
pub struct TopologyCache<O: Oracle> {
    oracle: O,
    resolved: HashMap<String, Option<Ref>>,
    exact: HashMap<(String, RefKind), bool>,
    graphs: HashMap<Ref, CommitGraph>,
    loaded: HashSet<(Ref, Ref)>,
    ancestry: HashMap<(Ref, Ref), bool>,
    listings: HashMap<(Ref, Ref, CommitFilter), Vec<Ref>>,
    tags: HashMap<String, Option<TagInfo>>,
    tag_names: Option<Vec<String>>,
}

impl<O: Oracle> TopologyCache<O> {
    pub fn new(oracle: O) -> Self {
        TopologyCache {
            oracle,
            resolved: HashMap::new(),
            exact: HashMap::new(),
            graphs: HashMap::new(),
            loaded: HashSet::new(),
            ancestry: HashMap::new(),
            listings: HashMap::new(),
            tags: HashMap::new(),
            tag_names: None,
        }
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Resolve a name to a commit, `None` if it names nothing
    pub fn try_resolve(&mut self, name: &str) -> Result<Option<Ref>> {
        if let Some(hit) = self.resolved.get(name) {
            return Ok(hit.clone());
        }
        let commit = self.oracle.resolve_ref(name)?;
        self.resolved.insert(name.to_string(), commit.clone());
        Ok(commit)
    }

    /// Resolve a name to a commit, failing if it names nothing
    pub fn resolve(&mut self, name: &str) -> Result<Ref> {
        self.try_resolve(name)?
            .ok_or_else(|| StashError::topology(format!("Cannot resolve '{}'", name)))
    }

    pub fn exists(&mut self, name: &str) -> Result<bool> {
        Ok(self.try_resolve(name)?.is_some())
    }

    pub fn exists_exact(&mut self, name: &str, kind: RefKind) -> Result<bool> {
        let key = (name.to_string(), kind);
        if let Some(hit) = self.exact.get(&key) {
            return Ok(*hit);
        }
        let exists = self.oracle.ref_exists_exact(name, kind)?;
        self.exact.insert(key, exists);
        Ok(exists)
    }

    /// Make sure the range `base..tip` is present in the graph of `base`
    pub fn load_range(&mut self, base: &Ref, tip: &Ref) -> Result<()> {
        if base == tip || self.loaded.contains(&(base.clone(), tip.clone())) {
            return Ok(());
        }

        let graph = self.graphs.entry(base.clone()).or_default();
        if !graph.contains(tip) {
            debug!(base = %base.short(), tip = %tip.short(), "loading range");
            self.oracle.load_range(Some(base), tip, graph)?;
        }
        self.loaded.insert((base.clone(), tip.clone()));
        Ok(())
    }

    /// Graph of everything loaded relative to `base`
    pub fn graph(&mut self, base: &Ref) -> &mut CommitGraph {
        self.graphs.entry(base.clone()).or_default()
    }

    /// Commits of `from..to`, nearest first
    pub fn list_commits(&mut self, from: &Ref, to: &Ref, filter: CommitFilter) -> Result<Vec<Ref>> {
        let key = (from.clone(), to.clone(), filter);
        if let Some(hit) = self.listings.get(&key) {
            return Ok(hit.clone());
        }
        let commits = self.oracle.list_commits(from, to, filter)?;
        self.listings.insert(key, commits.clone());
        Ok(commits)
    }

    /// Strict ancestry, see [`Oracle::is_ancestor`]
    pub fn is_ancestor(&mut self, ancestor: &Ref, descendant: &Ref) -> Result<bool> {
        let key = (ancestor.clone(), descendant.clone());
        if let Some(hit) = self.ancestry.get(&key) {
            return Ok(*hit);
        }
        let answer = self.oracle.is_ancestor(ancestor, descendant)?;
        self.ancestry.insert(key, answer);
        Ok(answer)
    }

    pub fn tag(&mut self, name: &str) -> Result<Option<TagInfo>> {
        if let Some(hit) = self.tags.get(name) {
            return Ok(hit.clone());
        }
        let tag = self.oracle.tag(name)?;
        self.tags.insert(name.to_string(), tag.clone());
        Ok(tag)
    }

    pub fn list_tags(&mut self) -> Result<Vec<String>> {
        if let Some(names) = &self.tag_names {
            return Ok(names.clone());
        }
        let names = self.oracle.list_tags()?;
        self.tag_names = Some(names.clone());
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::MockOracle;

    fn cache() -> TopologyCache<MockOracle> {
        let mut oracle = MockOracle::new();
        oracle.add_commit("a", &[]);
        oracle.add_chain("a", &["b", "c", "d"]);
        oracle.set_branch_head("main", "d");
        oracle.add_tag("v1.0", "a", None);
        TopologyCache::new(oracle)
    }

    #[test]
    fn test_resolve() {
        let mut cache = cache();
        assert_eq!(cache.resolve("main").unwrap(), Ref::new("d"));
        assert!(cache.exists("v1.0").unwrap());
        assert!(!cache.exists("nope").unwrap());
        assert!(matches!(cache.resolve("nope"), Err(StashError::Topology(_))));
    }

    #[test]
    fn test_load_range_per_base() {
        let mut cache = cache();
        let (a, b, d) = (Ref::new("a"), Ref::new("b"), Ref::new("d"));
        cache.load_range(&a, &d).unwrap();
        cache.load_range(&b, &d).unwrap();
        assert_eq!(cache.graph(&a).len(), 3);
        assert_eq!(cache.graph(&b).len(), 2);
    }

    #[test]
    fn test_load_range_of_base_itself_is_empty() {
        let mut cache = cache();
        let a = Ref::new("a");
        cache.load_range(&a, &a).unwrap();
        assert!(cache.graph(&a).is_empty());
    }

    #[test]
    fn test_memoized_answers() {
        let mut cache = cache();
        let (a, d) = (Ref::new("a"), Ref::new("d"));
        assert!(cache.is_ancestor(&a, &d).unwrap());
        assert!(cache.is_ancestor(&a, &d).unwrap());
        assert_eq!(cache.list_tags().unwrap(), vec!["v1.0".to_string()]);
        let spine = cache.list_commits(&a, &d, CommitFilter::FirstParent).unwrap();
        assert_eq!(spine.len(), 3);
        assert!(cache.exists_exact("main", RefKind::Branch).unwrap());
        assert!(!cache.exists_exact("main", RefKind::Tag).unwrap());
    }
}
