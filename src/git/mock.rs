use crate::domain::Ref;
use crate::error::{Result, StashError};
use crate::git::{CommitFilter, Oracle, RefKind, TagInfo};
use crate::topology::CommitGraph;
use std::collections::{HashMap, HashSet};

/// In-memory commit history for testing without a git repository
///
/// Commits must be added parents-first; insertion order doubles as commit
/// time when listings need a nearest-first order.
pub struct MockOracle {
    commits: HashMap<Ref, (usize, Vec<Ref>)>,
    tags: HashMap<String, TagInfo>,
    branch_heads: HashMap<String, Ref>,
}

impl MockOracle {
    /// Create a new empty history
    pub fn new() -> Self {
        MockOracle {
            commits: HashMap::new(),
            tags: HashMap::new(),
            branch_heads: HashMap::new(),
        }
    }

    /// Add a commit with its parents (first parent first)
    pub fn add_commit(&mut self, id: &str, parents: &[&str]) -> Ref {
        let commit = Ref::new(id);
        let order = self.commits.len();
        let parents = parents.iter().map(|p| Ref::new(p)).collect();
        self.commits.insert(commit.clone(), (order, parents));
        commit
    }

    /// Add a linear chain of commits on top of `parent`, returning the last one
    pub fn add_chain(&mut self, parent: &str, ids: &[&str]) -> Ref {
        let mut previous = parent.to_string();
        for id in ids {
            self.add_commit(id, &[&previous]);
            previous = id.to_string();
        }
        Ref::new(previous)
    }

    /// Point a branch at a commit
    pub fn set_branch_head(&mut self, branch: impl Into<String>, id: &str) {
        self.branch_heads.insert(branch.into(), Ref::new(id));
    }

    /// Add a tag pointing at a commit
    pub fn add_tag(&mut self, name: impl Into<String>, id: &str, message: Option<&str>) {
        let name = name.into();
        self.tags.insert(
            name.clone(),
            TagInfo {
                name,
                target: Ref::new(id),
                message: message.map(str::to_string),
            },
        );
    }

    fn parents_of(&self, commit: &Ref) -> Result<&[Ref]> {
        self.commits
            .get(commit)
            .map(|(_, parents)| parents.as_slice())
            .ok_or_else(|| StashError::topology(format!("Unknown commit: {}", commit)))
    }

    fn order_of(&self, commit: &Ref) -> usize {
        self.commits.get(commit).map(|(order, _)| *order).unwrap_or(0)
    }

    /// `commit` and everything reachable from it
    fn reachable(&self, commit: &Ref) -> Result<HashSet<Ref>> {
        let mut seen = HashSet::new();
        let mut stack = vec![commit.clone()];
        while let Some(next) = stack.pop() {
            if !seen.insert(next.clone()) {
                continue;
            }
            stack.extend(self.parents_of(&next)?.iter().cloned());
        }
        Ok(seen)
    }

    fn range(&self, from: Option<&Ref>, to: &Ref) -> Result<HashSet<Ref>> {
        let mut commits = self.reachable(to)?;
        if let Some(from) = from {
            let excluded = self.reachable(from)?;
            commits.retain(|c| !excluded.contains(c));
        }
        Ok(commits)
    }
}

impl Default for MockOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl Oracle for MockOracle {
    fn resolve_ref(&self, name: &str) -> Result<Option<Ref>> {
        if let Some(short) = name.strip_prefix("refs/heads/") {
            return Ok(self.branch_heads.get(short).cloned());
        }
        if let Some(short) = name.strip_prefix("refs/tags/") {
            return Ok(self.tags.get(short).map(|t| t.target.clone()));
        }
        let as_commit = Ref::new(name);
        if self.commits.contains_key(&as_commit) {
            return Ok(Some(as_commit));
        }
        if let Some(tag) = self.tags.get(name) {
            return Ok(Some(tag.target.clone()));
        }
        Ok(self.branch_heads.get(name).cloned())
    }

    fn ref_exists_exact(&self, name: &str, kind: RefKind) -> Result<bool> {
        Ok(match kind {
            RefKind::Branch => self.branch_heads.contains_key(name),
            RefKind::Tag => self.tags.contains_key(name),
        })
    }

    fn load_range(&self, base: Option<&Ref>, tip: &Ref, graph: &mut CommitGraph) -> Result<()> {
        for commit in self.range(base, tip)? {
            let parents = self.parents_of(&commit)?.to_vec();
            graph.add(commit, parents)?;
        }
        Ok(())
    }

    fn list_commits(&self, from: &Ref, to: &Ref, filter: CommitFilter) -> Result<Vec<Ref>> {
        let excluded = self.reachable(from)?;
        match filter {
            CommitFilter::FirstParent => {
                let mut commits = Vec::new();
                let mut current = Some(to.clone());
                while let Some(commit) = current {
                    if excluded.contains(&commit) {
                        break;
                    }
                    current = self.parents_of(&commit)?.first().cloned();
                    commits.push(commit);
                }
                Ok(commits)
            }
            CommitFilter::AncestryPath => {
                let mut commits = Vec::new();
                for commit in self.range(Some(from), to)? {
                    if self.reachable(&commit)?.contains(from) {
                        commits.push(commit);
                    }
                }
                commits.sort_by_key(|c| std::cmp::Reverse(self.order_of(c)));
                Ok(commits)
            }
        }
    }

    fn is_ancestor(&self, ancestor: &Ref, descendant: &Ref) -> Result<bool> {
        Ok(ancestor != descendant && self.reachable(descendant)?.contains(ancestor))
    }

    fn tag(&self, name: &str) -> Result<Option<TagInfo>> {
        Ok(self.tags.get(name).cloned())
    }

    fn list_tags(&self) -> Result<Vec<String>> {
        let mut tags: Vec<String> = self.tags.keys().cloned().collect();
        tags.sort();
        Ok(tags)
    }
}
