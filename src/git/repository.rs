use crate::domain::Ref;
use crate::error::{Result, StashError};
use crate::git::{CommitFilter, Oracle, RefKind, TagInfo};
use crate::topology::CommitGraph;
use git2::{ErrorCode, Oid, Repository, Revwalk, Sort};
use std::path::Path;
use tracing::debug;

/// Oracle backed by a libgit2 repository
pub struct Git2Oracle {
    repo: Repository,
}

impl Git2Oracle {
    /// Open or discover a git repository
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let repo = Repository::discover(path)?;
        debug!(path = %repo.path().display(), "opened git repository");

        Ok(Git2Oracle { repo })
    }

    /// Create from existing git2::Repository
    pub fn from_git2(repo: Repository) -> Self {
        Git2Oracle { repo }
    }

    fn oid(&self, commit: &Ref) -> Result<Oid> {
        let object = self
            .repo
            .revparse_single(commit.as_str())
            .map_err(|e| StashError::topology(format!("Unknown commit '{}': {}", commit, e)))?;
        Ok(object.peel_to_commit()?.id())
    }

    /// Topologically sorted walk of `from..to`, children before parents
    fn walk(&self, from: Option<Oid>, to: Oid) -> Result<Revwalk<'_>> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL)?;
        revwalk.push(to)?;
        if let Some(from) = from {
            revwalk.hide(from)?;
        }
        Ok(revwalk)
    }
}

fn to_ref(oid: Oid) -> Ref {
    Ref::new(oid.to_string())
}

impl Oracle for Git2Oracle {
    fn resolve_ref(&self, name: &str) -> Result<Option<Ref>> {
        match self.repo.revparse_single(name) {
            Ok(object) => Ok(Some(to_ref(object.peel_to_commit()?.id()))),
            Err(e) if matches!(e.code(), ErrorCode::NotFound | ErrorCode::InvalidSpec) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn ref_exists_exact(&self, name: &str, kind: RefKind) -> Result<bool> {
        match self.repo.find_reference(&kind.qualify(name)) {
            Ok(_) => Ok(true),
            Err(e) if matches!(e.code(), ErrorCode::NotFound | ErrorCode::InvalidSpec) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn load_range(&self, base: Option<&Ref>, tip: &Ref, graph: &mut CommitGraph) -> Result<()> {
        let tip_oid = self.oid(tip)?;
        let base_oid = base.map(|b| self.oid(b)).transpose()?;

        let mut loaded = 0usize;
        for oid_result in self.walk(base_oid, tip_oid)? {
            let oid = oid_result?;
            let commit = self.repo.find_commit(oid)?;
            let parents = commit.parent_ids().map(to_ref).collect();
            graph.add(to_ref(oid), parents)?;
            loaded += 1;
        }

        debug!(tip = %tip.short(), loaded, "loaded ancestry range");
        Ok(())
    }

    fn list_commits(&self, from: &Ref, to: &Ref, filter: CommitFilter) -> Result<Vec<Ref>> {
        let from_oid = self.oid(from)?;
        let to_oid = self.oid(to)?;
        let mut revwalk = self.walk(Some(from_oid), to_oid)?;

        let mut commits = Vec::new();
        match filter {
            CommitFilter::FirstParent => {
                revwalk.simplify_first_parent()?;
                for oid_result in revwalk {
                    commits.push(to_ref(oid_result?));
                }
            }
            CommitFilter::AncestryPath => {
                for oid_result in revwalk {
                    let oid = oid_result?;
                    if self.repo.graph_descendant_of(oid, from_oid)? {
                        commits.push(to_ref(oid));
                    }
                }
            }
        }

        Ok(commits)
    }

    fn is_ancestor(&self, ancestor: &Ref, descendant: &Ref) -> Result<bool> {
        let ancestor_oid = self.oid(ancestor)?;
        let descendant_oid = self.oid(descendant)?;

        Ok(ancestor_oid != descendant_oid
            && self.repo.graph_descendant_of(descendant_oid, ancestor_oid)?)
    }

    fn tag(&self, name: &str) -> Result<Option<TagInfo>> {
        let reference = match self.repo.find_reference(&RefKind::Tag.qualify(name)) {
            Ok(reference) => reference,
            Err(e) if matches!(e.code(), ErrorCode::NotFound | ErrorCode::InvalidSpec) => {
                return Ok(None)
            }
            Err(e) => {
                return Err(StashError::topology(format!(
                    "Cannot find tag '{}': {}",
                    name, e
                )))
            }
        };

        let target = reference.peel_to_commit()?.id();
        // Lightweight tags have no tag object and therefore no message
        let message = reference
            .peel_to_tag()
            .ok()
            .and_then(|tag| tag.message().map(|m| m.trim_end().to_string()));

        Ok(Some(TagInfo {
            name: name.to_string(),
            target: to_ref(target),
            message,
        }))
    }

    fn list_tags(&self) -> Result<Vec<String>> {
        let tags = self.repo.tag_names(None)?;

        Ok(tags.iter().flatten().map(|s| s.to_string()).collect())
    }
}
