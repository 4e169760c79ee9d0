//! Commit topology over a git history with a tag and branch naming policy
//!
//! - a seed tag (`v{major}.{minor}`) marks build 0 of a release line on the
//!   main branch;
//! - first-parent commits of the main branch after the seed are `beta`
//!   builds, up to the first parent of the next seed (the branch point);
//! - first-parent commits of the release branch (`release/{major}.{minor}`)
//!   are `rc` builds;
//! - a release tag (`v{major}.{minor}.{build}`) marks a `release` build;
//! - anything else gets an alpha tag derived from its hash.

use tracing::debug;

use crate::config::TopologyConfig;
use crate::domain::{
    MajorMinor, Ref, RefPattern, ResolvedVersionMarker, SemanticVersion, VersionMarker,
    VersionTag,
};
use crate::error::{Result, StashError};
use crate::git::{CommitFilter, Oracle, RefKind};
use crate::topology::build_number::{build_number, find_commit};
use crate::topology::{integration, Ancestry, CommitTopology, TopologyCache};

pub struct GitCommitTopology<O: Oracle> {
    cache: TopologyCache<O>,
    main_branch: String,
    release_branch: RefPattern,
    seed_tag: RefPattern,
    release_tag: RefPattern,
    seeds: Option<Vec<(MajorMinor, Ref)>>,
}

impl<O: Oracle> GitCommitTopology<O> {
    pub fn new(oracle: O, config: &TopologyConfig) -> Result<Self> {
        let release_tag = RefPattern::new(config.release_tag_pattern.as_str())?;
        if !release_tag.has_build() {
            return Err(StashError::config(format!(
                "Release tag pattern '{}' must contain a {{build}} placeholder",
                config.release_tag_pattern
            )));
        }

        Ok(GitCommitTopology {
            cache: TopologyCache::new(oracle),
            main_branch: config.main_branch.clone(),
            release_branch: RefPattern::new(config.release_branch_pattern.as_str())?,
            seed_tag: RefPattern::new(config.seed_tag_pattern.as_str())?,
            release_tag,
            seeds: None,
        })
    }

    /// Session cache, for direct build-number and integration queries
    pub fn cache(&mut self) -> &mut TopologyCache<O> {
        &mut self.cache
    }

    /// Seed commits of every release line, oldest line first
    fn seeds(&mut self) -> Result<Vec<(MajorMinor, Ref)>> {
        if let Some(seeds) = &self.seeds {
            return Ok(seeds.clone());
        }

        let mut seeds = Vec::new();
        for name in self.cache.list_tags()? {
            let Some((major_minor, None)) = self.seed_tag.capture(&name) else {
                continue;
            };
            if let Some(tag) = self.cache.tag(&name)? {
                seeds.push((major_minor, tag.target));
            }
        }
        seeds.sort_by(|a, b| a.0.cmp(&b.0));
        seeds.dedup_by(|a, b| a.0 == b.0);
        debug!(count = seeds.len(), "discovered seed tags");

        self.seeds = Some(seeds.clone());
        Ok(seeds)
    }

    fn seed_for(&mut self, major_minor: &MajorMinor) -> Result<Ref> {
        self.seeds()?
            .into_iter()
            .find(|(mm, _)| mm == major_minor)
            .map(|(_, seed)| seed)
            .ok_or_else(|| {
                StashError::resolution(format!(
                    "No seed tag '{}' for {}",
                    self.seed_tag.format(major_minor, None),
                    major_minor
                ))
            })
    }

    fn main_head(&mut self) -> Result<Ref> {
        let name = RefKind::Branch.qualify(&self.main_branch);
        self.cache.resolve(&name)
    }

    fn release_head(&mut self, major_minor: &MajorMinor) -> Result<Option<Ref>> {
        let name = RefKind::Branch.qualify(&self.release_branch.format(major_minor, None));
        self.cache.try_resolve(&name)
    }

    /// First parent of the next release line's seed
    fn branch_point(&mut self, major_minor: &MajorMinor) -> Result<Option<Ref>> {
        let seeds = self.seeds()?;
        let Some(index) = seeds.iter().position(|(mm, _)| mm == major_minor) else {
            return Err(StashError::resolution(format!("No seed tag for {}", major_minor)));
        };
        let Some((_, next_seed)) = seeds.get(index + 1) else {
            return Ok(None);
        };

        let seed = &seeds[index].1;
        let spine = self.cache.list_commits(seed, next_seed, CommitFilter::FirstParent)?;
        Ok(Some(spine.get(1).cloned().unwrap_or_else(|| seed.clone())))
    }

    /// Last main-line commit that belongs to `major_minor`
    fn main_end(&mut self, major_minor: &MajorMinor) -> Result<Ref> {
        match self.branch_point(major_minor)? {
            Some(point) => Ok(point),
            None => self.main_head(),
        }
    }

    fn on_first_parent_chain(&mut self, seed: &Ref, end: &Ref, commit: &Ref) -> Result<bool> {
        if commit == end {
            return Ok(true);
        }
        Ok(self
            .cache
            .list_commits(seed, end, CommitFilter::FirstParent)?
            .contains(commit))
    }

    fn tag_for(
        &mut self,
        major_minor: &MajorMinor,
        seed: &Ref,
        commit: &Ref,
        build: u32,
    ) -> Result<VersionTag> {
        let release_tag = self.release_tag.format(major_minor, Some(build));
        if let Some(tag) = self.cache.tag(&release_tag)? {
            if tag.target == *commit {
                return Ok(VersionTag::Release);
            }
        }
        if commit == seed {
            return Ok(VersionTag::Beta);
        }

        let main_end = self.main_end(major_minor)?;
        if self.on_first_parent_chain(seed, &main_end, commit)? {
            return Ok(VersionTag::Beta);
        }
        if let Some(head) = self.release_head(major_minor)? {
            if self.on_first_parent_chain(seed, &head, commit)? {
                return Ok(VersionTag::Rc);
            }
        }

        Ok(VersionTag::alpha(commit.as_str()))
    }

    /// Version of a commit, relative to the newest seed it descends from
    pub fn resolve_commit(&mut self, commit: &Ref) -> Result<ResolvedVersionMarker> {
        for (major_minor, seed) in self.seeds()?.iter().rev() {
            if seed != commit && !self.cache.is_ancestor(seed, commit)? {
                continue;
            }
            let build = build_number(&mut self.cache, seed, commit)?;
            let tag = self.tag_for(major_minor, seed, commit, build)?;
            let version = SemanticVersion::new(major_minor.clone(), build, Some(tag));
            return ResolvedVersionMarker::new(version, commit.as_str());
        }

        Err(StashError::resolution(format!(
            "No seed tag precedes commit {}",
            commit
        )))
    }

    /// Commit of a canonical version
    pub fn resolve_version(&mut self, version: &SemanticVersion) -> Result<Ref> {
        let major_minor = version.major_minor();
        let build = i64::from(version.build());

        match version.tag() {
            Some(VersionTag::Beta) => {
                let seed = self.seed_for(major_minor)?;
                let end = self.main_end(major_minor)?;
                find_commit(&mut self.cache, &seed, &end, build)
            }
            Some(VersionTag::Release) => {
                let name = self.release_tag.format(major_minor, Some(version.build()));
                match self.cache.tag(&name)? {
                    Some(tag) => Ok(tag.target),
                    None => self.resolve_on_release_branch(major_minor, build),
                }
            }
            Some(VersionTag::Rc) => self.resolve_on_release_branch(major_minor, build),
            _ => Err(StashError::resolution(format!(
                "Version {} has no canonical tag and cannot be resolved without a commit",
                version
            ))),
        }
    }

    fn resolve_on_release_branch(&mut self, major_minor: &MajorMinor, build: i64) -> Result<Ref> {
        let seed = self.seed_for(major_minor)?;
        let head = self.release_head(major_minor)?.ok_or_else(|| {
            StashError::resolution(format!(
                "No release branch '{}'",
                self.release_branch.format(major_minor, None)
            ))
        })?;
        find_commit(&mut self.cache, &seed, &head, build)
    }

    /// Main-line version that first integrated the commit `name`
    pub fn landed_in(&mut self, name: &str) -> Result<ResolvedVersionMarker> {
        let commit = self.cache.resolve(name)?;
        let main = self.main_head()?;
        let seeds = self.seeds()?;

        let mut start = None;
        for (_, seed) in seeds.iter().rev() {
            if *seed == commit || self.cache.is_ancestor(seed, &commit)? {
                start = Some(seed.clone());
                break;
            }
        }
        let start = start
            .or_else(|| seeds.first().map(|(_, seed)| seed.clone()))
            .ok_or_else(|| StashError::resolution("No seed tags in repository"))?;

        let point = integration::find_commit(&mut self.cache, &start, &main, &commit)?;
        self.resolve_commit(&point)
    }
}

impl<O: Oracle> CommitTopology for GitCommitTopology<O> {
    fn resolve(&mut self, marker: &VersionMarker) -> Result<ResolvedVersionMarker> {
        if let Some(resolved) = marker.to_resolved() {
            return Ok(resolved);
        }

        match (marker.commit_hash(), marker.semantic_version()) {
            (Some(hash), _) => {
                let commit = self.cache.resolve(hash)?;
                self.resolve_commit(&commit)
            }
            (None, Some(version)) => {
                let commit = self.resolve_version(version)?;
                ResolvedVersionMarker::new(version.clone(), commit.as_str())
            }
            (None, None) => Err(StashError::resolution("Cannot resolve an invalid marker")),
        }
    }

    fn is_ancestor(
        &mut self,
        ancestor: &ResolvedVersionMarker,
        descendant: &ResolvedVersionMarker,
    ) -> Result<bool> {
        if ancestor
            .commit_hash()
            .eq_ignore_ascii_case(descendant.commit_hash())
        {
            return Ok(true);
        }
        self.cache.is_ancestor(
            &Ref::new(ancestor.commit_hash()),
            &Ref::new(descendant.commit_hash()),
        )
    }

    fn ancestry(&mut self, marker: &ResolvedVersionMarker) -> Result<Ancestry<'_>> {
        let commit = Ref::new(marker.commit_hash());
        let seed = self.seed_for(marker.semantic_version().major_minor())?;

        let mut commits = if commit == seed {
            Vec::new()
        } else {
            self.cache
                .list_commits(&seed, &commit, CommitFilter::FirstParent)?
        };
        commits.push(seed);

        let first = std::iter::once(Ok(marker.clone()));
        let rest = commits
            .into_iter()
            .skip(1)
            .map(move |c| self.resolve_commit(&c));
        Ok(Box::new(first.chain(rest)))
    }

    fn last_version_before_branch_point(
        &mut self,
        major_minor: &MajorMinor,
    ) -> Result<Option<ResolvedVersionMarker>> {
        match self.branch_point(major_minor)? {
            Some(point) => Ok(Some(self.resolve_commit(&point)?)),
            None => Ok(None),
        }
    }
}
