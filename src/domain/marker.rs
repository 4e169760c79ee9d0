//! Version markers: the keys stashes are stored and looked up under
//!
//! A marker pairs a semantic version with a commit hash, either of which may
//! be unknown. It serializes to a directory name (`hash_version`) and to a
//! human-typable identifier (`hash@version`); both forms share one grammar
//! and spell a missing half as `unknown`.

use crate::domain::version::SemanticVersion;
use crate::error::{Result, StashError};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Placeholder for a missing half
pub const UNKNOWN: &str = "unknown";

/// Separator used in on-disk directory names
pub const DIRECTORY_SEPARATOR: char = '_';

/// Separator used in identifiers typed on the command line
pub const IDENTIFIER_SEPARATOR: char = '@';

fn validate_hash(hash: &str) -> Result<()> {
    if hash.is_empty() {
        return Err(StashError::marker("Commit hash is empty"));
    }
    if hash.contains(DIRECTORY_SEPARATOR) || hash.contains(IDENTIFIER_SEPARATOR) {
        return Err(StashError::marker(format!(
            "Commit hash '{}' contains a separator",
            hash
        )));
    }
    if hash.eq_ignore_ascii_case(UNKNOWN) || !hash.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(StashError::marker(format!("Invalid commit hash: '{}'", hash)));
    }
    Ok(())
}

/// A (semantic version, commit hash) pair, either half possibly unknown
///
/// Equality ignores the case of the hash.
#[derive(Debug, Clone, Default)]
pub struct VersionMarker {
    semantic_version: Option<SemanticVersion>,
    commit_hash: Option<String>,
}

impl VersionMarker {
    pub fn new(semantic_version: Option<SemanticVersion>, commit_hash: Option<&str>) -> Result<Self> {
        if let Some(hash) = commit_hash {
            validate_hash(hash)?;
        }
        Ok(VersionMarker {
            semantic_version,
            commit_hash: commit_hash.map(str::to_string),
        })
    }

    /// The marker returned when a lookup finds nothing
    pub fn invalid() -> Self {
        VersionMarker::default()
    }

    pub fn from_version(version: SemanticVersion) -> Self {
        VersionMarker {
            semantic_version: Some(version),
            commit_hash: None,
        }
    }

    pub fn from_commit(hash: &str) -> Result<Self> {
        VersionMarker::new(None, Some(hash))
    }

    pub fn semantic_version(&self) -> Option<&SemanticVersion> {
        self.semantic_version.as_ref()
    }

    pub fn commit_hash(&self) -> Option<&str> {
        self.commit_hash.as_deref()
    }

    /// At least one half is known
    pub fn is_valid(&self) -> bool {
        self.semantic_version.is_some() || self.commit_hash.is_some()
    }

    /// Both halves are known
    pub fn is_complete(&self) -> bool {
        self.semantic_version.is_some() && self.commit_hash.is_some()
    }

    /// The resolved form, if both halves are known
    pub fn to_resolved(&self) -> Option<ResolvedVersionMarker> {
        match (&self.semantic_version, &self.commit_hash) {
            (Some(version), Some(hash)) => Some(ResolvedVersionMarker {
                semantic_version: version.clone(),
                commit_hash: hash.clone(),
            }),
            _ => None,
        }
    }

    /// True if `hash` names the same commit as this marker
    pub fn has_commit(&self, hash: &str) -> bool {
        self.commit_hash
            .as_deref()
            .is_some_and(|own| own.eq_ignore_ascii_case(hash))
    }

    fn render(&self, separator: char) -> String {
        let hash = self
            .commit_hash
            .as_deref()
            .map(str::to_lowercase)
            .unwrap_or_else(|| UNKNOWN.to_string());
        let version = self
            .semantic_version
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| UNKNOWN.to_string());
        format!("{}{}{}", hash, separator, version)
    }

    /// Name of the directory the stash for this marker lives in
    pub fn directory_name(&self) -> String {
        self.render(DIRECTORY_SEPARATOR)
    }

    /// Human-typable identifier (`hash@version`)
    pub fn identifier(&self) -> String {
        self.render(IDENTIFIER_SEPARATOR)
    }

    fn parse_with(s: &str, separator: char) -> Result<Self> {
        let (hash, version) = s.split_once(separator).ok_or_else(|| {
            StashError::marker(format!("'{}' has no '{}' separator", s, separator))
        })?;
        if version.contains(separator) {
            return Err(StashError::marker(format!(
                "'{}' contains more than one '{}' separator",
                s, separator
            )));
        }

        let commit_hash = (hash != UNKNOWN).then_some(hash);
        let semantic_version = if version == UNKNOWN {
            None
        } else {
            Some(SemanticVersion::parse(version)?)
        };

        let marker = VersionMarker::new(semantic_version, commit_hash)?;
        if !marker.is_valid() {
            return Err(StashError::marker(format!("'{}' names neither a commit nor a version", s)));
        }
        Ok(marker)
    }

    pub fn parse_directory_name(name: &str) -> Result<Self> {
        VersionMarker::parse_with(name, DIRECTORY_SEPARATOR)
    }

    pub fn parse_identifier(identifier: &str) -> Result<Self> {
        VersionMarker::parse_with(identifier, IDENTIFIER_SEPARATOR)
    }

    /// Accept a full identifier, a bare version or a bare commit hash
    pub fn from_user_input(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.contains(IDENTIFIER_SEPARATOR) {
            return VersionMarker::parse_identifier(input);
        }
        match SemanticVersion::parse(input) {
            Ok(version) => Ok(VersionMarker::from_version(version)),
            Err(_) => VersionMarker::from_commit(input),
        }
    }
}

impl PartialEq for VersionMarker {
    fn eq(&self, other: &Self) -> bool {
        let hashes_equal = match (&self.commit_hash, &other.commit_hash) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            (None, None) => true,
            _ => false,
        };
        hashes_equal && self.semantic_version == other.semantic_version
    }
}

impl Eq for VersionMarker {}

impl Hash for VersionMarker {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.commit_hash.as_deref().map(str::to_lowercase).hash(state);
        self.semantic_version.hash(state);
    }
}

impl fmt::Display for VersionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier())
    }
}

impl FromStr for VersionMarker {
    type Err = StashError;

    fn from_str(s: &str) -> Result<Self> {
        VersionMarker::parse_identifier(s)
    }
}

impl From<ResolvedVersionMarker> for VersionMarker {
    fn from(resolved: ResolvedVersionMarker) -> Self {
        VersionMarker {
            semantic_version: Some(resolved.semantic_version),
            commit_hash: Some(resolved.commit_hash),
        }
    }
}

/// A marker with both halves known
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedVersionMarker {
    semantic_version: SemanticVersion,
    commit_hash: String,
}

impl ResolvedVersionMarker {
    pub fn new(semantic_version: SemanticVersion, commit_hash: &str) -> Result<Self> {
        validate_hash(commit_hash)?;
        Ok(ResolvedVersionMarker {
            semantic_version,
            commit_hash: commit_hash.to_lowercase(),
        })
    }

    pub fn semantic_version(&self) -> &SemanticVersion {
        &self.semantic_version
    }

    pub fn commit_hash(&self) -> &str {
        &self.commit_hash
    }

    pub fn to_marker(&self) -> VersionMarker {
        VersionMarker::from(self.clone())
    }
}

impl fmt::Display for ResolvedVersionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.commit_hash, IDENTIFIER_SEPARATOR, self.semantic_version)
    }
}
