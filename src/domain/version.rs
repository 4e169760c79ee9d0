use crate::error::{Result, StashError};
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d+)\.(\d+)\.(\d+)(?:-([A-Za-z0-9]+))?$").expect("version regex is valid")
    })
}

/// Compare two digit strings by value, then lexically so that `Ord` agrees
/// with structural equality ("020" and "20" are ordered but not equal).
fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a_trimmed = a.trim_start_matches('0');
    let b_trimmed = b.trim_start_matches('0');
    a_trimmed
        .len()
        .cmp(&b_trimmed.len())
        .then_with(|| a_trimmed.cmp(b_trimmed))
        .then_with(|| a.cmp(b))
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// Version tag (the part after `-`)
///
/// `beta`, `rc` and `release` are canonical: their history follows the
/// release workflow closely enough to infer ancestry from the version alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionTag {
    Beta,
    Rc,
    Release,
    /// Anything else, e.g. `canary` or a generated alpha tag
    Other(String),
}

impl VersionTag {
    pub fn parse(s: &str) -> Result<Self> {
        s.parse()
    }

    /// Alpha tag for a commit that is not on any release line: `a` followed
    /// by the abbreviated hash.
    pub fn alpha(commit_hash: &str) -> Self {
        let short: String = commit_hash.chars().take(7).collect();
        VersionTag::Other(format!("a{}", short.to_lowercase()))
    }

    pub fn is_canonical(&self) -> bool {
        !matches!(self, VersionTag::Other(_))
    }

    fn rank(&self) -> u8 {
        match self {
            VersionTag::Beta => 0,
            VersionTag::Rc => 1,
            VersionTag::Release => 2,
            VersionTag::Other(_) => 3,
        }
    }
}

impl FromStr for VersionTag {
    type Err = StashError;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(StashError::version(format!("Invalid version tag: '{}'", s)));
        }
        match s.to_lowercase().as_str() {
            "beta" => Ok(VersionTag::Beta),
            "rc" => Ok(VersionTag::Rc),
            "release" => Ok(VersionTag::Release),
            _ => Ok(VersionTag::Other(s.to_string())),
        }
    }
}

impl Ord for VersionTag {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank()).then_with(|| match (self, other) {
            (VersionTag::Other(a), VersionTag::Other(b)) => a.cmp(b),
            _ => Ordering::Equal,
        })
    }
}

impl PartialOrd for VersionTag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionTag::Beta => write!(f, "beta"),
            VersionTag::Rc => write!(f, "rc"),
            VersionTag::Release => write!(f, "release"),
            VersionTag::Other(s) => write!(f, "{}", s),
        }
    }
}

/// The `major.minor` release line a version belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MajorMinor {
    pub major: String,
    pub minor: String,
}

impl MajorMinor {
    pub fn new(major: impl Into<String>, minor: impl Into<String>) -> Result<Self> {
        let major = major.into();
        let minor = minor.into();
        if !is_digits(&major) || !is_digits(&minor) {
            return Err(StashError::version(format!(
                "Invalid major.minor: '{}.{}'",
                major, minor
            )));
        }
        Ok(MajorMinor { major, minor })
    }

    /// Parse "MM.NN"
    pub fn parse(s: &str) -> Result<Self> {
        let (major, minor) = s.split_once('.').ok_or_else(|| {
            StashError::version(format!("Invalid major.minor: '{}' - expected MM.NN", s))
        })?;
        MajorMinor::new(major, minor)
    }
}

impl Ord for MajorMinor {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_numeric(&self.major, &other.major)
            .then_with(|| compare_numeric(&self.minor, &other.minor))
    }
}

impl PartialOrd for MajorMinor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MajorMinor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Semantic version of a build: `MM.NN.BBBB[-tag]`
///
/// Ordered by major, minor, build and finally tag (untagged first).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SemanticVersion {
    major_minor: MajorMinor,
    build: u32,
    tag: Option<VersionTag>,
}

impl SemanticVersion {
    pub fn new(major_minor: MajorMinor, build: u32, tag: Option<VersionTag>) -> Self {
        SemanticVersion {
            major_minor,
            build,
            tag,
        }
    }

    /// Version of a commit outside every release line
    pub fn with_alpha_tag(major_minor: MajorMinor, build: u32, commit_hash: &str) -> Self {
        SemanticVersion::new(major_minor, build, Some(VersionTag::alpha(commit_hash)))
    }

    /// Parse a version string (e.g., "20.21.3-release")
    pub fn parse(s: &str) -> Result<Self> {
        let captures = version_regex().captures(s.trim()).ok_or_else(|| {
            StashError::version(format!(
                "Invalid version format: '{}' - expected MM.NN.BBBB[-tag]",
                s
            ))
        })?;

        let major_minor = MajorMinor::new(&captures[1], &captures[2])?;
        let build = captures[3]
            .parse::<u32>()
            .map_err(|_| StashError::version(format!("Invalid build number: {}", &captures[3])))?;
        let tag = captures
            .get(4)
            .map(|m| VersionTag::parse(m.as_str()))
            .transpose()?;

        Ok(SemanticVersion::new(major_minor, build, tag))
    }

    pub fn major(&self) -> &str {
        &self.major_minor.major
    }

    pub fn minor(&self) -> &str {
        &self.major_minor.minor
    }

    pub fn major_minor(&self) -> &MajorMinor {
        &self.major_minor
    }

    pub fn build(&self) -> u32 {
        self.build
    }

    pub fn tag(&self) -> Option<&VersionTag> {
        self.tag.as_ref()
    }
}

impl FromStr for SemanticVersion {
    type Err = StashError;

    fn from_str(s: &str) -> Result<Self> {
        SemanticVersion::parse(s)
    }
}

impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major_minor
            .cmp(&other.major_minor)
            .then_with(|| self.build.cmp(&other.build))
            .then_with(|| self.tag.cmp(&other.tag))
    }
}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major_minor, self.build)?;
        if let Some(tag) = &self.tag {
            write!(f, "-{}", tag)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse() {
        let v = SemanticVersion::parse("20.21.3-release").unwrap();
        assert_eq!(v.major(), "20");
        assert_eq!(v.minor(), "21");
        assert_eq!(v.build(), 3);
        assert_eq!(v.tag(), Some(&VersionTag::Release));
    }

    #[test]
    fn test_version_parse_without_tag() {
        let v = SemanticVersion::parse("1.2.3").unwrap();
        assert_eq!(v.tag(), None);
        assert_eq!(v.to_string(), "1.2.3");
    }

    #[test]
    fn test_version_parse_invalid() {
        assert!(SemanticVersion::parse("1.2").is_err());
        assert!(SemanticVersion::parse("1.2.3.4").is_err());
        assert!(SemanticVersion::parse("1.2.3-").is_err());
        assert!(SemanticVersion::parse("1.2.3-be_ta").is_err());
        assert!(SemanticVersion::parse("v1.2.3").is_err());
    }

    #[test]
    fn test_canonical_tags() {
        assert!(VersionTag::parse("beta").unwrap().is_canonical());
        assert!(VersionTag::parse("RC").unwrap().is_canonical());
        assert!(VersionTag::parse("release").unwrap().is_canonical());
        assert!(!VersionTag::parse("canary").unwrap().is_canonical());
        assert!(!VersionTag::alpha("0123456789").is_canonical());
    }

    #[test]
    fn test_alpha_tag_uses_short_hash() {
        let v = SemanticVersion::with_alpha_tag(MajorMinor::parse("20.21").unwrap(), 4, "ABCDEF0123");
        assert_eq!(v.to_string(), "20.21.4-aabcdef");
        assert_eq!(SemanticVersion::parse(&v.to_string()).unwrap(), v);
    }

    #[test]
    fn test_ordering_is_numeric() {
        let a = SemanticVersion::parse("9.1.0-beta").unwrap();
        let b = SemanticVersion::parse("10.0.0-beta").unwrap();
        let c = SemanticVersion::parse("10.0.2-beta").unwrap();
        let d = SemanticVersion::parse("10.0.10-beta").unwrap();
        assert!(a < b);
        assert!(b < c);
        assert!(c < d);
    }

    #[test]
    fn test_ordering_by_tag() {
        let beta = SemanticVersion::parse("1.2.3-beta").unwrap();
        let rc = SemanticVersion::parse("1.2.3-rc").unwrap();
        let release = SemanticVersion::parse("1.2.3-release").unwrap();
        let untagged = SemanticVersion::parse("1.2.3").unwrap();
        assert!(untagged < beta);
        assert!(beta < rc);
        assert!(rc < release);
    }

    #[test]
    fn test_leading_zeros_are_structurally_distinct() {
        let a = MajorMinor::parse("020.21").unwrap();
        let b = MajorMinor::parse("20.21").unwrap();
        assert_ne!(a, b);
        assert_ne!(a.cmp(&b), Ordering::Equal);
        assert!(a < MajorMinor::parse("21.0").unwrap());
    }

    #[test]
    fn test_major_minor_parse() {
        let mm = MajorMinor::parse("20.21").unwrap();
        assert_eq!(mm.to_string(), "20.21");
        assert!(MajorMinor::parse("20").is_err());
        assert!(MajorMinor::parse("20.x").is_err());
    }
}
