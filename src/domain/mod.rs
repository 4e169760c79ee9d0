//! Domain logic - versions, markers and ancestry heuristics, independent of git

pub mod heuristics;
pub mod marker;
pub mod pattern;
pub mod refs;
pub mod version;

pub use marker::{ResolvedVersionMarker, VersionMarker};
pub use pattern::RefPattern;
pub use refs::Ref;
pub use version::{MajorMinor, SemanticVersion, VersionTag};
