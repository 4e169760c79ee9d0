//! Version-only ancestry heuristics
//!
//! These rules encode the release workflow: every `major.minor` starts from a
//! seed build 0 on the main line, beta builds follow the main line, and the
//! release branch forks from it just before the next `major.minor` is seeded.
//! They answer "probably an ancestor" without looking at the commit graph.

use crate::domain::version::{SemanticVersion, VersionTag};

/// True iff the version carries a canonical tag (`beta`, `rc`, `release`)
pub fn is_canonical_version(version: &SemanticVersion) -> bool {
    version.tag().is_some_and(VersionTag::is_canonical)
}

/// Is `subject` probably reachable backward from `reference`?
///
/// `last_subject_master_build` is the last main-line build of the subject's
/// `major.minor` before its release branch forked, when known.
pub fn is_ancestor(
    reference: &SemanticVersion,
    subject: &SemanticVersion,
    last_subject_master_build: Option<u32>,
) -> bool {
    if !is_canonical_version(subject) {
        return false;
    }

    let before_branch_point =
        last_subject_master_build.is_some_and(|last| subject.build() <= last);

    match reference.major_minor().cmp(subject.major_minor()) {
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => {
            if subject.build() <= reference.build() && subject.tag() == reference.tag() {
                return true;
            }
            if subject.build() < reference.build() {
                let reference_is_release_line =
                    matches!(reference.tag(), Some(VersionTag::Rc | VersionTag::Release));
                return (before_branch_point && reference_is_release_line) || subject.build() == 0;
            }
            false
        }
        std::cmp::Ordering::Greater => subject.build() == 0 || before_branch_point,
    }
}
