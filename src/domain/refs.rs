use std::fmt;

/// Case-normalized name of a commit, branch or tag
///
/// Commit hashes handed out by the oracle are lower-case hex, so normalizing
/// here lets hashes typed by a user compare equal to oracle output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ref(String);

impl Ref {
    /// Create a ref, trimming whitespace and lower-casing the name
    pub fn new(name: impl AsRef<str>) -> Self {
        Ref(name.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First seven characters, the conventional abbreviated hash
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(7) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Ref {
    fn from(name: &str) -> Self {
        Ref::new(name)
    }
}

impl From<String> for Ref {
    fn from(name: String) -> Self {
        Ref::new(name)
    }
}

impl AsRef<str> for Ref {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
