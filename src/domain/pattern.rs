use crate::domain::version::MajorMinor;
use crate::error::{Result, StashError};
use regex::Regex;

/// Branch or tag naming pattern (e.g., "v{major}.{minor}", "release/{major}.{minor}")
///
/// Placeholders: `{major}`, `{minor}` (required) and `{build}` (optional).
#[derive(Debug, Clone)]
pub struct RefPattern {
    pattern: String,
    regex: Regex,
}

impl RefPattern {
    /// Create a new pattern
    pub fn new(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        if !pattern.contains("{major}") || !pattern.contains("{minor}") {
            return Err(StashError::config(format!(
                "Pattern '{}' must contain {{major}} and {{minor}} placeholders",
                pattern
            )));
        }

        // Escape everything, then swap the escaped placeholders for captures
        let escaped = regex::escape(&pattern);
        let regex_pattern = escaped
            .replace(r"\{major\}", r"(?P<major>\d+)")
            .replace(r"\{minor\}", r"(?P<minor>\d+)")
            .replace(r"\{build\}", r"(?P<build>\d+)");

        let regex = Regex::new(&format!("^{}$", regex_pattern))
            .map_err(|e| StashError::config(format!("Invalid pattern '{}': {}", pattern, e)))?;

        Ok(RefPattern { pattern, regex })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    pub fn has_build(&self) -> bool {
        self.pattern.contains("{build}")
    }

    /// Format a ref name for a release line (and build, if the pattern has one)
    /// Example: pattern="v{major}.{minor}.{build}", 20.21 + 3 -> "v20.21.3"
    pub fn format(&self, major_minor: &MajorMinor, build: Option<u32>) -> String {
        let name = self
            .pattern
            .replace("{major}", &major_minor.major)
            .replace("{minor}", &major_minor.minor);
        match build {
            Some(build) => name.replace("{build}", &build.to_string()),
            None => name,
        }
    }

    /// Extract the release line (and build) from a ref name matching this pattern
    pub fn capture(&self, name: &str) -> Option<(MajorMinor, Option<u32>)> {
        let captures = self.regex.captures(name)?;
        let major_minor = MajorMinor::new(&captures["major"], &captures["minor"]).ok()?;
        let build = match captures.name("build") {
            Some(m) => Some(m.as_str().parse::<u32>().ok()?),
            None => None,
        };
        Some((major_minor, build))
    }
}
