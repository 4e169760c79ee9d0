use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, StashError};

/// Environment variable overriding the store root
pub const ROOT_ENV: &str = "BUILDSTASH_ROOT";

/// Represents the complete configuration for build-stash.
///
/// Contains the store location and lock timings, garbage collection timings,
/// and the branch and tag naming policy of the repository.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub gc: GcConfig,

    #[serde(default)]
    pub topology: TopologyConfig,
}

/// Returns the default store root, under the user cache directory when there is one.
fn default_root() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("build-stash"))
        .unwrap_or_else(|| PathBuf::from(".build-stash"))
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

fn default_lock_retry_ms() -> u64 {
    50
}

/// Configuration for the local stash store.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StoreConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// How long a commit or delete waits for the marker lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Pause between lock attempts
    #[serde(default = "default_lock_retry_ms")]
    pub lock_retry_ms: u64,
}

impl StoreConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn lock_retry(&self) -> Duration {
        Duration::from_millis(self.lock_retry_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            root: default_root(),
            lock_timeout_ms: default_lock_timeout_ms(),
            lock_retry_ms: default_lock_retry_ms(),
        }
    }
}

fn default_interval_secs() -> u64 {
    60
}

fn default_grace_period_secs() -> u64 {
    3600
}

/// Configuration for the background garbage collector.
///
/// A transaction directory without a lock file is only reclaimed once it is
/// older than the grace period.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GcConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
}

impl GcConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            interval_secs: default_interval_secs(),
            grace_period_secs: default_grace_period_secs(),
        }
    }
}

fn default_main_branch() -> String {
    "main".to_string()
}

fn default_release_branch_pattern() -> String {
    "release/{major}.{minor}".to_string()
}

fn default_seed_tag_pattern() -> String {
    "v{major}.{minor}".to_string()
}

fn default_release_tag_pattern() -> String {
    "v{major}.{minor}.{build}".to_string()
}

/// Branch and tag naming policy used to map commits to versions.
///
/// Patterns take `{major}` and `{minor}` placeholders; the release tag
/// pattern also takes `{build}`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TopologyConfig {
    #[serde(default = "default_main_branch")]
    pub main_branch: String,

    #[serde(default = "default_release_branch_pattern")]
    pub release_branch_pattern: String,

    #[serde(default = "default_seed_tag_pattern")]
    pub seed_tag_pattern: String,

    #[serde(default = "default_release_tag_pattern")]
    pub release_tag_pattern: String,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        TopologyConfig {
            main_branch: default_main_branch(),
            release_branch_pattern: default_release_branch_pattern(),
            seed_tag_pattern: default_seed_tag_pattern(),
            release_tag_pattern: default_release_tag_pattern(),
        }
    }
}

/// Loads configuration from file or returns defaults.
///
/// Attempts to load configuration in the following order:
/// 1. Custom path provided as parameter
/// 2. `buildstash.toml` in current directory
/// 3. `.buildstash.toml` in user config directory
/// 4. Default configuration if no file found
///
/// `BUILDSTASH_ROOT`, when set, overrides the store root in every case.
///
/// # Arguments
/// * `config_path` - Optional path to custom configuration file
///
/// # Returns
/// * `Ok(Config)` - Loaded or default configuration
/// * `Err` - If file exists but cannot be read or parsed
pub fn load_config(config_path: Option<&str>) -> Result<Config> {
    let config_file = if let Some(path) = config_path {
        Some(PathBuf::from(path))
    } else if Path::new("./buildstash.toml").exists() {
        Some(PathBuf::from("./buildstash.toml"))
    } else {
        dirs::config_dir()
            .map(|dir| dir.join(".buildstash.toml"))
            .filter(|path| path.exists())
    };

    let mut config = match config_file {
        Some(path) => {
            debug!(path = %path.display(), "loading configuration");
            let config_str = fs::read_to_string(&path).map_err(|e| {
                StashError::config(format!("Cannot read {}: {}", path.display(), e))
            })?;
            toml::from_str(&config_str).map_err(|e| {
                StashError::config(format!("Cannot parse {}: {}", path.display(), e))
            })?
        }
        None => Config::default(),
    };

    if let Some(root) = std::env::var_os(ROOT_ENV).filter(|v| !v.is_empty()) {
        config.store.root = PathBuf::from(root);
    }

    Ok(config)
}
