// tests/config_test.rs
use build_stash::config::{load_config, Config, ROOT_ENV};
use serial_test::serial;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

#[test]
fn test_default_values() {
    let config = Config::default();
    assert_eq!(config.store.lock_timeout(), Duration::from_secs(5));
    assert_eq!(config.store.lock_retry(), Duration::from_millis(50));
    assert_eq!(config.gc.interval(), Duration::from_secs(60));
    assert_eq!(config.gc.grace_period(), Duration::from_secs(3600));
    assert_eq!(config.topology.main_branch, "main");
    assert_eq!(config.topology.release_branch_pattern, "release/{major}.{minor}");
    assert_eq!(config.topology.seed_tag_pattern, "v{major}.{minor}");
    assert_eq!(config.topology.release_tag_pattern, "v{major}.{minor}.{build}");
}

#[test]
#[serial]
fn test_load_from_file() {
    let temp_file = write_config(
        r#"
[store]
root = "/tmp/stash-root"
lock_timeout_ms = 250

[gc]
grace_period_secs = 10

[topology]
main_branch = "trunk"
release_branch_pattern = "rel-{major}.{minor}"
"#,
    );

    let config = load_config(Some(temp_file.path().to_str().unwrap())).unwrap();
    assert_eq!(config.store.root, PathBuf::from("/tmp/stash-root"));
    assert_eq!(config.store.lock_timeout(), Duration::from_millis(250));
    assert_eq!(config.gc.grace_period(), Duration::from_secs(10));
    assert_eq!(config.topology.main_branch, "trunk");
    assert_eq!(config.topology.release_branch_pattern, "rel-{major}.{minor}");
}

#[test]
#[serial]
fn test_partial_file_keeps_defaults() {
    let temp_file = write_config("[gc]\ninterval_secs = 5\n");

    let config = load_config(Some(temp_file.path().to_str().unwrap())).unwrap();
    assert_eq!(config.gc.interval(), Duration::from_secs(5));
    assert_eq!(config.gc.grace_period(), Duration::from_secs(3600));
    assert_eq!(config.store.lock_retry_ms, 50);
    assert_eq!(config.topology, Config::default().topology);
}

#[test]
#[serial]
fn test_invalid_toml_is_config_error() {
    let temp_file = write_config("[store\nroot = ");

    let err = load_config(Some(temp_file.path().to_str().unwrap())).unwrap_err();
    assert!(err.to_string().contains("Cannot parse"));
}

#[test]
#[serial]
fn test_missing_explicit_file_is_error() {
    assert!(load_config(Some("/nonexistent/buildstash.toml")).is_err());
}

#[test]
#[serial]
fn test_root_env_overrides_file() {
    let temp_file = write_config("[store]\nroot = \"/tmp/from-file\"\n");

    std::env::set_var(ROOT_ENV, "/tmp/from-env");
    let config = load_config(Some(temp_file.path().to_str().unwrap()));
    std::env::remove_var(ROOT_ENV);

    assert_eq!(config.unwrap().store.root, PathBuf::from("/tmp/from-env"));
}

#[test]
#[serial]
fn test_empty_root_env_is_ignored() {
    let temp_file = write_config("[store]\nroot = \"/tmp/from-file\"\n");

    std::env::set_var(ROOT_ENV, "");
    let config = load_config(Some(temp_file.path().to_str().unwrap()));
    std::env::remove_var(ROOT_ENV);

    assert_eq!(config.unwrap().store.root, PathBuf::from("/tmp/from-file"));
}
