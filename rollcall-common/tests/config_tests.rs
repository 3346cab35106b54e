//! Integration tests for configuration loading and graceful degradation
//!
//! Covers:
//! - Missing config files fall back to compiled defaults
//! - Root folder priority: CLI > environment > TOML > OS default
//! - Atomic config writes (temp file + rename)
//!
//! Tests that manipulate ROLLCALL_ROOT_FOLDER are marked #[serial] so they
//! do not race each other on the process environment.

use rollcall_common::config::{
    default_root_folder, resolve_root_folder, write_config, ReentryPolicy, TrackerConfig,
    ROOT_FOLDER_ENV,
};
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
fn test_missing_file_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("does-not-exist.toml");

    let config = TrackerConfig::load(&path).unwrap();
    assert_eq!(config, TrackerConfig::default());
}

#[test]
fn test_load_full_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
root_folder = "/srv/attendance"
cooldown_window_secs = 120
late_cutoff = "09:00"
overtime_cutoff = "18:30"
lock_timeout_ms = 250
reentry_policy = "retain"
unknown_label = "Stranger"

[logging]
level = "debug"
"#,
    )
    .unwrap();

    let config = TrackerConfig::load(&path).unwrap();
    assert_eq!(config.root_folder, Some(PathBuf::from("/srv/attendance")));
    assert_eq!(config.cooldown_window_secs, 120);
    assert_eq!(config.late_cutoff, "09:00");
    assert_eq!(config.overtime_cutoff, "18:30");
    assert_eq!(config.lock_timeout_ms, 250);
    assert_eq!(config.reentry_policy, ReentryPolicy::Retain);
    assert_eq!(config.unknown_label, "Stranger");
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_malformed_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "cooldown_window_secs = \"five minutes\"\n").unwrap();

    assert!(TrackerConfig::load(&path).is_err());
}

#[test]
fn test_atomic_write_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("nested").join("config.toml");

    let config = TrackerConfig {
        cooldown_window_secs: 90,
        late_cutoff: "08:45".to_string(),
        ..TrackerConfig::default()
    };
    write_config(&config, &target).unwrap();

    assert!(target.exists());
    assert!(!temp_dir.path().join("nested").join("config.toml.tmp").exists());

    let reloaded = TrackerConfig::load(&target).unwrap();
    assert_eq!(reloaded, config);
}

#[test]
fn test_write_refuses_invalid_config() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("config.toml");

    let config = TrackerConfig {
        late_cutoff: "not a time".to_string(),
        ..TrackerConfig::default()
    };
    assert!(write_config(&config, &target).is_err());
    assert!(!target.exists());
}

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let root = resolve_root_folder(None, &TrackerConfig::default());
    assert_eq!(root, default_root_folder());
}

#[test]
#[serial]
fn test_resolver_env_var_beats_config() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/rollcall-env-root");

    let config = TrackerConfig {
        root_folder: Some(PathBuf::from("/tmp/rollcall-config-root")),
        ..TrackerConfig::default()
    };
    let root = resolve_root_folder(None, &config);
    assert_eq!(root, PathBuf::from("/tmp/rollcall-env-root"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_resolver_config_beats_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let config = TrackerConfig {
        root_folder: Some(PathBuf::from("/tmp/rollcall-config-root")),
        ..TrackerConfig::default()
    };
    let root = resolve_root_folder(None, &config);
    assert_eq!(root, PathBuf::from("/tmp/rollcall-config-root"));
}

#[test]
#[serial]
fn test_resolver_cli_beats_env() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/rollcall-env-root");

    let root = resolve_root_folder(Some(Path::new("/tmp/rollcall-cli")), &TrackerConfig::default());
    assert_eq!(root, PathBuf::from("/tmp/rollcall-cli"));

    env::remove_var(ROOT_FOLDER_ENV);
}
