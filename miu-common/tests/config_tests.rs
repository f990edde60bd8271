//! Configuration resolution tests
//!
//! Tests that manipulate `MIU_CONFIG` or `MIU_DATA_DIR` are marked with
//! `#[serial]` so they never race on process environment.

use miu_common::config::{
    resolve_config_path, resolve_data_dir, CONFIG_ENV_VAR, DATA_DIR_ENV_VAR,
};
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};

#[test]
#[serial]
fn test_cli_config_path_wins_over_env() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/miu-env-config.toml");

    let resolved = resolve_config_path(Some(Path::new("/tmp/miu-cli-config.toml")));
    assert_eq!(resolved, Some(PathBuf::from("/tmp/miu-cli-config.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_config_path_used_without_cli() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/miu-env-config.toml");

    let resolved = resolve_config_path(None);
    assert_eq!(resolved, Some(PathBuf::from("/tmp/miu-env-config.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_blank_env_config_path_is_ignored() {
    env::set_var(CONFIG_ENV_VAR, "   ");

    let resolved = resolve_config_path(None);
    assert_ne!(resolved, Some(PathBuf::from("   ")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_data_dir_priority_order() {
    env::remove_var(DATA_DIR_ENV_VAR);

    let configured = PathBuf::from("/srv/miu-configured");
    assert_eq!(
        resolve_data_dir(None, Some(&configured)),
        configured,
        "configured value used when no CLI or env override"
    );

    env::set_var(DATA_DIR_ENV_VAR, "/srv/miu-env");
    assert_eq!(
        resolve_data_dir(None, Some(&configured)),
        PathBuf::from("/srv/miu-env"),
        "env var beats configured value"
    );

    assert_eq!(
        resolve_data_dir(Some(Path::new("/srv/miu-cli")), Some(&configured)),
        PathBuf::from("/srv/miu-cli"),
        "CLI beats env var"
    );

    env::remove_var(DATA_DIR_ENV_VAR);
}

#[test]
#[serial]
fn test_data_dir_falls_back_to_default() {
    env::remove_var(DATA_DIR_ENV_VAR);

    let resolved = resolve_data_dir(None, None);
    assert!(!resolved.as_os_str().is_empty());
    assert_eq!(resolved, miu_common::config::default_data_dir());
}
