use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn test_config_path_command() {
    let dir = tempdir().unwrap();

    cargo_bin_cmd!("uncling")
        .env("UNCLING_HOME", dir.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_init_creates_file() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.toml");

    assert!(!config_path.exists());

    cargo_bin_cmd!("uncling")
        .env("UNCLING_HOME", dir.path())
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created config at"));

    let contents = fs::read_to_string(&config_path).unwrap();
    assert!(contents.contains("session_timeout_secs = 10"));
    assert!(contents.contains("# url ="));
}

#[test]
fn test_config_init_fails_if_exists() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("config.toml"), "# existing config").unwrap();

    cargo_bin_cmd!("uncling")
        .env("UNCLING_HOME", dir.path())
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_config_set_writes_nested_key() {
    let dir = tempdir().unwrap();

    cargo_bin_cmd!("uncling")
        .env("UNCLING_HOME", dir.path())
        .args(["config", "set", "providers.backend.url", "https://demo.example.com"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Set providers.backend.url = https://demo.example.com",
        ));

    let contents = fs::read_to_string(dir.path().join("config.toml")).unwrap();
    assert!(contents.contains("url = \"https://demo.example.com\""));
}

#[test]
fn test_config_help_shows_subcommands() {
    cargo_bin_cmd!("uncling")
        .args(["config", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("path"))
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("set"));
}
