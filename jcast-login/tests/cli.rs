//! CLI tests for jcast-login
//!
//! Only the argument handling that happens before a browser opens is covered
//! here; the login wait itself is tested in the library against a mock page.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn jcast_login(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("jcast-login").unwrap();
    cmd.current_dir(dir.path()).env_remove("JOURNALCAST_CONFIG");
    cmd
}

#[test]
fn test_help() {
    let dir = TempDir::new().unwrap();
    jcast_login(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--timeout"))
        .stdout(predicate::str::contains("rednote"));
}

#[test]
fn test_unknown_platform() {
    let dir = TempDir::new().unwrap();
    jcast_login(&dir)
        .args(["mastodon", "--output", "out.json"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Unknown platform 'mastodon'"));
}

#[test]
fn test_invalid_timeout() {
    let dir = TempDir::new().unwrap();
    jcast_login(&dir)
        .args(["x", "--output", "out.json", "--timeout", "soon"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Invalid timeout 'soon'"));
}

#[test]
fn test_platform_missing_from_config() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(
        &config,
        "[publish]\nplatforms = [\"x\"]\n\n[x]\nauth_file = \"x.json\"\n",
    )
    .unwrap();

    jcast_login(&dir)
        .arg("rednote")
        .arg("--config")
        .arg(&config)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("rednote.auth_file"));
}
