//! Integration tests for the jcast-send daemon

use assert_cmd::Command;
use chrono::{Days, Local, NaiveDate};
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Setup test environment with config and a local entry file
fn setup_test_env(entry_date: NaiveDate) -> (TempDir, PathBuf, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().display().to_string().replace('\\', "/");
    let config_path = temp_dir.path().join("config.toml");
    let entry_path = temp_dir.path().join("entries.json");

    let config_content = format!(
        r#"
[publish]
platforms = ["x"]
artifacts_dir = "{0}/build"

[schedule]
publish_every = "1h"
reminder_at = "20:00"

[x]
auth_file = "{0}/x-auth.json"

[media]
temp_dir = "{0}/tmp"
"#,
        root
    );
    fs::write(&config_path, config_content).unwrap();

    let entries = serde_json::json!([{
        "id": "entry-1",
        "title": "A quiet Thursday",
        "body": "I walked.",
        "tags": [],
        "date": entry_date.format("%Y-%m-%d").to_string(),
        "status": "Ready"
    }]);
    fs::write(&entry_path, entries.to_string()).unwrap();

    (temp_dir, config_path, entry_path)
}

fn jcast_send(dir: &TempDir, config: &PathBuf, entry: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("jcast-send").unwrap();
    cmd.current_dir(dir.path())
        .env("JOURNALCAST_LOG_LEVEL", "info")
        .env_remove("RUST_LOG")
        .env_remove("OPENROUTER_API_KEY")
        .arg("--config")
        .arg(config)
        .arg("--entry")
        .arg(entry);
    cmd
}

#[test]
fn test_help_documents_schedule() {
    Command::cargo_bin("jcast-send")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("publish_every"))
        .stdout(predicate::str::contains("SIGTERM"));
}

#[test]
fn test_once_with_nothing_ready() {
    let yesterday = Local::now()
        .date_naive()
        .checked_sub_days(Days::new(1))
        .unwrap();
    let (dir, config, entry) = setup_test_env(yesterday);

    jcast_send(&dir, &config, &entry)
        .arg("--once")
        .assert()
        .success()
        .stderr(predicate::str::contains("No journal entry ready for today"));
}

#[test]
fn test_once_without_credentials_exits_with_session_code() {
    let (dir, config, entry) = setup_test_env(Local::now().date_naive());

    jcast_send(&dir, &config, &entry)
        .arg("--once")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("jcast-login"));
}

#[test]
fn test_invalid_schedule_is_rejected() {
    let (dir, config, entry) = setup_test_env(Local::now().date_naive());
    let content = fs::read_to_string(&config)
        .unwrap()
        .replace("reminder_at = \"20:00\"", "reminder_at = \"8pm\"");
    fs::write(&config, content).unwrap();

    jcast_send(&dir, &config, &entry)
        .arg("--once")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("schedule.reminder_at"));
}
