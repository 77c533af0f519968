//! Configuration management for Journalcast
//!
//! Non-secret settings live in a TOML file. API tokens and SMTP credentials
//! are read from the environment (optionally seeded from a `.env` file) and
//! held as [`SecretString`]s.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveTime;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::types::{PlatformKind, PublishPolicy};

pub const NOTION_KEY_ENV: &str = "NOTION_KEY";
pub const AI_KEY_ENV: &str = "OPENROUTER_API_KEY";
pub const SMTP_USERNAME_ENV: &str = "SMTP_USERNAME";
pub const SMTP_PASSWORD_ENV: &str = "SMTP_PASSWORD";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub publish: PublishConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    pub x: Option<XConfig>,
    pub rednote: Option<RednoteConfig>,
    #[serde(default)]
    pub media: MediaConfig,
    pub notion: Option<NotionConfig>,
    pub ai: Option<AiConfig>,
    pub email: Option<EmailConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Platforms to attempt, in order.
    pub platforms: Vec<PlatformKind>,
    #[serde(default)]
    pub policy: PublishPolicy,
    /// Where diagnostic screenshots are written.
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: String,
    #[serde(default)]
    pub headless: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_publish_every")]
    pub publish_every: String,
    #[serde(default = "default_reminder_at")]
    pub reminder_at: String,
    #[serde(default = "default_true")]
    pub run_at_startup: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            publish_every: default_publish_every(),
            reminder_at: default_reminder_at(),
            run_at_startup: true,
        }
    }
}

impl ScheduleConfig {
    /// Interval between publish checks.
    pub fn publish_interval(&self) -> Result<Duration> {
        let interval = humantime::parse_duration(&self.publish_every).map_err(|e| {
            ConfigError::InvalidValue {
                field: "schedule.publish_every".to_string(),
                reason: e.to_string(),
            }
        })?;
        if interval < Duration::from_secs(60) {
            return Err(ConfigError::InvalidValue {
                field: "schedule.publish_every".to_string(),
                reason: "must be at least 1m".to_string(),
            }
            .into());
        }
        Ok(interval)
    }

    /// Local wall-clock time of the daily reminder check.
    pub fn reminder_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.reminder_at, "%H:%M").map_err(|e| {
            ConfigError::InvalidValue {
                field: "schedule.reminder_at".to_string(),
                reason: format!("expected HH:MM ({})", e),
            }
            .into()
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XConfig {
    pub auth_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RednoteConfig {
    pub auth_file: String,
    /// Image used when the entry carries none.
    pub default_image: Option<String>,
    /// Bodies longer than this many characters are summarized first.
    #[serde(default = "default_summarize_above")]
    pub summarize_above: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_artifacts_dir")]
    pub temp_dir: String,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_artifacts_dir(),
            max_redirects: default_max_redirects(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionConfig {
    pub database_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub from: String,
    pub to: String,
}

fn default_artifacts_dir() -> String {
    "build".to_string()
}

fn default_publish_every() -> String {
    "2h".to_string()
}

fn default_reminder_at() -> String {
    "20:00".to_string()
}

fn default_true() -> bool {
    true
}

fn default_summarize_above() -> usize {
    1000
}

fn default_max_redirects() -> usize {
    5
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_smtp_port() -> u16 {
    465
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// Also loads `.env` from the working directory so that secrets are in
    /// the environment before any client reads them.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        // A missing .env file is normal; real env vars still apply.
        let _ = dotenvy::dotenv();
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.publish.platforms.is_empty() {
            return Err(ConfigError::MissingField("publish.platforms".to_string()).into());
        }
        for platform in &self.publish.platforms {
            let present = match platform {
                PlatformKind::X => self.x.is_some(),
                PlatformKind::Rednote => self.rednote.is_some(),
            };
            if !present {
                return Err(ConfigError::MissingField(format!("[{}] section", platform)).into());
            }
        }
        self.schedule.publish_interval()?;
        self.schedule.reminder_time()?;
        Ok(())
    }

    /// Credential snapshot path for a platform
    pub fn auth_file(&self, platform: PlatformKind) -> Result<PathBuf> {
        let raw = match platform {
            PlatformKind::X => self.x.as_ref().map(|c| c.auth_file.as_str()),
            PlatformKind::Rednote => self.rednote.as_ref().map(|c| c.auth_file.as_str()),
        };
        raw.map(expand_path)
            .ok_or_else(|| ConfigError::MissingField(format!("{}.auth_file", platform)).into())
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        expand_path(&self.publish.artifacts_dir)
    }
}

/// Expand `~` in a configured path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

/// Read a secret from the environment
pub fn secret_from_env(name: &str) -> Result<SecretString> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(SecretString::from(value)),
        _ => Err(ConfigError::MissingField(format!("environment variable {}", name)).into()),
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("JOURNALCAST_CONFIG") {
        return Ok(expand_path(&path));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("journalcast").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;

    const MINIMAL: &str = r#"
[publish]
platforms = ["x"]

[x]
auth_file = "/tmp/x-auth.json"
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.publish.platforms, vec![PlatformKind::X]);
        assert_eq!(config.publish.policy, PublishPolicy::All);
        assert_eq!(config.publish.artifacts_dir, "build");
        assert!(!config.publish.headless);
        assert_eq!(config.media.max_redirects, 5);
        assert_eq!(config.media.timeout_secs, 30);
        assert_eq!(
            config.schedule.publish_interval().unwrap(),
            Duration::from_secs(2 * 3600)
        );
        assert_eq!(
            config.schedule.reminder_time().unwrap(),
            NaiveTime::from_hms_opt(20, 0, 0).unwrap()
        );
        assert!(config.schedule.run_at_startup);
    }

    #[test]
    fn test_full_config() {
        let content = r#"
[publish]
platforms = ["rednote", "x"]
policy = "any"
artifacts_dir = "out"
headless = true

[schedule]
publish_every = "1h"
reminder_at = "21:30"
run_at_startup = false

[x]
auth_file = "~/x.json"

[rednote]
auth_file = "~/rednote.json"
default_image = "https://images.example/cover.jpg"

[media]
max_redirects = 2
timeout_secs = 5

[notion]
database_id = "db-1"

[ai]
base_url = "https://openrouter.ai/api/v1"

[email]
smtp_host = "smtp.qq.com"
from = "me@example.com"
to = "me@example.com"
"#;
        let config = Config::from_toml(content).unwrap();
        assert_eq!(
            config.publish.platforms,
            vec![PlatformKind::Rednote, PlatformKind::X]
        );
        assert_eq!(config.publish.policy, PublishPolicy::Any);
        assert_eq!(
            config.schedule.reminder_time().unwrap(),
            NaiveTime::from_hms_opt(21, 30, 0).unwrap()
        );
        let rednote = config.rednote.as_ref().unwrap();
        assert_eq!(rednote.summarize_above, 1000);
        assert_eq!(config.ai.as_ref().unwrap().model, "openai/gpt-4o-mini");
        assert_eq!(config.email.as_ref().unwrap().smtp_port, 465);
        assert!(!config
            .auth_file(PlatformKind::X)
            .unwrap()
            .to_string_lossy()
            .starts_with('~'));
    }

    #[test]
    fn test_platform_without_section_rejected() {
        let content = r#"
[publish]
platforms = ["x", "rednote"]

[x]
auth_file = "/tmp/x.json"
"#;
        let err = Config::from_toml(content).unwrap_err();
        assert!(err.to_string().contains("[rednote] section"));
    }

    #[test]
    fn test_empty_platforms_rejected() {
        let content = "[publish]\nplatforms = []\n";
        let err = Config::from_toml(content).unwrap_err();
        assert!(err.to_string().contains("publish.platforms"));
    }

    #[test]
    fn test_invalid_schedule_values() {
        let content = format!("{}\n[schedule]\npublish_every = \"soon\"\n", MINIMAL);
        assert!(Config::from_toml(&content).is_err());

        let content = format!("{}\n[schedule]\nreminder_at = \"8pm\"\n", MINIMAL);
        let err = Config::from_toml(&content).unwrap_err();
        assert!(err.to_string().contains("schedule.reminder_at"));

        let content = format!("{}\n[schedule]\npublish_every = \"10s\"\n", MINIMAL);
        assert!(Config::from_toml(&content).is_err());
    }

    #[test]
    #[serial]
    fn test_secret_from_env() {
        std::env::set_var("JOURNALCAST_TEST_SECRET", "s3cret");
        let secret = secret_from_env("JOURNALCAST_TEST_SECRET").unwrap();
        assert_eq!(secret.expose_secret(), "s3cret");

        std::env::remove_var("JOURNALCAST_TEST_SECRET");
        let err = secret_from_env("JOURNALCAST_TEST_SECRET").unwrap_err();
        assert!(err.to_string().contains("JOURNALCAST_TEST_SECRET"));
    }

    #[test]
    #[serial]
    fn test_resolve_config_path_from_env() {
        std::env::set_var("JOURNALCAST_CONFIG", "/etc/journalcast.toml");
        assert_eq!(
            resolve_config_path().unwrap(),
            PathBuf::from("/etc/journalcast.toml")
        );
        std::env::remove_var("JOURNALCAST_CONFIG");
    }
}
