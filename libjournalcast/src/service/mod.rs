//! Service layer for Journalcast
//!
//! The binaries share one entry point, [`JournalcastService`], which wires the
//! configured content source, text transformer, browser and platform adapters
//! together and exposes the two jobs: publishing today's entry and sending the
//! evening reminder.
//!
//! # Example
//!
//! ```no_run
//! use libjournalcast::service::JournalcastService;
//!
//! # async fn example() -> libjournalcast::Result<()> {
//! let service = JournalcastService::new()?;
//!
//! let report = service.publish(None).await?;
//! println!("{}", report.render_text());
//! # Ok(())
//! # }
//! ```

pub mod orchestrator;
pub mod reminder;

pub use orchestrator::{DraftPreview, Orchestrator, RunReport};
pub use reminder::{remind, ReminderOutcome};

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::browser::chromium::ChromiumLauncher;
use crate::browser::BrowserLauncher;
use crate::error::{Result, ServiceError};
use crate::media::MediaResolver;
use crate::notify::{Notifier, SmtpNotifier};
use crate::platforms::create_adapters;
use crate::source::{ContentSource, NotionSource};
use crate::transform::ai::AiTransformer;
use crate::transform::{PassthroughTransformer, TextTransformer};
use crate::types::PublishPolicy;
use crate::Config;

/// Main service facade
///
/// Holds the shared content source so that the publish job and the reminder
/// job look at the same journal.
pub struct JournalcastService {
    config: Arc<Config>,
    source: Arc<dyn ContentSource>,
    orchestrator: Orchestrator,
    notifier: Option<Arc<dyn Notifier>>,
}

impl JournalcastService {
    /// Create a service from the default configuration file
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or the Notion
    /// source is not configured.
    pub fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config)
    }

    /// Create a service reading entries from the configured Notion database
    pub fn from_config(config: Config) -> Result<Self> {
        let notion = config.notion.as_ref().ok_or_else(|| {
            ServiceError::NotConfigured("[notion] section is required".to_string())
        })?;
        let source = Arc::new(NotionSource::from_config(notion)?);
        Self::with_source(config, source)
    }

    /// Create a service with a custom content source and a real browser
    pub fn with_source(config: Config, source: Arc<dyn ContentSource>) -> Result<Self> {
        let launcher = Arc::new(ChromiumLauncher::new(config.publish.headless));
        Self::with_parts(config, source, launcher)
    }

    /// Create a service with a custom source and browser launcher
    pub fn with_parts(
        config: Config,
        source: Arc<dyn ContentSource>,
        launcher: Arc<dyn BrowserLauncher>,
    ) -> Result<Self> {
        let transformer = build_transformer(&config);
        let media = MediaResolver::from_config(&config.media)?;
        let adapters = create_adapters(&config)?;
        let orchestrator = Orchestrator::new(
            Arc::clone(&source),
            transformer,
            launcher,
            media,
            adapters,
            config.artifacts_dir(),
        );
        info!(platforms = ?orchestrator.platforms(), "Journalcast service ready");

        Ok(Self {
            config: Arc::new(config),
            source,
            orchestrator,
            notifier: None,
        })
    }

    /// Use this notifier instead of SMTP from `[email]`
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Access the orchestrator directly
    pub fn publishing(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Publish today's entry, falling back to the configured policy
    pub async fn publish(&self, policy: Option<PublishPolicy>) -> Result<RunReport> {
        self.orchestrator
            .run(policy.unwrap_or(self.config.publish.policy))
            .await
    }

    /// Drafts for today's entry, or `None` when nothing is ready
    pub async fn preview(&self) -> Result<Option<Vec<DraftPreview>>> {
        self.orchestrator.preview().await
    }

    /// Remind by email if no entry exists for `date`
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotConfigured` when neither a notifier was
    /// injected nor `[email]` is configured, and any error querying the source.
    pub async fn remind(&self, date: NaiveDate) -> Result<ReminderOutcome> {
        let notifier: Arc<dyn Notifier> = match &self.notifier {
            Some(notifier) => Arc::clone(notifier),
            None => {
                let email = self.config.email.as_ref().ok_or_else(|| {
                    ServiceError::NotConfigured("[email] section is required".to_string())
                })?;
                Arc::new(SmtpNotifier::from_config(email)?)
            }
        };
        remind(self.source.as_ref(), notifier.as_ref(), date).await
    }
}

fn build_transformer(config: &Config) -> Arc<dyn TextTransformer> {
    let Some(ai) = &config.ai else {
        return Arc::new(PassthroughTransformer);
    };
    match AiTransformer::from_config(ai) {
        Ok(transformer) => Arc::new(transformer),
        Err(e) => {
            warn!(error = %e, "AI transformer unavailable, posting text unchanged");
            Arc::new(PassthroughTransformer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::MockLauncher;
    use crate::error::JournalcastError;
    use crate::source::MemorySource;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> Config {
        Config::from_toml(&format!(
            r#"
[publish]
platforms = ["x"]
artifacts_dir = "{0}/build"

[x]
auth_file = "{0}/x.json"

[media]
temp_dir = "{0}/tmp"
"#,
            dir.path().display()
        ))
        .unwrap()
    }

    #[test]
    fn test_notion_required_without_custom_source() {
        let dir = TempDir::new().unwrap();
        let result = JournalcastService::from_config(config(&dir));
        assert!(matches!(
            result,
            Err(JournalcastError::Service(ServiceError::NotConfigured(_)))
        ));
    }

    #[tokio::test]
    async fn test_remind_requires_email_config() {
        let dir = TempDir::new().unwrap();
        let service = JournalcastService::with_parts(
            config(&dir),
            Arc::new(MemorySource::default()),
            Arc::new(MockLauncher::default()),
        )
        .unwrap();

        let err = service
            .remind(NaiveDate::from_ymd_opt(2026, 10, 16).unwrap())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("[email]"));
    }

    #[tokio::test]
    async fn test_publish_without_entry_is_empty_run() {
        let dir = TempDir::new().unwrap();
        let launcher = Arc::new(MockLauncher::default());
        let service = JournalcastService::with_parts(
            config(&dir),
            Arc::new(MemorySource::default()),
            launcher.clone(),
        )
        .unwrap();

        let report = service.publish(None).await.unwrap();
        assert!(!report.attempted());
        assert_eq!(report.policy, PublishPolicy::All);
        assert_eq!(launcher.launch_count(), 0);
        assert!(service.preview().await.unwrap().is_none());
    }
}
