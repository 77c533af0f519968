//! Publish orchestration
//!
//! One run: fetch today's Ready entry, build a draft per configured platform,
//! run each platform's flow in turn, then apply the publish policy and push at
//! most one status update back to the source.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::browser::BrowserLauncher;
use crate::driver::DriverTimings;
use crate::error::Result;
use crate::media::MediaResolver;
use crate::platforms::{run_flow, PublishAdapter};
use crate::source::{today, ContentSource};
use crate::transform::TextTransformer;
use crate::types::{
    EntryStatus, FlowState, OutcomeStatus, PlatformKind, PublishOutcome, PublishPolicy,
};

/// Summary of one orchestration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub record_id: Option<String>,
    pub title: Option<String>,
    pub policy: PublishPolicy,
    pub outcomes: Vec<PublishOutcome>,
    pub status_updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_error: Option<String>,
}

impl RunReport {
    fn empty(run_id: Uuid, policy: PublishPolicy) -> Self {
        Self {
            run_id,
            record_id: None,
            title: None,
            policy,
            outcomes: Vec::new(),
            status_updated: false,
            status_error: None,
        }
    }

    /// Whether an entry was found and platforms were attempted
    pub fn attempted(&self) -> bool {
        self.record_id.is_some()
    }

    /// Whether the outcomes satisfy the run's policy
    pub fn policy_satisfied(&self) -> bool {
        self.policy.is_satisfied(&self.outcomes)
    }

    pub fn render_text(&self) -> String {
        let Some(record_id) = &self.record_id else {
            return "No journal entry ready for today".to_string();
        };

        let mut lines = vec![format!(
            "Entry {} \"{}\"",
            record_id,
            self.title.as_deref().unwrap_or_default()
        )];
        for outcome in &self.outcomes {
            let status = match outcome.status {
                OutcomeStatus::Success => "ok",
                OutcomeStatus::Failure => "failed",
                OutcomeStatus::Unconfirmed => "unconfirmed",
            };
            let mut line = format!(
                "  {:<8} {:<12} {}",
                outcome.platform.as_str(),
                status,
                outcome.detail
            );
            if let Some(path) = &outcome.artifact_path {
                line.push_str(&format!(" (screenshot: {})", path.display()));
            }
            lines.push(line);
        }
        let status_line = match (&self.status_error, self.status_updated) {
            (Some(e), _) => format!("Status update failed: {}", e),
            (None, true) => "Marked as Published".to_string(),
            (None, false) => format!("Status left unchanged (policy: {})", self.policy),
        };
        lines.push(status_line);
        lines.join("\n")
    }

    pub fn render_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| crate::error::JournalcastError::InvalidInput(e.to_string()))
    }
}

/// Draft content as it would be posted, for dry runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftPreview {
    pub platform: PlatformKind,
    pub title: String,
    pub body: String,
    pub segments: Vec<String>,
    pub media: Option<String>,
}

pub struct Orchestrator {
    source: Arc<dyn ContentSource>,
    transformer: Arc<dyn TextTransformer>,
    launcher: Arc<dyn BrowserLauncher>,
    media: MediaResolver,
    adapters: Vec<Box<dyn PublishAdapter>>,
    timings: DriverTimings,
    artifacts_dir: PathBuf,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn ContentSource>,
        transformer: Arc<dyn TextTransformer>,
        launcher: Arc<dyn BrowserLauncher>,
        media: MediaResolver,
        adapters: Vec<Box<dyn PublishAdapter>>,
        artifacts_dir: PathBuf,
    ) -> Self {
        Self {
            source,
            transformer,
            launcher,
            media,
            adapters,
            timings: DriverTimings::default(),
            artifacts_dir,
        }
    }

    pub fn with_timings(mut self, timings: DriverTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn platforms(&self) -> Vec<PlatformKind> {
        self.adapters.iter().map(|a| a.kind()).collect()
    }

    /// Run once under `policy`
    ///
    /// No entry for today is a normal, empty run.
    ///
    /// # Errors
    ///
    /// Fatal errors abort the run on the spot: no further platform is
    /// attempted and the entry status is left alone. Errors reading the
    /// source are returned as well.
    pub async fn run(&self, policy: PublishPolicy) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let Some(record) = self.source.fetch_ready(today()).await? else {
            info!(run_id = %run_id, "No journal entry ready for today");
            return Ok(RunReport::empty(run_id, policy));
        };
        info!(run_id = %run_id, id = %record.id, title = %record.title, "Publishing journal entry");

        let mut outcomes = Vec::with_capacity(self.adapters.len());
        for adapter in &self.adapters {
            let platform = adapter.kind();

            let draft = match adapter
                .prepare(&record, self.transformer.as_ref(), &self.media)
                .await
            {
                Ok(draft) => draft,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!(platform = %platform, error = %e, "Could not prepare draft");
                    outcomes.push(PublishOutcome {
                        platform,
                        status: OutcomeStatus::Failure,
                        detail: e.to_string(),
                        reached: FlowState::Init,
                        artifact_path: None,
                    });
                    continue;
                }
            };

            // The draft owns any downloaded media; leaving this scope on any
            // path removes it.
            let outcome = run_flow(
                adapter.as_ref(),
                self.launcher.as_ref(),
                &draft,
                self.timings,
                &self.artifacts_dir,
            )
            .await?;
            if let Some(media) = draft.media {
                media.cleanup();
            }

            info!(platform = %platform, status = ?outcome.status, detail = %outcome.detail, "Platform attempt finished");
            outcomes.push(outcome);
        }

        let mut report = RunReport {
            run_id,
            record_id: Some(record.id.clone()),
            title: Some(record.title.clone()),
            policy,
            outcomes,
            status_updated: false,
            status_error: None,
        };

        if report.policy_satisfied() {
            match self
                .source
                .update_status(&record.id, EntryStatus::Published)
                .await
            {
                Ok(()) => report.status_updated = true,
                Err(e) => {
                    error!(id = %record.id, error = %e, "Failed to mark entry as published");
                    report.status_error = Some(e.to_string());
                }
            }
        } else {
            warn!(id = %record.id, policy = %policy, "Publish policy not met, status unchanged");
        }

        Ok(report)
    }

    /// Build every draft without touching a browser or the entry status
    pub async fn preview(&self) -> Result<Option<Vec<DraftPreview>>> {
        let Some(record) = self.source.fetch_ready(today()).await? else {
            return Ok(None);
        };

        let mut previews = Vec::with_capacity(self.adapters.len());
        for adapter in &self.adapters {
            let draft = adapter
                .prepare(&record, self.transformer.as_ref(), &self.media)
                .await?;
            previews.push(DraftPreview {
                platform: draft.platform,
                title: draft.title.clone(),
                body: draft.body.clone(),
                segments: draft.segments.clone(),
                media: draft.media.as_ref().map(|m| m.source_ref.clone()),
            });
        }
        Ok(Some(previews))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(platform: PlatformKind, status: OutcomeStatus) -> PublishOutcome {
        PublishOutcome {
            platform,
            status,
            detail: "detail".to_string(),
            reached: FlowState::Submitted,
            artifact_path: None,
        }
    }

    #[test]
    fn test_render_empty_report() {
        let report = RunReport::empty(Uuid::new_v4(), PublishPolicy::All);
        assert!(!report.attempted());
        assert_eq!(report.render_text(), "No journal entry ready for today");
    }

    #[test]
    fn test_render_report_lines() {
        let mut failed = outcome(PlatformKind::Rednote, OutcomeStatus::Unconfirmed);
        failed.artifact_path = Some(PathBuf::from("build/debug-rednote-unconfirmed.png"));
        let report = RunReport {
            run_id: Uuid::new_v4(),
            record_id: Some("r1".to_string()),
            title: Some("Day One".to_string()),
            policy: PublishPolicy::All,
            outcomes: vec![outcome(PlatformKind::X, OutcomeStatus::Success), failed],
            status_updated: false,
            status_error: None,
        };

        let text = report.render_text();
        assert!(text.starts_with("Entry r1 \"Day One\""));
        assert!(text.contains("x        ok"));
        assert!(text.contains("screenshot: build/debug-rednote-unconfirmed.png"));
        assert!(text.ends_with("Status left unchanged (policy: all)"));
        assert!(!report.policy_satisfied());
    }

    #[test]
    fn test_render_json() {
        let report = RunReport::empty(Uuid::new_v4(), PublishPolicy::Any);
        let json: serde_json::Value = serde_json::from_str(&report.render_json().unwrap()).unwrap();
        assert_eq!(json["policy"], "any");
        assert_eq!(json["status_updated"], false);
        assert!(json.get("status_error").is_none());
    }
}
