//! The publish state machine
//!
//! `Init → SessionVerified → PopupsClear → ModeSelected → MediaUploaded →
//! FieldsFilled → Submitted → {Success | Failure | Unconfirmed}`
//!
//! One call drives one attempt on one platform inside its own browser
//! session. Step failures end the attempt and come back as a
//! [`PublishOutcome`]; only fatal errors (see
//! [`JournalcastError::is_fatal`]) are returned as `Err`. Every non-success
//! ending leaves a screenshot behind.

use std::path::Path;

use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::browser::BrowserLauncher;
use crate::credentials::CredentialSnapshot;
use crate::driver::{Detected, DriverTimings, UiDriver};
use crate::error::{DriverError, JournalcastError, MediaError, Result};
use crate::platforms::PublishAdapter;
use crate::types::{FlowState, OutcomeStatus, PlatformKind, PostDraft, PublishOutcome};

fn advance(state: &mut FlowState, next: FlowState, platform: PlatformKind) {
    info!(platform = %platform, state = %next, "Flow transition");
    *state = next;
}

async fn drive(
    adapter: &dyn PublishAdapter,
    driver: &UiDriver<'_>,
    snapshot: &CredentialSnapshot,
    draft: &PostDraft,
    state: &mut FlowState,
) -> Result<Detected> {
    let platform = adapter.kind();
    let profile = adapter.profile();
    let page = driver.page();

    snapshot.apply(page, &profile.publish_url).await?;
    // Client-side redirects to the login page happen after load.
    sleep(driver.timings().probe).await;
    let landed = page.current_url().await?;
    profile.login.verify_still_valid(&landed)?;
    advance(state, FlowState::SessionVerified, platform);

    driver.dismiss_overlay(&profile.popups).await;
    advance(state, FlowState::PopupsClear, platform);

    if !profile.mode.is_empty() {
        if let Err(e) = driver.click_named_control(&profile.mode).await {
            warn!(platform = %platform, error = %e, "Mode selector not found, continuing");
        }
    }
    advance(state, FlowState::ModeSelected, platform);

    if profile.requires_media {
        let media = draft.media.as_ref().ok_or_else(|| {
            MediaError::Missing(format!("{} requires an image", platform))
        })?;
        driver
            .upload_file(&profile.file_inputs, media.path())
            .await?;
        let signal = driver
            .wait_for_upload_complete(&profile.progress, &profile.preview)
            .await;
        info!(platform = %platform, signal = ?signal, "Upload settled");
        advance(state, FlowState::MediaUploaded, platform);
    }

    adapter.fill_fields(driver, draft).await?;
    advance(state, FlowState::FieldsFilled, platform);

    driver
        .click_named_control(&profile.submit)
        .await
        .map_err(|e| match e {
            JournalcastError::Driver(DriverError::ControlNotFound(detail)) => {
                DriverError::SubmitControlNotFound(detail).into()
            }
            other => other,
        })?;
    advance(state, FlowState::Submitted, platform);

    let success: Vec<&str> = profile.success_phrases.iter().map(String::as_str).collect();
    let failure: Vec<&str> = profile.failure_phrases.iter().map(String::as_str).collect();
    Ok(driver
        .detect_outcome(&success, &failure, profile.publish_marker.as_deref())
        .await)
}

async fn conclude(
    driver: &UiDriver<'_>,
    platform: PlatformKind,
    reached: FlowState,
    result: Result<Detected>,
    artifacts_dir: &Path,
) -> Result<PublishOutcome> {
    let outcome = |status, detail: String, reached, artifact_path| PublishOutcome {
        platform,
        status,
        detail,
        reached,
        artifact_path,
    };

    match result {
        Ok(Detected::Success(phrase)) => {
            info!(platform = %platform, signal = %phrase, "Post confirmed");
            Ok(outcome(OutcomeStatus::Success, phrase, FlowState::Success, None))
        }
        Ok(Detected::Navigated) => {
            info!(platform = %platform, "Post confirmed by navigation");
            Ok(outcome(
                OutcomeStatus::Success,
                "navigated".to_string(),
                FlowState::Success,
                None,
            ))
        }
        Ok(Detected::Failure(phrase)) => {
            let artifact = driver.capture_artifact(artifacts_dir, platform, "failure").await;
            let detail = DriverError::Rejected(phrase).to_string();
            error!(platform = %platform, detail = %detail, screenshot = ?artifact, "Publish failed");
            Ok(outcome(OutcomeStatus::Failure, detail, FlowState::Failure, artifact))
        }
        Ok(Detected::Ambiguous) => {
            let artifact = driver
                .capture_artifact(artifacts_dir, platform, "unconfirmed")
                .await;
            warn!(platform = %platform, screenshot = ?artifact, "No success or failure signal after submit");
            Ok(outcome(
                OutcomeStatus::Unconfirmed,
                "no confirmation observed".to_string(),
                FlowState::Unconfirmed,
                artifact,
            ))
        }
        Err(e) => {
            let phase = format!("error-{}", reached);
            let artifact = driver.capture_artifact(artifacts_dir, platform, &phase).await;
            if e.is_fatal() {
                error!(platform = %platform, state = %reached, error = %e, "Fatal error, aborting run");
                return Err(e);
            }
            error!(platform = %platform, state = %reached, error = %e, screenshot = ?artifact, "Publish attempt failed");
            Ok(outcome(OutcomeStatus::Failure, e.to_string(), reached, artifact))
        }
    }
}

/// Run one publish attempt in a fresh browser session
///
/// # Errors
///
/// Only fatal errors: missing or corrupt credentials (raised before the
/// browser starts), an expired session, or a browser that will not launch.
pub async fn run_flow(
    adapter: &dyn PublishAdapter,
    launcher: &dyn BrowserLauncher,
    draft: &PostDraft,
    timings: DriverTimings,
    artifacts_dir: &Path,
) -> Result<PublishOutcome> {
    let platform = adapter.kind();
    let snapshot = adapter.credentials().load()?;

    let mut page = launcher.launch().await?;
    let mut state = FlowState::Init;
    info!(platform = %platform, state = %state, "Starting publish flow");

    let result = {
        let driver = UiDriver::new(page.as_ref(), timings);
        let result = drive(adapter, &driver, &snapshot, draft, &mut state).await;
        conclude(&driver, platform, state, result, artifacts_dir).await
    };

    if let Err(e) = page.close().await {
        warn!(platform = %platform, error = %e, "Failed to close browser");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    use crate::browser::mock::{MockLauncher, MockPage, Reaction};
    use crate::browser::Locator;
    use crate::credentials::{CredentialStore, LoginSurface};
    use crate::driver::{Dismissal, TextEntry};
    use crate::error::SessionError;
    use crate::media::MediaResolver;
    use crate::platforms::FlowProfile;
    use crate::transform::TextTransformer;
    use crate::types::JournalRecord;

    const URL: &str = "https://notes.example/publish";

    struct TestAdapter {
        profile: FlowProfile,
        store: CredentialStore,
    }

    #[async_trait]
    impl PublishAdapter for TestAdapter {
        fn kind(&self) -> PlatformKind {
            PlatformKind::X
        }

        fn profile(&self) -> &FlowProfile {
            &self.profile
        }

        fn credentials(&self) -> &CredentialStore {
            &self.store
        }

        async fn prepare(
            &self,
            record: &JournalRecord,
            _transformer: &dyn TextTransformer,
            _media: &MediaResolver,
        ) -> Result<PostDraft> {
            Ok(draft(&record.body))
        }

        async fn fill_fields(&self, driver: &UiDriver<'_>, draft: &PostDraft) -> Result<()> {
            driver
                .fill_labelled_field(&[Locator::placeholder("Title")], &draft.title, TextEntry::Plain)
                .await?;
            Ok(())
        }
    }

    fn draft(body: &str) -> PostDraft {
        PostDraft {
            platform: PlatformKind::X,
            title: "Day One".to_string(),
            body: body.to_string(),
            segments: vec![],
            media: None,
        }
    }

    fn adapter(dir: &TempDir, with_credentials: bool) -> TestAdapter {
        let store = CredentialStore::new(dir.path().join("auth.json"));
        if with_credentials {
            store
                .save(&CredentialSnapshot {
                    cookies: vec![],
                    local_storage: BTreeMap::new(),
                    saved_at: Utc::now(),
                })
                .unwrap();
        }
        TestAdapter {
            profile: FlowProfile {
                publish_url: URL.to_string(),
                login: LoginSurface::new(&["login"]),
                popups: vec![Dismissal::click(Locator::text("Got it"))],
                mode: vec![Locator::text("Text")],
                requires_media: false,
                file_inputs: vec![],
                progress: vec![],
                preview: vec![],
                submit: vec![Locator::button("Publish")],
                success_phrases: vec!["Published".to_string()],
                failure_phrases: vec!["Rejected".to_string()],
                publish_marker: None,
            },
            store,
        }
    }

    fn ready_page() -> MockPage {
        MockPage::new("about:blank")
            .with_visible(Locator::placeholder("Title"))
            .with_visible(Locator::button("Publish"))
    }

    #[tokio::test]
    async fn test_missing_credentials_before_launch() {
        let dir = TempDir::new().unwrap();
        let page = ready_page();
        let launcher = MockLauncher::new(vec![page.clone()]);

        let err = run_flow(
            &adapter(&dir, false),
            &launcher,
            &draft("b"),
            DriverTimings::fast(),
            dir.path(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            JournalcastError::Session(SessionError::CredentialsMissing(_))
        ));
        assert_eq!(launcher.launch_count(), 0);
        assert!(page.events().is_empty());
    }

    #[tokio::test]
    async fn test_success_path_walks_all_states() {
        let dir = TempDir::new().unwrap();
        let page = ready_page().on_click(
            Locator::button("Publish"),
            Reaction::show(&[Locator::text("Published")]),
        );
        let launcher = MockLauncher::new(vec![page.clone()]);

        let outcome = run_flow(
            &adapter(&dir, true),
            &launcher,
            &draft("b"),
            DriverTimings::fast(),
            dir.path(),
        )
        .await
        .unwrap();

        assert!(outcome.succeeded());
        assert_eq!(outcome.reached, FlowState::Success);
        assert_eq!(outcome.detail, "Published");
        assert!(outcome.artifact_path.is_none());
        assert!(page.screenshots().is_empty());
        assert!(page.is_closed());
        assert_eq!(
            page.filled(),
            vec![(Locator::placeholder("Title"), "Day One".to_string())]
        );
    }

    #[tokio::test]
    async fn test_session_expired_is_fatal_and_closes() {
        let dir = TempDir::new().unwrap();
        let page = ready_page().with_redirect(URL, "https://notes.example/login");
        let launcher = MockLauncher::new(vec![page.clone()]);

        let err = run_flow(
            &adapter(&dir, true),
            &launcher,
            &draft("b"),
            DriverTimings::fast(),
            dir.path(),
        )
        .await
        .unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(page.screenshots().len(), 1);
        assert!(page.clicks().is_empty());
        assert!(page.is_closed());
    }

    #[tokio::test]
    async fn test_failure_phrase_captures_screenshot() {
        let dir = TempDir::new().unwrap();
        let page = ready_page().on_click(
            Locator::button("Publish"),
            Reaction::show(&[Locator::text("Rejected")]),
        );
        let launcher = MockLauncher::new(vec![page.clone()]);

        let outcome = run_flow(
            &adapter(&dir, true),
            &launcher,
            &draft("b"),
            DriverTimings::fast(),
            dir.path(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Failure);
        assert_eq!(outcome.reached, FlowState::Failure);
        assert!(outcome.detail.contains("Rejected"));
        assert!(outcome.artifact_path.as_ref().unwrap().exists());
    }

    #[tokio::test]
    async fn test_no_signal_is_unconfirmed() {
        let dir = TempDir::new().unwrap();
        let page = ready_page();
        let launcher = MockLauncher::new(vec![page.clone()]);

        let outcome = run_flow(
            &adapter(&dir, true),
            &launcher,
            &draft("b"),
            DriverTimings::fast(),
            dir.path(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Unconfirmed);
        assert!(outcome.artifact_path.is_some());
        assert!(page.is_closed());
    }

    #[tokio::test]
    async fn test_missing_submit_is_attempt_failure() {
        let dir = TempDir::new().unwrap();
        let page = MockPage::new("about:blank").with_visible(Locator::placeholder("Title"));
        let launcher = MockLauncher::new(vec![page.clone()]);

        let outcome = run_flow(
            &adapter(&dir, true),
            &launcher,
            &draft("b"),
            DriverTimings::fast(),
            dir.path(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Failure);
        assert_eq!(outcome.reached, FlowState::FieldsFilled);
        assert!(outcome.detail.contains("Submit control not found"));
        assert!(outcome.artifact_path.is_some());
    }

    #[tokio::test]
    async fn test_missing_required_field() {
        let dir = TempDir::new().unwrap();
        let page = MockPage::new("about:blank").with_visible(Locator::button("Publish"));
        let launcher = MockLauncher::new(vec![page.clone()]);

        let outcome = run_flow(
            &adapter(&dir, true),
            &launcher,
            &draft("b"),
            DriverTimings::fast(),
            dir.path(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.reached, FlowState::ModeSelected);
        assert!(outcome.detail.contains("Field not found"));
        assert!(page.clicks().is_empty());
    }

    #[tokio::test]
    async fn test_media_required_but_absent() {
        let dir = TempDir::new().unwrap();
        let mut adapter = adapter(&dir, true);
        adapter.profile.requires_media = true;
        let page = ready_page();
        let launcher = MockLauncher::new(vec![page.clone()]);

        let outcome = run_flow(&adapter, &launcher, &draft("b"), DriverTimings::fast(), dir.path())
            .await
            .unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Failure);
        assert_eq!(outcome.reached, FlowState::ModeSelected);
        assert!(page.filled().is_empty());
    }

    #[tokio::test]
    async fn test_launch_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = run_flow(
            &adapter(&dir, true),
            &MockLauncher::failing(),
            &draft("b"),
            DriverTimings::fast(),
            dir.path(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, JournalcastError::BrowserLaunch(_)));
    }
}
