//! UI automation driver
//!
//! Timeout-bounded primitives over one [`BrowserPage`]. Every primitive takes
//! a prioritized list of [`Locator`] candidates. Candidates are polled
//! together until the step's budget runs out and the highest-priority one
//! that resolves wins, so a strategy that no longer matches costs nothing
//! beyond the poll interval.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::browser::{describe, BrowserPage, Locator};
use crate::error::{DriverError, Result};
use crate::types::PlatformKind;

/// Step budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverTimings {
    /// Window for conditional elements such as popups
    pub probe: Duration,
    pub field: Duration,
    /// Window for fields a flow can publish without
    pub optional_field: Duration,
    pub control: Duration,
    /// How long an observed progress indicator may stay up
    pub upload_hidden: Duration,
    pub preview: Duration,
    /// Fixed wait when the upload gives no usable signal
    pub fallback: Duration,
    pub outcome: Duration,
    pub poll: Duration,
}

impl Default for DriverTimings {
    fn default() -> Self {
        Self {
            probe: Duration::from_secs(2),
            field: Duration::from_secs(15),
            optional_field: Duration::from_secs(12),
            control: Duration::from_secs(10),
            upload_hidden: Duration::from_secs(120),
            preview: Duration::from_secs(60),
            fallback: Duration::from_secs(10),
            outcome: Duration::from_secs(15),
            poll: Duration::from_millis(250),
        }
    }
}

impl DriverTimings {
    /// Millisecond budgets for scripted pages
    pub fn fast() -> Self {
        Self {
            probe: Duration::from_millis(20),
            field: Duration::from_millis(100),
            optional_field: Duration::from_millis(150),
            control: Duration::from_millis(100),
            upload_hidden: Duration::from_millis(100),
            preview: Duration::from_millis(100),
            fallback: Duration::from_millis(10),
            outcome: Duration::from_millis(100),
            poll: Duration::from_millis(5),
        }
    }
}

/// One way to get rid of an overlay
#[derive(Debug, Clone, PartialEq)]
pub enum Dismissal {
    /// Click the element itself ("got it" buttons)
    Click(Locator),
    /// When the locator shows, click a blank point of the page
    ClickAway { when: Locator, x: f64, y: f64 },
    /// Press a key a number of times, unconditionally
    Key { key: String, times: usize },
}

impl Dismissal {
    pub fn click(locator: Locator) -> Self {
        Dismissal::Click(locator)
    }

    pub fn click_away(when: Locator, x: f64, y: f64) -> Self {
        Dismissal::ClickAway { when, x, y }
    }

    pub fn key(key: &str, times: usize) -> Self {
        Dismissal::Key {
            key: key.to_string(),
            times,
        }
    }
}

/// How text gets into a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEntry {
    /// Replace the value of a plain input in one go
    Plain,
    /// Click, then type character by character (rich-text editors)
    Typed(Duration),
}

/// Which signal ended the upload wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadSignal {
    PreviewVisible,
    ProgressCleared,
    FallbackDelay,
}

/// What the page said after submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detected {
    Failure(String),
    Success(String),
    Navigated,
    Ambiguous,
}

pub struct UiDriver<'a> {
    page: &'a dyn BrowserPage,
    timings: DriverTimings,
}

impl<'a> UiDriver<'a> {
    pub fn new(page: &'a dyn BrowserPage, timings: DriverTimings) -> Self {
        Self { page, timings }
    }

    pub fn page(&self) -> &'a dyn BrowserPage {
        self.page
    }

    pub fn timings(&self) -> &DriverTimings {
        &self.timings
    }

    async fn visible(&self, locator: &Locator) -> bool {
        match self.page.is_visible(locator).await {
            Ok(visible) => visible,
            Err(e) => {
                debug!(locator = %locator, error = %e, "Visibility probe failed");
                false
            }
        }
    }

    async fn present(&self, locator: &Locator) -> bool {
        match self.page.exists(locator).await {
            Ok(present) => present,
            Err(e) => {
                debug!(locator = %locator, error = %e, "Presence probe failed");
                false
            }
        }
    }

    /// First candidate, in priority order, that becomes visible within `budget`
    pub async fn find_visible(&self, candidates: &[Locator], budget: Duration) -> Option<Locator> {
        let deadline = Instant::now() + budget;
        loop {
            for candidate in candidates {
                if self.visible(candidate).await {
                    return Some(candidate.clone());
                }
            }
            if Instant::now() >= deadline {
                debug!(candidates = %describe(candidates), "No candidate became visible");
                return None;
            }
            sleep(self.timings.poll).await;
        }
    }

    async fn find_present(&self, candidates: &[Locator], budget: Duration) -> Option<Locator> {
        let deadline = Instant::now() + budget;
        loop {
            for candidate in candidates {
                if self.present(candidate).await {
                    return Some(candidate.clone());
                }
            }
            if Instant::now() >= deadline {
                return None;
            }
            sleep(self.timings.poll).await;
        }
    }

    /// Clear conditional overlays. Absence is normal; this never fails.
    ///
    /// Returns how many dismissals fired.
    pub async fn dismiss_overlay(&self, candidates: &[Dismissal]) -> usize {
        let mut fired = 0;
        for dismissal in candidates {
            match dismissal {
                Dismissal::Click(locator) => {
                    let Some(found) = self
                        .find_visible(std::slice::from_ref(locator), self.timings.probe)
                        .await
                    else {
                        continue;
                    };
                    match self.page.click(&found).await {
                        Ok(()) => {
                            info!(overlay = %found, "Dismissed overlay");
                            fired += 1;
                        }
                        Err(e) => debug!(overlay = %found, error = %e, "Overlay click failed"),
                    }
                }
                Dismissal::ClickAway { when, x, y } => {
                    if self
                        .find_visible(std::slice::from_ref(when), self.timings.probe)
                        .await
                        .is_none()
                    {
                        continue;
                    }
                    match self.page.click_at(*x, *y).await {
                        Ok(()) => {
                            info!(overlay = %when, "Dismissed overlay by clicking away");
                            fired += 1;
                        }
                        Err(e) => debug!(overlay = %when, error = %e, "Click-away failed"),
                    }
                }
                Dismissal::Key { key, times } => {
                    let mut pressed = 0;
                    for _ in 0..*times {
                        if let Err(e) = self.page.press_key(key).await {
                            debug!(key = %key, error = %e, "Key press failed");
                            break;
                        }
                        pressed += 1;
                        sleep(self.timings.poll).await;
                    }
                    if pressed > 0 {
                        fired += 1;
                    }
                }
            }
        }
        fired
    }

    /// Hand a local file to the first matching file input (hidden inputs count)
    pub async fn upload_file(&self, inputs: &[Locator], path: &Path) -> Result<Locator> {
        let input = self
            .find_present(inputs, self.timings.field)
            .await
            .ok_or_else(|| DriverError::UploadTargetNotFound(describe(inputs)))?;

        self.page
            .set_input_files(&input, path)
            .await
            .map_err(|e| DriverError::UploadTargetNotFound(format!("{}: {}", input, e)))?;
        info!(input = %input, file = %path.display(), "File handed to upload input");
        Ok(input)
    }

    /// Best-effort wait for an upload to settle. Never fails.
    ///
    /// A preview appearing ends the wait at once. A progress indicator only
    /// counts once it has been seen and then disappears. Without either
    /// signal the wait ends with a fixed delay.
    pub async fn wait_for_upload_complete(
        &self,
        progress: &[Locator],
        preview: &[Locator],
    ) -> UploadSignal {
        let start = Instant::now();
        let mut progress_seen = false;

        loop {
            for candidate in preview {
                if self.visible(candidate).await {
                    info!(preview = %candidate, "Upload preview visible");
                    return UploadSignal::PreviewVisible;
                }
            }

            let mut progress_up = false;
            for candidate in progress {
                if self.visible(candidate).await {
                    progress_up = true;
                    break;
                }
            }
            if progress_up {
                progress_seen = true;
            } else if progress_seen {
                info!("Upload progress indicator cleared");
                return UploadSignal::ProgressCleared;
            }

            let budget = if progress_seen {
                self.timings.upload_hidden
            } else {
                self.timings.preview
            };
            if start.elapsed() >= budget {
                break;
            }
            sleep(self.timings.poll).await;
        }

        warn!(
            delay = ?self.timings.fallback,
            "No upload completion signal, waiting a fixed delay"
        );
        sleep(self.timings.fallback).await;
        UploadSignal::FallbackDelay
    }

    /// Put text into the first matching field
    pub async fn fill_labelled_field(
        &self,
        candidates: &[Locator],
        text: &str,
        entry: TextEntry,
    ) -> Result<Locator> {
        self.fill_within(candidates, text, entry, self.timings.field)
            .await
    }

    /// Same as [`fill_labelled_field`](Self::fill_labelled_field) with an explicit budget
    pub async fn fill_within(
        &self,
        candidates: &[Locator],
        text: &str,
        entry: TextEntry,
        budget: Duration,
    ) -> Result<Locator> {
        let field = self
            .find_visible(candidates, budget)
            .await
            .ok_or_else(|| DriverError::FieldNotFound(describe(candidates)))?;

        match entry {
            TextEntry::Plain => self.page.fill(&field, text).await?,
            TextEntry::Typed(delay) => {
                self.page.click(&field).await?;
                self.page.type_text(text, delay).await?;
            }
        }
        debug!(field = %field, chars = text.chars().count(), "Filled field");
        Ok(field)
    }

    /// Click a control by name, trying each candidate
    pub async fn click_named_control(&self, candidates: &[Locator]) -> Result<Locator> {
        let control = self
            .find_visible(candidates, self.timings.control)
            .await
            .ok_or_else(|| DriverError::ControlNotFound(describe(candidates)))?;
        self.page.click(&control).await?;
        debug!(control = %control, "Clicked control");
        Ok(control)
    }

    /// Classify the page after submission
    ///
    /// Each poll checks failure phrases first, then success phrases, then
    /// whether the page left the URL containing `publish_marker`.
    pub async fn detect_outcome(
        &self,
        success: &[&str],
        failure: &[&str],
        publish_marker: Option<&str>,
    ) -> Detected {
        let deadline = Instant::now() + self.timings.outcome;
        loop {
            for phrase in failure {
                if self.visible(&Locator::text(phrase)).await {
                    return Detected::Failure(phrase.to_string());
                }
            }
            for phrase in success {
                if self.visible(&Locator::text(phrase)).await {
                    return Detected::Success(phrase.to_string());
                }
            }
            if let Some(marker) = publish_marker {
                match self.page.current_url().await {
                    Ok(url) if !url.contains(marker) => {
                        debug!(url = %url, "Left the publish page");
                        return Detected::Navigated;
                    }
                    Ok(_) => {}
                    Err(e) => debug!(error = %e, "Could not read URL"),
                }
            }
            if Instant::now() >= deadline {
                return Detected::Ambiguous;
            }
            sleep(self.timings.poll).await;
        }
    }

    /// Save a screenshot named after the platform and phase. Never fails.
    pub async fn capture_artifact(
        &self,
        dir: &Path,
        platform: PlatformKind,
        phase: &str,
    ) -> Option<PathBuf> {
        let path = artifact_path(dir, platform, phase);
        match self.page.screenshot(&path).await {
            Ok(()) => {
                info!(path = %path.display(), "Saved diagnostic screenshot");
                Some(path)
            }
            Err(e) => {
                warn!(phase, error = %e, "Could not capture screenshot");
                None
            }
        }
    }
}

fn artifact_path(dir: &Path, platform: PlatformKind, phase: &str) -> PathBuf {
    dir.join(format!(
        "debug-{}-{}-{}.png",
        platform,
        phase,
        Utc::now().format("%Y%m%dT%H%M%S%3f")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::{MockPage, Reaction};
    use crate::error::JournalcastError;

    fn driver(page: &MockPage) -> UiDriver<'_> {
        UiDriver::new(page, DriverTimings::fast())
    }

    #[tokio::test]
    async fn test_find_visible_prefers_priority_order() {
        let first = Locator::css(".a");
        let second = Locator::css(".b");
        let page = MockPage::new("about:blank")
            .with_visible(first.clone())
            .with_visible(second.clone());

        let found = driver(&page)
            .find_visible(&[first.clone(), second], Duration::from_millis(10))
            .await;
        assert_eq!(found, Some(first));
    }

    #[tokio::test]
    async fn test_find_visible_waits_for_late_element() {
        let late = Locator::text("发布");
        let page = MockPage::new("about:blank");
        let handle = page.clone();
        let shown = late.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            handle.react(&Reaction::show(&[shown]));
        });

        let found = driver(&page)
            .find_visible(&[late.clone()], Duration::from_millis(500))
            .await;
        assert_eq!(found, Some(late));
    }

    #[tokio::test]
    async fn test_dismiss_overlay_tolerates_absence() {
        let page = MockPage::new("about:blank");
        let fired = driver(&page)
            .dismiss_overlay(&[
                Dismissal::click(Locator::text("我知道了")),
                Dismissal::click_away(Locator::text("试试文字配图吧"), 50.0, 50.0),
            ])
            .await;
        assert_eq!(fired, 0);
        assert!(page.events().is_empty());
    }

    #[tokio::test]
    async fn test_dismiss_overlay_clicks_and_keys() {
        let got_it = Locator::text("我知道了");
        let hint = Locator::text("试试文字配图吧");
        let page = MockPage::new("about:blank")
            .with_visible(got_it.clone())
            .with_visible(hint.clone())
            .on_click(got_it.clone(), Reaction::hide(&[got_it.clone()]));

        let fired = driver(&page)
            .dismiss_overlay(&[
                Dismissal::click(got_it.clone()),
                Dismissal::click_away(hint, 50.0, 50.0),
                Dismissal::key("Escape", 3),
            ])
            .await;

        assert_eq!(fired, 3);
        assert_eq!(page.clicks(), vec![got_it]);
        assert_eq!(page.keys(), vec!["Escape", "Escape", "Escape"]);
        assert!(page.events().contains(&"click_at 50,50".to_string()));
    }

    #[tokio::test]
    async fn test_failed_key_dismissal_not_counted() {
        let page = MockPage::new("about:blank").with_dead_key("Escape");
        let fired = driver(&page)
            .dismiss_overlay(&[Dismissal::key("Escape", 3), Dismissal::key("Tab", 1)])
            .await;

        assert_eq!(fired, 1);
        assert_eq!(page.keys(), vec!["Tab"]);
        // Gave up after the first failed press
        assert_eq!(page.events(), vec!["key Escape", "key Tab"]);
    }

    #[tokio::test]
    async fn test_upload_file_uses_hidden_input() {
        let input = Locator::css("input[type=\"file\"]");
        let page = MockPage::new("about:blank").with_present(input.clone());

        let used = driver(&page)
            .upload_file(&[input.clone()], Path::new("/tmp/cover.jpg"))
            .await
            .unwrap();
        assert_eq!(used, input);
        assert_eq!(page.uploads(), vec![PathBuf::from("/tmp/cover.jpg")]);
    }

    #[tokio::test]
    async fn test_upload_file_without_input() {
        let page = MockPage::new("about:blank");
        let err = driver(&page)
            .upload_file(&[Locator::css("input[type=\"file\"]")], Path::new("/tmp/a.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            JournalcastError::Driver(DriverError::UploadTargetNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_wait_for_upload_preview() {
        let preview = Locator::css("img[src*=\"xhscdn\"]");
        let page = MockPage::new("about:blank").with_visible(preview.clone());
        let signal = driver(&page)
            .wait_for_upload_complete(&[Locator::css("[class*=\"uploading\"]")], &[preview])
            .await;
        assert_eq!(signal, UploadSignal::PreviewVisible);
    }

    #[tokio::test]
    async fn test_wait_for_upload_progress_clears() {
        let progress = Locator::css("[class*=\"uploading\"]");
        let page = MockPage::new("about:blank").with_visible(progress.clone());
        let handle = page.clone();
        let hidden = progress.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            handle.react(&Reaction::hide(&[hidden]));
        });

        let signal = driver(&page)
            .wait_for_upload_complete(&[progress], &[Locator::css(".preview img")])
            .await;
        assert_eq!(signal, UploadSignal::ProgressCleared);
    }

    #[tokio::test]
    async fn test_wait_for_upload_falls_back() {
        let page = MockPage::new("about:blank");
        let signal = driver(&page)
            .wait_for_upload_complete(
                &[Locator::css("[class*=\"uploading\"]")],
                &[Locator::css(".preview img")],
            )
            .await;
        assert_eq!(signal, UploadSignal::FallbackDelay);
    }

    #[tokio::test]
    async fn test_fill_plain_and_typed() {
        let title = Locator::placeholder("填写标题");
        let body = Locator::css(".ProseMirror p[data-placeholder]");
        let page = MockPage::new("about:blank")
            .with_visible(title.clone())
            .with_visible(body.clone());
        let d = driver(&page);

        d.fill_labelled_field(&[title.clone()], "Day One", TextEntry::Plain)
            .await
            .unwrap();
        d.fill_labelled_field(
            &[Locator::placeholder("正文"), body.clone()],
            "I walked.",
            TextEntry::Typed(Duration::from_millis(20)),
        )
        .await
        .unwrap();

        assert_eq!(page.filled(), vec![(title, "Day One".to_string())]);
        assert_eq!(page.typed(), vec![(Some(body), "I walked.".to_string())]);
    }

    #[tokio::test]
    async fn test_fill_missing_field() {
        let page = MockPage::new("about:blank");
        let err = driver(&page)
            .fill_labelled_field(&[Locator::placeholder("填写标题")], "t", TextEntry::Plain)
            .await
            .unwrap_err();
        assert!(matches!(err, JournalcastError::Driver(DriverError::FieldNotFound(_))));
    }

    #[tokio::test]
    async fn test_click_named_control_missing() {
        let page = MockPage::new("about:blank");
        let err = driver(&page)
            .click_named_control(&[Locator::button("发布")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("button=发布"));
    }

    #[tokio::test]
    async fn test_detect_outcome_failure_wins_over_success() {
        let page = MockPage::new("https://creator.xiaohongshu.com/publish/publish")
            .with_visible(Locator::text("发布成功"))
            .with_visible(Locator::text("上传失败"));
        let detected = driver(&page)
            .detect_outcome(&["发布成功"], &["上传失败"], Some("/publish/publish"))
            .await;
        assert_eq!(detected, Detected::Failure("上传失败".to_string()));
    }

    #[tokio::test]
    async fn test_detect_outcome_success_phrase() {
        let page = MockPage::new("https://creator.xiaohongshu.com/publish/publish")
            .with_visible(Locator::text("审核中"));
        let detected = driver(&page)
            .detect_outcome(&["发布成功", "审核中"], &["上传失败"], Some("/publish/publish"))
            .await;
        assert_eq!(detected, Detected::Success("审核中".to_string()));
    }

    #[tokio::test]
    async fn test_detect_outcome_navigation() {
        let page = MockPage::new("https://creator.xiaohongshu.com/new/note-manager");
        let detected = driver(&page)
            .detect_outcome(&["发布成功"], &["上传失败"], Some("/publish/publish"))
            .await;
        assert_eq!(detected, Detected::Navigated);
    }

    #[tokio::test]
    async fn test_detect_outcome_ambiguous() {
        let page = MockPage::new("https://x.com/home");
        let detected = driver(&page)
            .detect_outcome(&["Your post was sent"], &["Something went wrong"], None)
            .await;
        assert_eq!(detected, Detected::Ambiguous);
    }

    #[tokio::test]
    async fn test_capture_artifact_writes_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let page = MockPage::new("about:blank");
        let path = driver(&page)
            .capture_artifact(dir.path(), PlatformKind::Rednote, "unconfirmed")
            .await
            .unwrap();
        assert!(path.exists());
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("debug-rednote-unconfirmed-"));
        assert!(name.ends_with(".png"));
    }
}
