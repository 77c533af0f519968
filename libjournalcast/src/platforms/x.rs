//! X (x.com) thread adapter
//!
//! Posts the polished entry as a thread from the home timeline composer.
//! There is no title field and no media: the first segment goes into the
//! inline composer and each further segment gets its own box via the "add"
//! control.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::browser::Locator;
use crate::credentials::{CredentialStore, LoginSurface};
use crate::driver::{Dismissal, TextEntry, UiDriver};
use crate::error::{DriverError, Result};
use crate::media::MediaResolver;
use crate::platforms::{FlowProfile, PublishAdapter};
use crate::transform::{polish_or_original, TextTransformer};
use crate::types::{JournalRecord, PlatformKind, PostDraft};

pub const HOME_URL: &str = "https://x.com/home";
pub const LOGIN_URL: &str = "https://x.com/i/flow/login";

/// Present on the home timeline only when logged in
pub const LOGGED_IN_MARKER: &str = "[data-testid=\"tweetTextarea_0\"]";

const TYPING_DELAY: Duration = Duration::from_millis(5);

fn textarea(index: usize) -> Locator {
    Locator::css(&format!("[data-testid=\"tweetTextarea_{}\"]", index))
}

pub struct XAdapter {
    store: CredentialStore,
    profile: FlowProfile,
}

impl XAdapter {
    pub fn new(store: CredentialStore) -> Self {
        Self {
            store,
            profile: profile(),
        }
    }
}

pub fn profile() -> FlowProfile {
    FlowProfile {
        publish_url: HOME_URL.to_string(),
        login: LoginSurface::new(&["/login", "/i/flow/", "/logout"]),
        popups: vec![
            Dismissal::click(Locator::button("Accept all cookies")),
            Dismissal::click(Locator::button("Got it")),
        ],
        mode: vec![],
        requires_media: false,
        file_inputs: vec![],
        progress: vec![],
        preview: vec![],
        submit: vec![
            Locator::css("[data-testid=\"tweetButtonInline\"]"),
            Locator::button("Post all"),
            Locator::button("Post"),
        ],
        success_phrases: vec![
            "Your post was sent".to_string(),
            "Your posts were sent".to_string(),
        ],
        failure_phrases: vec![
            "Something went wrong".to_string(),
            "You already said that".to_string(),
            "Your post is over the character limit".to_string(),
        ],
        publish_marker: None,
    }
}

#[async_trait]
impl PublishAdapter for XAdapter {
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
        transformer: &dyn TextTransformer,
        _media: &MediaResolver,
    ) -> Result<PostDraft> {
        let polished = polish_or_original(transformer, &record.body).await;
        let segments = transformer.split(&polished);
        info!(segments = segments.len(), "Prepared X thread");

        Ok(PostDraft {
            platform: PlatformKind::X,
            title: record.title.clone(),
            body: polished,
            segments,
            media: None,
        })
    }

    async fn fill_fields(&self, driver: &UiDriver<'_>, draft: &PostDraft) -> Result<()> {
        let Some(first) = draft.segments.first() else {
            return Err(DriverError::FieldNotFound("thread has no segments".to_string()).into());
        };
        driver
            .fill_labelled_field(&[textarea(0)], first, TextEntry::Typed(TYPING_DELAY))
            .await?;

        for (index, segment) in draft.segments.iter().enumerate().skip(1) {
            driver
                .click_named_control(&[
                    Locator::css("[data-testid=\"addButton\"]"),
                    Locator::button("Add post"),
                ])
                .await?;
            driver
                .fill_labelled_field(&[textarea(index)], segment, TextEntry::Typed(TYPING_DELAY))
                .await?;
        }
        info!(segments = draft.segments.len(), "Thread composed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::{MockPage, Reaction};
    use crate::driver::DriverTimings;
    use crate::transform::PassthroughTransformer;
    use tempfile::TempDir;

    fn adapter(dir: &TempDir) -> XAdapter {
        XAdapter::new(CredentialStore::new(dir.path().join("x.json")))
    }

    #[tokio::test]
    async fn test_prepare_splits_into_thread() {
        let dir = TempDir::new().unwrap();
        let resolver =
            MediaResolver::new(dir.path().to_path_buf(), 5, Duration::from_secs(1)).unwrap();
        let record = JournalRecord::new("r1", "Day One", "I walked. I coded. I rested.", &["life"]);

        let draft = adapter(&dir)
            .prepare(&record, &PassthroughTransformer, &resolver)
            .await
            .unwrap();
        assert_eq!(draft.segments, vec!["I walked. I coded. I rested. (1/1)"]);
        assert!(draft.media.is_none());
    }

    #[tokio::test]
    async fn test_fill_fields_types_each_segment_into_its_box() {
        let dir = TempDir::new().unwrap();
        let add = Locator::css("[data-testid=\"addButton\"]");
        let page = MockPage::new(HOME_URL)
            .with_visible(textarea(0))
            .with_visible(add.clone())
            .on_click(add.clone(), Reaction::show(&[textarea(1), textarea(2)]));
        let driver = UiDriver::new(&page, DriverTimings::fast());
        let draft = PostDraft {
            platform: PlatformKind::X,
            title: String::new(),
            body: String::new(),
            segments: vec!["a (1/3)".into(), "b (2/3)".into(), "c (3/3)".into()],
            media: None,
        };

        adapter(&dir).fill_fields(&driver, &draft).await.unwrap();

        assert_eq!(
            page.typed(),
            vec![
                (Some(textarea(0)), "a (1/3)".to_string()),
                (Some(textarea(1)), "b (2/3)".to_string()),
                (Some(textarea(2)), "c (3/3)".to_string()),
            ]
        );
        assert_eq!(page.clicks().iter().filter(|l| **l == add).count(), 2);
    }

    #[tokio::test]
    async fn test_fill_fields_without_composer() {
        let dir = TempDir::new().unwrap();
        let page = MockPage::new(HOME_URL);
        let driver = UiDriver::new(&page, DriverTimings::fast());
        let draft = PostDraft {
            platform: PlatformKind::X,
            title: String::new(),
            body: String::new(),
            segments: vec!["a (1/1)".into()],
            media: None,
        };

        let err = adapter(&dir).fill_fields(&driver, &draft).await.unwrap_err();
        assert!(err.to_string().contains("tweetTextarea_0"));
    }

    #[test]
    fn test_login_surface() {
        let login = profile().login;
        assert!(login.matches(LOGIN_URL));
        assert!(!login.matches(HOME_URL));
    }
}
