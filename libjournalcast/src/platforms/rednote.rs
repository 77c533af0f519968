//! RedNote (Xiaohongshu) creator-center adapter
//!
//! Publishes an image note: one picture, a short title and a caption body.
//! The caption editor is ProseMirror, which ignores synthetic value changes,
//! so the body is typed key by key.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::browser::Locator;
use crate::credentials::{CredentialStore, LoginSurface};
use crate::driver::{Dismissal, TextEntry, UiDriver};
use crate::error::{DriverError, JournalcastError, MediaError, Result};
use crate::media::MediaResolver;
use crate::platforms::{FlowProfile, PublishAdapter};
use crate::transform::{summarize_above, TextTransformer};
use crate::types::{JournalRecord, PlatformKind, PostDraft};

pub const PUBLISH_URL: &str = "https://creator.xiaohongshu.com/publish/publish";

/// The upload input only renders once the creator center is logged in
pub const LOGGED_IN_MARKER: &str = "input[type=\"file\"]";

/// Title length limit enforced by the editor
pub const TITLE_LIMIT: usize = 20;

/// Target length when a long body gets summarized
pub const SUMMARY_TARGET: usize = 850;

const TYPING_DELAY: Duration = Duration::from_millis(20);

pub struct RednoteAdapter {
    store: CredentialStore,
    profile: FlowProfile,
    default_image: Option<String>,
    summarize_above: usize,
}

impl RednoteAdapter {
    pub fn new(store: CredentialStore, default_image: Option<String>, summarize_above: usize) -> Self {
        Self {
            store,
            profile: profile(),
            default_image,
            summarize_above,
        }
    }
}

pub fn profile() -> FlowProfile {
    FlowProfile {
        publish_url: PUBLISH_URL.to_string(),
        login: LoginSurface::new(&["login", "passport"]),
        popups: vec![
            // "Drafts are here" announcement
            Dismissal::click(Locator::text("我知道了")),
            // "Try text-to-image" tip closes on a click elsewhere
            Dismissal::click_away(Locator::text("试试文字配图吧"), 50.0, 50.0),
            Dismissal::key("Escape", 3),
        ],
        mode: vec![Locator::text("图文"), Locator::button("图文")],
        requires_media: true,
        file_inputs: vec![Locator::css("input[type=\"file\"]")],
        progress: vec![
            Locator::css("[class*=\"uploading\"]"),
            Locator::css("[class*=\"loading\"]"),
            Locator::css("[class*=\"progress\"]"),
            Locator::text("上传中"),
        ],
        preview: vec![
            Locator::css("img[src*=\"xhscdn\"]"),
            Locator::css("[class*=\"preview\"] img"),
            Locator::css("[class*=\"image\"] img"),
            Locator::css("[class*=\"cover\"] img"),
        ],
        submit: vec![Locator::button("发布")],
        success_phrases: ["发布成功", "发布中", "审核中", "已发布"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        failure_phrases: ["请上传图片", "请填写标题", "请填写正文", "上传失败"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        publish_marker: Some("/publish/publish".to_string()),
    }
}

fn title_field() -> Vec<Locator> {
    vec![Locator::placeholder("填写标题")]
}

fn body_fields() -> Vec<Locator> {
    vec![
        Locator::css("[data-placeholder*=\"正文\"]"),
        Locator::css("[data-placeholder*=\"描述\"]"),
        Locator::css("[class*=\"editor\"] p[data-placeholder]"),
        Locator::css(".ProseMirror p[data-placeholder]"),
    ]
}

fn truncate_title(title: &str) -> String {
    title.trim().chars().take(TITLE_LIMIT).collect()
}

fn with_tags(body: &str, tags: &[String]) -> String {
    let tags: Vec<String> = tags
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| format!("#{}", t))
        .collect();
    if tags.is_empty() {
        body.to_string()
    } else {
        format!("{}\n\n{}", body, tags.join(" "))
    }
}

#[async_trait]
impl PublishAdapter for RednoteAdapter {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Rednote
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
        media: &MediaResolver,
    ) -> Result<PostDraft> {
        let source = record
            .image
            .as_deref()
            .or(self.default_image.as_deref())
            .ok_or_else(|| {
                MediaError::Missing("entry has no image and no rednote.default_image".to_string())
            })?;
        let asset = media.resolve(source).await?;

        let body = summarize_above(transformer, &record.body, self.summarize_above, SUMMARY_TARGET).await;
        let title = truncate_title(&record.title);
        info!(
            title = %title,
            body_chars = body.chars().count(),
            image = %asset.path().display(),
            "Prepared RedNote draft"
        );

        Ok(PostDraft {
            platform: PlatformKind::Rednote,
            title,
            body: with_tags(&body, &record.tags),
            segments: vec![],
            media: Some(asset),
        })
    }

    async fn fill_fields(&self, driver: &UiDriver<'_>, draft: &PostDraft) -> Result<()> {
        driver
            .fill_labelled_field(&title_field(), &draft.title, TextEntry::Plain)
            .await?;

        let budget = driver.timings().optional_field;
        match driver
            .fill_within(&body_fields(), &draft.body, TextEntry::Typed(TYPING_DELAY), budget)
            .await
        {
            Ok(_) => {}
            Err(JournalcastError::Driver(DriverError::FieldNotFound(candidates))) => {
                warn!(candidates = %candidates, "Body editor not found, publishing without body");
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}
