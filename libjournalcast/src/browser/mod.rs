//! Browser abstraction
//!
//! The UI driver and the publish flows talk to a [`BrowserPage`], never to a
//! concrete browser. [`chromium`] drives a real Chrome through CDP; [`mock`]
//! is a scripted page for tests.
//!
//! Elements are addressed through [`Locator`]s because the target sites ship
//! undocumented, frequently changing DOMs: callers hand over an ordered list
//! of candidate locators and the first one that resolves wins.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::credentials::StoredCookie;
use crate::error::Result;

pub mod chromium;

// Mock page is available for all builds (not just tests) to support integration tests
pub mod mock;

/// One strategy for finding an element on the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// CSS selector
    Css(String),
    /// Innermost element whose visible text contains the phrase
    Text(String),
    /// Input or rich-text block whose placeholder contains the phrase
    Placeholder(String),
    /// Button (or `role="button"`) with this accessible name
    Button(String),
}

impl Locator {
    pub fn css(selector: &str) -> Self {
        Locator::Css(selector.to_string())
    }

    pub fn text(phrase: &str) -> Self {
        Locator::Text(phrase.to_string())
    }

    pub fn placeholder(phrase: &str) -> Self {
        Locator::Placeholder(phrase.to_string())
    }

    pub fn button(name: &str) -> Self {
        Locator::Button(name.to_string())
    }

    /// Strategy name understood by the in-page resolver
    pub fn kind(&self) -> &'static str {
        match self {
            Locator::Css(_) => "css",
            Locator::Text(_) => "text",
            Locator::Placeholder(_) => "placeholder",
            Locator::Button(_) => "button",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Locator::Css(v) | Locator::Text(v) | Locator::Placeholder(v) | Locator::Button(v) => v,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.kind(), self.value())
    }
}

/// Render a candidate list for error messages
pub fn describe(locators: &[Locator]) -> String {
    locators
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" | ")
}

/// A single open page in a browser session owned by one publish attempt.
///
/// Operations are single-shot: they look once and report. Waiting, retrying
/// and candidate fallback belong to [`crate::driver::UiDriver`].
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigate and wait for the document to load
    async fn goto(&self, url: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// Whether the locator resolves to a rendered, visible element
    async fn is_visible(&self, locator: &Locator) -> Result<bool>;

    /// Whether the locator resolves to any element, visible or not
    async fn exists(&self, locator: &Locator) -> Result<bool>;

    /// Click the first visible match
    async fn click(&self, locator: &Locator) -> Result<()>;

    /// Click at viewport coordinates (used to dismiss click-away popups)
    async fn click_at(&self, x: f64, y: f64) -> Result<()>;

    /// Press a named key (e.g. "Escape", "Enter") on the focused element
    async fn press_key(&self, key: &str) -> Result<()>;

    /// Set the files of a file input (hidden inputs included)
    async fn set_input_files(&self, locator: &Locator, path: &Path) -> Result<()>;

    /// Focus a plain input and replace its value
    async fn fill(&self, locator: &Locator, text: &str) -> Result<()>;

    /// Type into the focused element one character at a time
    async fn type_text(&self, text: &str, delay: Duration) -> Result<()>;

    async fn set_cookies(&self, cookies: &[StoredCookie]) -> Result<()>;

    async fn cookies(&self) -> Result<Vec<StoredCookie>>;

    /// Write entries into the current origin's local storage
    async fn set_local_storage(&self, entries: &BTreeMap<String, String>) -> Result<()>;

    async fn local_storage(&self) -> Result<BTreeMap<String, String>>;

    async fn screenshot(&self, path: &Path) -> Result<()>;

    /// Tear down the page and its browser
    async fn close(&mut self) -> Result<()>;
}

/// Opens a fresh browser session per publish attempt.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// # Errors
    ///
    /// Returns `JournalcastError::BrowserLaunch` when no browser could be
    /// started; callers treat that as fatal for the run.
    async fn launch(&self) -> Result<Box<dyn BrowserPage>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_display() {
        assert_eq!(
            Locator::css("input[type=\"file\"]").to_string(),
            "css=input[type=\"file\"]"
        );
        assert_eq!(Locator::button("发布").to_string(), "button=发布");
    }

    #[test]
    fn test_describe_candidates() {
        let candidates = vec![Locator::text("我知道了"), Locator::placeholder("填写标题")];
        assert_eq!(describe(&candidates), "text=我知道了 | placeholder=填写标题");
    }
}
