//! Scripted browser page for testing
//!
//! `MockPage` models a page as a set of visible (and hidden-but-present)
//! locators plus reactions to clicks, uploads and navigation. It records every
//! action so tests can assert what the driver and the publish flows did,
//! without launching a browser.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::browser::{BrowserLauncher, BrowserPage, Locator};
use crate::credentials::StoredCookie;
use crate::error::{DriverError, JournalcastError, Result};

/// Page changes applied when something happens
#[derive(Debug, Clone, Default)]
pub struct Reaction {
    pub show: Vec<Locator>,
    pub hide: Vec<Locator>,
    pub navigate: Option<String>,
}

impl Reaction {
    pub fn show(locators: &[Locator]) -> Self {
        Self {
            show: locators.to_vec(),
            ..Default::default()
        }
    }

    pub fn hide(locators: &[Locator]) -> Self {
        Self {
            hide: locators.to_vec(),
            ..Default::default()
        }
    }

    pub fn navigate(url: &str) -> Self {
        Self {
            navigate: Some(url.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    url: String,
    redirects: HashMap<String, String>,
    visible: HashSet<Locator>,
    present: HashSet<Locator>,
    on_click: HashMap<Locator, Reaction>,
    on_upload: Option<Reaction>,
    on_key: HashMap<String, Reaction>,
    dead_keys: HashSet<String>,
    focused: Option<Locator>,
    events: Vec<String>,
    clicks: Vec<Locator>,
    keys: Vec<String>,
    typed: Vec<(Option<Locator>, String)>,
    filled: Vec<(Locator, String)>,
    uploads: Vec<PathBuf>,
    screenshots: Vec<PathBuf>,
    cookies: Vec<StoredCookie>,
    local_storage: BTreeMap<String, String>,
    closed: bool,
}

impl MockState {
    fn apply(&mut self, reaction: &Reaction) {
        for locator in &reaction.hide {
            self.visible.remove(locator);
        }
        for locator in &reaction.show {
            self.visible.insert(locator.clone());
        }
        if let Some(url) = &reaction.navigate {
            self.url = url.clone();
        }
    }
}

/// Scripted page; clones share state
#[derive(Debug, Clone, Default)]
pub struct MockPage {
    state: Arc<Mutex<MockState>>,
}

impl MockPage {
    pub fn new(url: &str) -> Self {
        let page = Self::default();
        page.lock().url = url.to_string();
        page
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Make a locator visible from the start
    pub fn with_visible(self, locator: Locator) -> Self {
        self.lock().visible.insert(locator);
        self
    }

    /// Make a locator resolvable but not visible (e.g. a hidden file input)
    pub fn with_present(self, locator: Locator) -> Self {
        self.lock().present.insert(locator);
        self
    }

    /// Navigating to `from` lands on `to`
    pub fn with_redirect(self, from: &str, to: &str) -> Self {
        self.lock()
            .redirects
            .insert(from.to_string(), to.to_string());
        self
    }

    pub fn on_click(self, locator: Locator, reaction: Reaction) -> Self {
        self.lock().on_click.insert(locator, reaction);
        self
    }

    pub fn on_upload(self, reaction: Reaction) -> Self {
        self.lock().on_upload = Some(reaction);
        self
    }

    pub fn on_key(self, key: &str, reaction: Reaction) -> Self {
        self.lock().on_key.insert(key.to_string(), reaction);
        self
    }

    /// Presses of `key` fail, as with a detached target
    pub fn with_dead_key(self, key: &str) -> Self {
        self.lock().dead_keys.insert(key.to_string());
        self
    }

    /// Change the page from outside, as a late-rendering UI would
    pub fn react(&self, reaction: &Reaction) {
        self.lock().apply(reaction);
    }

    pub fn url(&self) -> String {
        self.lock().url.clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.lock().events.clone()
    }

    pub fn clicks(&self) -> Vec<Locator> {
        self.lock().clicks.clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys.clone()
    }

    /// Text typed character-by-character, with the element focused at the time
    pub fn typed(&self) -> Vec<(Option<Locator>, String)> {
        self.lock().typed.clone()
    }

    pub fn filled(&self) -> Vec<(Locator, String)> {
        self.lock().filled.clone()
    }

    pub fn uploads(&self) -> Vec<PathBuf> {
        self.lock().uploads.clone()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.lock().screenshots.clone()
    }

    pub fn cookie_jar(&self) -> Vec<StoredCookie> {
        self.lock().cookies.clone()
    }

    pub fn storage(&self) -> BTreeMap<String, String> {
        self.lock().local_storage.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn missing(locator: &Locator) -> JournalcastError {
        DriverError::Browser(format!("no element matches {}", locator)).into()
    }
}

#[async_trait]
impl BrowserPage for MockPage {
    async fn goto(&self, url: &str) -> Result<()> {
        let mut state = self.lock();
        state.events.push(format!("goto {}", url));
        let landed = state
            .redirects
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string());
        state.url = landed;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.lock().url.clone())
    }

    async fn is_visible(&self, locator: &Locator) -> Result<bool> {
        Ok(self.lock().visible.contains(locator))
    }

    async fn exists(&self, locator: &Locator) -> Result<bool> {
        let state = self.lock();
        Ok(state.visible.contains(locator) || state.present.contains(locator))
    }

    async fn click(&self, locator: &Locator) -> Result<()> {
        let mut state = self.lock();
        if !state.visible.contains(locator) {
            return Err(Self::missing(locator));
        }
        state.events.push(format!("click {}", locator));
        state.clicks.push(locator.clone());
        state.focused = Some(locator.clone());
        if let Some(reaction) = state.on_click.get(locator).cloned() {
            state.apply(&reaction);
        }
        Ok(())
    }

    async fn click_at(&self, x: f64, y: f64) -> Result<()> {
        let mut state = self.lock();
        state.events.push(format!("click_at {},{}", x, y));
        state.focused = None;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let mut state = self.lock();
        state.events.push(format!("key {}", key));
        if state.dead_keys.contains(key) {
            return Err(DriverError::Browser(format!("key {}: target detached", key)).into());
        }
        state.keys.push(key.to_string());
        if let Some(reaction) = state.on_key.get(key).cloned() {
            state.apply(&reaction);
        }
        Ok(())
    }

    async fn set_input_files(&self, locator: &Locator, path: &Path) -> Result<()> {
        let mut state = self.lock();
        if !state.visible.contains(locator) && !state.present.contains(locator) {
            return Err(Self::missing(locator));
        }
        state.events.push(format!("upload {}", path.display()));
        state.uploads.push(path.to_path_buf());
        if let Some(reaction) = state.on_upload.clone() {
            state.apply(&reaction);
        }
        Ok(())
    }

    async fn fill(&self, locator: &Locator, text: &str) -> Result<()> {
        let mut state = self.lock();
        if !state.visible.contains(locator) {
            return Err(Self::missing(locator));
        }
        state.events.push(format!("fill {}", locator));
        state.focused = Some(locator.clone());
        state.filled.push((locator.clone(), text.to_string()));
        Ok(())
    }

    async fn type_text(&self, text: &str, _delay: Duration) -> Result<()> {
        let mut state = self.lock();
        state.events.push("type".to_string());
        let focused = state.focused.clone();
        state.typed.push((focused, text.to_string()));
        Ok(())
    }

    async fn set_cookies(&self, cookies: &[StoredCookie]) -> Result<()> {
        let mut state = self.lock();
        state.events.push("set_cookies".to_string());
        // Without an http document a cookie can only be scoped by its domain.
        let on_http = state.url.starts_with("http://") || state.url.starts_with("https://");
        if let Some(orphan) = cookies.iter().find(|c| !on_http && c.domain.trim().is_empty()) {
            return Err(DriverError::Browser(format!(
                "set cookies: blank page can not have cookie {}",
                orphan.name
            ))
            .into());
        }
        state.cookies.extend(cookies.iter().cloned());
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<StoredCookie>> {
        Ok(self.lock().cookies.clone())
    }

    async fn set_local_storage(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let mut state = self.lock();
        state.events.push("set_local_storage".to_string());
        state
            .local_storage
            .extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn local_storage(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.lock().local_storage.clone())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DriverError::Browser(format!("screenshot dir: {}", e)))?;
        }
        std::fs::write(path, b"mock screenshot")
            .map_err(|e| DriverError::Browser(format!("screenshot: {}", e)))?;
        let mut state = self.lock();
        state.events.push(format!("screenshot {}", path.display()));
        state.screenshots.push(path.to_path_buf());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.events.push("close".to_string());
        state.closed = true;
        Ok(())
    }
}

/// Hands out pre-scripted pages, one per launch
#[derive(Debug, Default)]
pub struct MockLauncher {
    pages: Mutex<VecDeque<MockPage>>,
    launches: Mutex<usize>,
    fail_launch: bool,
}

impl MockLauncher {
    pub fn new(pages: Vec<MockPage>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            launches: Mutex::new(0),
            fail_launch: false,
        }
    }

    /// A launcher whose browser never starts
    pub fn failing() -> Self {
        Self {
            fail_launch: true,
            ..Default::default()
        }
    }

    pub fn launch_count(&self) -> usize {
        *self.launches.lock().unwrap()
    }
}

#[async_trait]
impl BrowserLauncher for MockLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserPage>> {
        *self.launches.lock().unwrap() += 1;

        if self.fail_launch {
            return Err(JournalcastError::BrowserLaunch(
                "Mock browser failed to start".to_string(),
            ));
        }

        let page = self.pages.lock().unwrap().pop_front().ok_or_else(|| {
            JournalcastError::BrowserLaunch("No scripted page left".to_string())
        })?;
        Ok(Box::new(page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_click_applies_reaction() {
        let submit = Locator::button("发布");
        let toast = Locator::text("发布成功");
        let page = MockPage::new("https://creator.xiaohongshu.com/publish/publish")
            .with_visible(submit.clone())
            .on_click(submit.clone(), Reaction::show(&[toast.clone()]));

        assert!(!page.is_visible(&toast).await.unwrap());
        page.click(&submit).await.unwrap();
        assert!(page.is_visible(&toast).await.unwrap());
        assert_eq!(page.clicks(), vec![submit]);
    }

    #[tokio::test]
    async fn test_click_missing_element_fails() {
        let page = MockPage::new("about:blank");
        assert!(page.click(&Locator::button("Post")).await.is_err());
    }

    #[tokio::test]
    async fn test_redirect_on_goto() {
        let page = MockPage::new("about:blank")
            .with_redirect("https://x.com/home", "https://x.com/i/flow/login");
        page.goto("https://x.com/home").await.unwrap();
        assert_eq!(page.current_url().await.unwrap(), "https://x.com/i/flow/login");
    }

    #[tokio::test]
    async fn test_hidden_input_accepts_files() {
        let input = Locator::css("input[type=\"file\"]");
        let page = MockPage::new("about:blank").with_present(input.clone());

        assert!(!page.is_visible(&input).await.unwrap());
        assert!(page.exists(&input).await.unwrap());
        page.set_input_files(&input, Path::new("/tmp/a.jpg"))
            .await
            .unwrap();
        assert_eq!(page.uploads(), vec![PathBuf::from("/tmp/a.jpg")]);
    }

    #[tokio::test]
    async fn test_launcher_hands_out_pages_in_order() {
        let first = MockPage::new("about:first");
        let launcher = MockLauncher::new(vec![first.clone(), MockPage::new("about:second")]);

        let mut page = launcher.launch().await.unwrap();
        assert_eq!(page.current_url().await.unwrap(), "about:first");
        page.close().await.unwrap();
        assert!(first.is_closed());

        launcher.launch().await.unwrap();
        assert!(launcher.launch().await.is_err());
        assert_eq!(launcher.launch_count(), 3);
    }

    fn cookie(name: &str, domain: &str) -> StoredCookie {
        StoredCookie {
            name: name.to_string(),
            value: "v".to_string(),
            domain: domain.to_string(),
            path: "/".to_string(),
            expires: -1.0,
            http_only: false,
            secure: true,
            same_site: None,
        }
    }

    #[tokio::test]
    async fn test_blank_page_cookies_need_domain() {
        let page = MockPage::new("about:blank");
        page.set_cookies(&[cookie("auth_token", ".x.com")]).await.unwrap();
        assert_eq!(page.cookie_jar().len(), 1);

        let err = page.set_cookies(&[cookie("orphan", "")]).await.unwrap_err();
        assert!(err.to_string().contains("blank page can not have cookie orphan"));
        assert_eq!(page.cookie_jar().len(), 1);

        let page = MockPage::new("https://x.com/home");
        page.set_cookies(&[cookie("orphan", "")]).await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_launcher() {
        let launcher = MockLauncher::failing();
        let err = launcher.launch().await.err().unwrap();
        assert!(err.is_fatal());
    }
}
