//! Chrome over CDP using chromiumoxide
//!
//! Locators are resolved in-page by a small script. When an action needs a
//! real element handle (clicks, file inputs), the script tags the match with a
//! unique `data-jc-target` attribute that CDP can then query by CSS.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, InsertTextParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, CookieSameSite, SetCookiesParams, TimeSinceEpoch,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::element::Element;
use chromiumoxide::layout::Point;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::browser::{BrowserLauncher, BrowserPage, Locator};
use crate::credentials::StoredCookie;
use crate::error::{DriverError, JournalcastError, Result};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Resolves `(kind, value, mode, mark)` to a bool; tags the match when `mark`
/// is a string. `mode` is "visible" or "exists".
const RESOLVE_JS: &str = r#"(kind, value, mode, mark) => {
  const norm = (s) => (s || '').replace(/\s+/g, ' ').trim();
  const visible = (el) => {
    const style = window.getComputedStyle(el);
    if (style.visibility === 'hidden' || style.display === 'none') return false;
    const rect = el.getBoundingClientRect();
    return rect.width > 0 && rect.height > 0;
  };
  let found = [];
  if (kind === 'css') {
    found = Array.from(document.querySelectorAll(value));
  } else if (kind === 'placeholder') {
    found = Array.from(document.querySelectorAll('[placeholder],[data-placeholder],[aria-placeholder]'))
      .filter((el) => ['placeholder', 'data-placeholder', 'aria-placeholder']
        .some((attr) => (el.getAttribute(attr) || '').includes(value)));
  } else if (kind === 'text') {
    found = Array.from(document.querySelectorAll('body *'))
      .filter((el) => norm(el.innerText).includes(value)
        && !Array.from(el.children).some((child) => norm(child.innerText).includes(value)));
  } else if (kind === 'button') {
    found = Array.from(document.querySelectorAll('button,[role="button"]'))
      .filter((el) => norm(el.innerText) === value || el.getAttribute('aria-label') === value);
  }
  const el = mode === 'exists' ? found[0] : found.find(visible);
  if (!el) return false;
  if (typeof mark === 'string') el.setAttribute('data-jc-target', mark);
  return true;
}"#;

const READ_STORAGE_JS: &str = r#"(() => {
  const data = {};
  for (let i = 0; i < window.localStorage.length; i++) {
    const key = window.localStorage.key(i);
    if (key !== null) data[key] = window.localStorage.getItem(key) || '';
  }
  return data;
})()"#;

fn browser_err(context: &str, e: impl std::fmt::Display) -> JournalcastError {
    DriverError::Browser(format!("{}: {}", context, e)).into()
}

/// Launches Chrome for one publish attempt or login
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    headless: bool,
}

impl ChromiumLauncher {
    pub fn new(headless: bool) -> Self {
        Self { headless }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserPage>> {
        info!(headless = self.headless, "Launching browser");

        let mut builder = BrowserConfig::builder()
            .arg("--no-sandbox") // Required for containerized environments
            .arg("--disable-dev-shm-usage") // Avoid /dev/shm size issues in containers
            .arg("--disable-blink-features=AutomationControlled")
            .arg(format!("--user-agent={}", USER_AGENT))
            .window_size(1280, 900);
        if !self.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| JournalcastError::BrowserLaunch(format!("invalid config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| JournalcastError::BrowserLaunch(e.to_string()))?;

        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handle.abort();
                return Err(JournalcastError::BrowserLaunch(format!(
                    "could not open page: {}",
                    e
                )));
            }
        };

        Ok(Box::new(ChromiumPage {
            browser,
            page,
            handler: Some(handle),
            marks: AtomicU64::new(0),
        }))
    }
}

/// One page in a dedicated Chrome instance
pub struct ChromiumPage {
    browser: Browser,
    page: Page,
    handler: Option<JoinHandle<()>>,
    marks: AtomicU64,
}

impl ChromiumPage {
    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T> {
        let params = EvaluateParams::builder()
            .expression(script)
            .return_by_value(true)
            .build()
            .map_err(|e| browser_err("evaluate", e))?;
        let result = self
            .page
            .evaluate(params)
            .await
            .map_err(|e| browser_err("evaluate", e))?;
        result
            .into_value::<T>()
            .map_err(|e| browser_err("evaluate result", e))
    }

    async fn resolve(&self, locator: &Locator, mode: &str, mark: Option<&str>) -> Result<bool> {
        let script = format!(
            "({})({}, {}, {}, {})",
            RESOLVE_JS,
            json(locator.kind()),
            json(locator.value()),
            json(mode),
            mark.map(json).unwrap_or_else(|| "null".to_string()),
        );
        self.eval::<bool>(script).await
    }

    /// Tag the first match and return a CDP handle to it
    async fn element(&self, locator: &Locator, mode: &str) -> Result<Element> {
        let mark = format!("jc-{}", self.marks.fetch_add(1, Ordering::Relaxed));
        if !self.resolve(locator, mode, Some(&mark)).await? {
            return Err(DriverError::Browser(format!("no element matches {}", locator)).into());
        }
        self.page
            .find_element(format!("[data-jc-target=\"{}\"]", mark))
            .await
            .map_err(|e| browser_err(&format!("locate {}", locator), e))
    }

    async fn dispatch_key(&self, key: &str) -> Result<()> {
        let (code, key_code, text) = match key {
            "Enter" => ("Enter", 13, Some("\r")),
            "Escape" => ("Escape", 27, None),
            "Tab" => ("Tab", 9, None),
            "Backspace" => ("Backspace", 8, None),
            other => (other, 0, None),
        };

        let mut down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyDown)
            .key(key)
            .code(code)
            .windows_virtual_key_code(key_code);
        if let Some(text) = text {
            down = down.text(text);
        }
        let down = down.build().map_err(|e| browser_err("key event", e))?;
        let up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key(key)
            .code(code)
            .windows_virtual_key_code(key_code)
            .build()
            .map_err(|e| browser_err("key event", e))?;

        self.page
            .execute(down)
            .await
            .map_err(|e| browser_err("key down", e))?;
        self.page
            .execute(up)
            .await
            .map_err(|e| browser_err("key up", e))?;
        Ok(())
    }
}

fn json(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn to_cookie_param(cookie: &StoredCookie) -> Result<CookieParam> {
    if cookie.domain.trim().is_empty() {
        return Err(DriverError::Browser(format!(
            "cookie {} has no domain and cannot be set before navigation",
            cookie.name
        ))
        .into());
    }
    let mut builder = CookieParam::builder()
        .name(cookie.name.clone())
        .value(cookie.value.clone())
        .domain(cookie.domain.clone())
        .path(cookie.path.clone())
        .secure(cookie.secure)
        .http_only(cookie.http_only);
    if !cookie.is_session() {
        builder = builder.expires(TimeSinceEpoch::new(cookie.expires));
    }
    if let Some(same_site) = cookie.same_site.as_deref() {
        let parsed = match same_site.to_lowercase().as_str() {
            "strict" => Some(CookieSameSite::Strict),
            "lax" => Some(CookieSameSite::Lax),
            "none" => Some(CookieSameSite::None),
            _ => None,
        };
        if let Some(parsed) = parsed {
            builder = builder.same_site(parsed);
        }
    }
    builder
        .build()
        .map_err(|e| browser_err(&format!("cookie {}", cookie.name), e))
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn goto(&self, url: &str) -> Result<()> {
        debug!(url, "Navigating");
        self.page
            .goto(url)
            .await
            .map_err(|e| browser_err(&format!("navigate to {}", url), e))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .map_err(|e| browser_err("read url", e))?;
        Ok(url.unwrap_or_default())
    }

    async fn is_visible(&self, locator: &Locator) -> Result<bool> {
        self.resolve(locator, "visible", None).await
    }

    async fn exists(&self, locator: &Locator) -> Result<bool> {
        self.resolve(locator, "exists", None).await
    }

    async fn click(&self, locator: &Locator) -> Result<()> {
        let element = self.element(locator, "visible").await?;
        element
            .click()
            .await
            .map_err(|e| browser_err(&format!("click {}", locator), e))?;
        Ok(())
    }

    async fn click_at(&self, x: f64, y: f64) -> Result<()> {
        self.page
            .click(Point::new(x, y))
            .await
            .map_err(|e| browser_err("click at point", e))?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.dispatch_key(key).await
    }

    async fn set_input_files(&self, locator: &Locator, path: &Path) -> Result<()> {
        let element = self.element(locator, "exists").await?;
        let params = SetFileInputFilesParams::builder()
            .files(vec![path.to_string_lossy().to_string()])
            .backend_node_id(element.backend_node_id)
            .build()
            .map_err(|e| browser_err("file input params", e))?;
        self.page
            .execute(params)
            .await
            .map_err(|e| browser_err(&format!("set files on {}", locator), e))?;
        Ok(())
    }

    async fn fill(&self, locator: &Locator, text: &str) -> Result<()> {
        let element = self.element(locator, "visible").await?;
        element
            .click()
            .await
            .map_err(|e| browser_err(&format!("focus {}", locator), e))?;
        // Select the existing value so the insert replaces it.
        element
            .call_js_fn("function() { if (this.select) this.select(); }", false)
            .await
            .map_err(|e| browser_err(&format!("select {}", locator), e))?;
        self.page
            .execute(InsertTextParams::new(text))
            .await
            .map_err(|e| browser_err(&format!("fill {}", locator), e))?;
        Ok(())
    }

    async fn type_text(&self, text: &str, delay: Duration) -> Result<()> {
        for ch in text.chars() {
            if ch == '\n' {
                self.dispatch_key("Enter").await?;
            } else {
                self.page
                    .execute(InsertTextParams::new(ch.to_string()))
                    .await
                    .map_err(|e| browser_err("type", e))?;
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(())
    }

    async fn set_cookies(&self, cookies: &[StoredCookie]) -> Result<()> {
        let params = cookies
            .iter()
            .map(to_cookie_param)
            .collect::<Result<Vec<_>>>()?;
        // Page::set_cookies insists on an http document; the fresh tab is
        // still about:blank here, and domain-scoped cookies need no URL.
        self.page
            .execute(SetCookiesParams::new(params))
            .await
            .map_err(|e| browser_err("set cookies", e))?;
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<StoredCookie>> {
        // CDP sees HttpOnly cookies that document.cookie cannot.
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|e| browser_err("get cookies", e))?;
        Ok(cookies
            .into_iter()
            .map(|c| StoredCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                expires: if c.session { -1.0 } else { c.expires },
                http_only: c.http_only,
                secure: c.secure,
                same_site: c.same_site.map(|s| match s {
                    CookieSameSite::Strict => "Strict".to_string(),
                    CookieSameSite::Lax => "Lax".to_string(),
                    CookieSameSite::None => "None".to_string(),
                }),
            })
            .collect())
    }

    async fn set_local_storage(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let payload =
            serde_json::to_string(entries).map_err(|e| browser_err("encode storage", e))?;
        let script = format!(
            "((entries) => {{ for (const [k, v] of Object.entries(entries)) window.localStorage.setItem(k, v); return Object.keys(entries).length; }})({})",
            payload
        );
        let written: u64 = self.eval(script).await?;
        debug!(written, "Wrote local storage");
        Ok(())
    }

    async fn local_storage(&self) -> Result<BTreeMap<String, String>> {
        self.eval(READ_STORAGE_JS.to_string()).await
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| browser_err("create screenshot dir", e))?;
        }
        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), path)
            .await
            .map_err(|e| browser_err("screenshot", e))?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "Browser did not close cleanly");
        }
        if let Some(handle) = self.handler.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Browser handler task failed");
            }
        }
        Ok(())
    }
}
