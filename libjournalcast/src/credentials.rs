//! Credential snapshots captured by `jcast-login` and replayed by every run
//!
//! A snapshot is the browser state of an authenticated session: cookies plus
//! the target origin's local storage. It is written once by a human-supervised
//! login and only ever read afterwards; the store never refreshes it. When the
//! site stops honouring it, the publish surface redirects to a login page,
//! which [`LoginSurface::verify_still_valid`] detects.
//!
//! # File format
//!
//! ```json
//! {
//!   "cookies": [{"name": "a1", "value": "...", "domain": ".xiaohongshu.com",
//!                "path": "/", "expires": 1767225600.0, "httpOnly": true,
//!                "secure": true, "sameSite": "Lax"}],
//!   "localStorage": {"b1": "..."},
//!   "savedAt": "2026-10-16T12:00:00Z"
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info};

use crate::browser::{BrowserPage, Locator};
use crate::error::{Result, SessionError};

/// A browser cookie as persisted in the snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    /// Unix seconds; zero or negative marks a session cookie
    #[serde(default = "session_expiry")]
    pub expires: f64,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

fn session_expiry() -> f64 {
    -1.0
}

impl StoredCookie {
    pub fn is_session(&self) -> bool {
        self.expires <= 0.0
    }
}

/// Captured authentication state for one site
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSnapshot {
    pub cookies: Vec<StoredCookie>,
    #[serde(default)]
    pub local_storage: BTreeMap<String, String>,
    pub saved_at: DateTime<Utc>,
}

impl CredentialSnapshot {
    /// Read the current cookies and local storage from a logged-in page
    pub async fn capture(page: &dyn BrowserPage) -> Result<Self> {
        let cookies = page.cookies().await?;
        let local_storage = page.local_storage().await?;
        info!(
            cookies = cookies.len(),
            local_storage = local_storage.len(),
            "Captured session state"
        );
        Ok(Self {
            cookies,
            local_storage,
            saved_at: Utc::now(),
        })
    }

    /// Install the snapshot into a fresh page and open `url`.
    ///
    /// Cookies go in before navigation so the first request is authenticated.
    /// Local storage is origin-scoped and can only be written once the
    /// document has loaded the target origin, so it goes in afterwards.
    pub async fn apply(&self, page: &dyn BrowserPage, url: &str) -> Result<()> {
        if !self.cookies.is_empty() {
            page.set_cookies(&self.cookies).await?;
            debug!(count = self.cookies.len(), "Injected cookies");
        }

        page.goto(url).await?;

        if !self.local_storage.is_empty() {
            page.set_local_storage(&self.local_storage).await?;
            debug!(count = self.local_storage.len(), "Injected local storage entries");
        }

        Ok(())
    }
}

/// File-backed snapshot store for one platform
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the snapshot
    ///
    /// # Errors
    ///
    /// `SessionError::CredentialsMissing` if the file does not exist; the
    /// operator has to run the interactive login first.
    pub fn load(&self) -> Result<CredentialSnapshot> {
        if !self.path.exists() {
            return Err(SessionError::CredentialsMissing(self.path.clone()).into());
        }

        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            SessionError::CredentialsCorrupt(format!("{}: {}", self.path.display(), e))
        })?;
        let snapshot: CredentialSnapshot = serde_json::from_str(&content).map_err(|e| {
            SessionError::CredentialsCorrupt(format!("{}: {}", self.path.display(), e))
        })?;

        info!(
            path = %self.path.display(),
            saved_at = %snapshot.saved_at,
            cookies = snapshot.cookies.len(),
            "Loaded credential snapshot"
        );
        Ok(snapshot)
    }

    /// Persist a snapshot (only the interactive login writes)
    pub fn save(&self, snapshot: &CredentialSnapshot) -> Result<()> {
        let content = serde_json::to_string_pretty(snapshot)
            .map_err(|e| SessionError::CredentialsCorrupt(e.to_string()))?;

        let io_err = |e: std::io::Error| {
            SessionError::CredentialsCorrupt(format!("{}: {}", self.path.display(), e))
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        std::fs::write(&self.path, content).map_err(io_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, perms).map_err(io_err)?;
        }

        info!(path = %self.path.display(), "Saved credential snapshot");
        Ok(())
    }
}

/// URL markers of a site's login/authentication surface
#[derive(Debug, Clone)]
pub struct LoginSurface {
    markers: Vec<String>,
}

impl LoginSurface {
    pub fn new(markers: &[&str]) -> Self {
        Self {
            markers: markers.iter().map(|m| m.to_lowercase()).collect(),
        }
    }

    pub fn matches(&self, url: &str) -> bool {
        // Only host and path count; query strings often echo "login" in
        // redirect parameters on perfectly valid pages.
        let haystack = match url::Url::parse(url) {
            Ok(parsed) => format!(
                "{}{}",
                parsed.host_str().unwrap_or_default(),
                parsed.path()
            ),
            Err(_) => url.to_string(),
        }
        .to_lowercase();

        self.markers.iter().any(|m| haystack.contains(m.as_str()))
    }

    /// The only freshness check: a redirect to the login surface means the
    /// snapshot is stale.
    ///
    /// # Errors
    ///
    /// `SessionError::SessionExpired` when `current_url` is a login page.
    pub fn verify_still_valid(&self, current_url: &str) -> Result<()> {
        if self.matches(current_url) {
            error!(url = current_url, "Redirected to login, credentials are stale");
            return Err(SessionError::SessionExpired {
                url: current_url.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Where a person logs in, and what the page shows once they have
#[derive(Debug, Clone)]
pub struct LoginTarget {
    pub url: String,
    pub marker: Locator,
}

/// Open the login page and wait for a person to finish logging in
///
/// Polls for `target.marker` until `timeout`, lets the page settle for
/// `settle` so late session writes land, then captures the session.
///
/// # Errors
///
/// `SessionError::LoginTimeout` when the marker never shows up.
pub async fn capture_after_login(
    page: &dyn BrowserPage,
    target: &LoginTarget,
    timeout: Duration,
    poll: Duration,
    settle: Duration,
) -> Result<CredentialSnapshot> {
    page.goto(&target.url).await?;
    info!(url = %target.url, timeout = ?timeout, "Waiting for login to complete");

    let deadline = Instant::now() + timeout;
    loop {
        match page.exists(&target.marker).await {
            Ok(true) => break,
            Ok(false) => {}
            Err(e) => debug!(marker = %target.marker, error = %e, "Login probe failed"),
        }
        if Instant::now() >= deadline {
            return Err(SessionError::LoginTimeout(timeout).into());
        }
        sleep(poll).await;
    }

    info!(marker = %target.marker, "Login detected");
    sleep(settle).await;
    CredentialSnapshot::capture(page).await
}
