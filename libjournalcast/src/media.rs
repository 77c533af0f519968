//! Media acquisition
//!
//! Resolves an image reference to a file the browser can upload. Local paths
//! pass through untouched. Remote URLs are downloaded into the configured
//! temp directory; the resulting [`MediaAsset`] owns the file and deletes it
//! when dropped, so every exit path of the attempt that consumed it cleans up.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::redirect::Policy;
use reqwest::{Client, StatusCode};
use tempfile::{Builder, TempPath};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{expand_path, MediaConfig};
use crate::error::{MediaError, Result};

const DEFAULT_EXTENSION: &str = "jpg";
const CONNECT_ATTEMPTS: u32 = 3;

/// An image ready for upload
#[derive(Debug)]
pub struct MediaAsset {
    pub source_ref: String,
    pub resolved_local_path: PathBuf,
    pub is_temporary: bool,
    temp: Option<TempPath>,
}

impl MediaAsset {
    /// A caller-owned file; never deleted
    pub fn local(source_ref: &str, path: PathBuf) -> Self {
        Self {
            source_ref: source_ref.to_string(),
            resolved_local_path: path,
            is_temporary: false,
            temp: None,
        }
    }

    fn temporary(source_ref: &str, temp: TempPath) -> Self {
        Self {
            source_ref: source_ref.to_string(),
            resolved_local_path: temp.to_path_buf(),
            is_temporary: true,
            temp: Some(temp),
        }
    }

    pub fn path(&self) -> &Path {
        &self.resolved_local_path
    }

    /// Delete the temp file now and report failures instead of ignoring them
    pub fn cleanup(mut self) {
        if let Some(temp) = self.temp.take() {
            let path = temp.to_path_buf();
            match temp.close() {
                Ok(()) => debug!(path = %path.display(), "Removed temp media"),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temp media"),
            }
        }
    }
}

/// Downloads or validates media references
#[derive(Debug, Clone)]
pub struct MediaResolver {
    client: Client,
    temp_dir: PathBuf,
    max_redirects: usize,
}

impl MediaResolver {
    pub fn new(temp_dir: PathBuf, max_redirects: usize, timeout: Duration) -> Result<Self> {
        // Redirects are followed by hand so the hop limit maps to our error.
        let client = Client::builder()
            .redirect(Policy::none())
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| MediaError::Network(e.to_string()))?;

        Ok(Self {
            client,
            temp_dir,
            max_redirects,
        })
    }

    pub fn from_config(config: &MediaConfig) -> Result<Self> {
        Self::new(
            expand_path(&config.temp_dir),
            config.max_redirects,
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Resolve a local path or http(s) URL to an uploadable file
    ///
    /// # Errors
    ///
    /// - `MediaError::NotFound` for a local path that does not exist
    /// - `MediaError::TooManyRedirects` past the configured hop limit
    /// - `MediaError::DownloadTimeout` when connect or transfer times out
    /// - `MediaError::Http` for a non-success final status
    pub async fn resolve(&self, source_ref: &str) -> Result<MediaAsset> {
        let source_ref = source_ref.trim();
        if source_ref.is_empty() {
            return Err(MediaError::Missing("empty media reference".to_string()).into());
        }

        match Url::parse(source_ref) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
                self.download(source_ref, url).await
            }
            Ok(url) if url.scheme() == "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| MediaError::NotFound(PathBuf::from(source_ref)))?;
                Self::local_file(source_ref, path)
            }
            _ => Self::local_file(source_ref, expand_path(source_ref)),
        }
    }

    fn local_file(source_ref: &str, path: PathBuf) -> Result<MediaAsset> {
        if !path.is_file() {
            return Err(MediaError::NotFound(path).into());
        }
        debug!(path = %path.display(), "Using local media");
        Ok(MediaAsset::local(source_ref, path))
    }

    async fn download(&self, source_ref: &str, start: Url) -> Result<MediaAsset> {
        let mut url = start;
        let mut hops = 0;

        let response = loop {
            let response = self.get_with_retry(&url).await?;
            let status = response.status();

            if status.is_redirection() {
                hops += 1;
                if hops > self.max_redirects {
                    return Err(MediaError::TooManyRedirects {
                        url: source_ref.to_string(),
                        max: self.max_redirects,
                    }
                    .into());
                }
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| MediaError::Http {
                        url: url.to_string(),
                        status: status.as_u16(),
                    })?;
                let next = url
                    .join(location)
                    .map_err(|e| MediaError::Network(format!("bad redirect target: {}", e)))?;
                debug!(from = %url, to = %next, hop = hops, "Following redirect");
                url = next;
                continue;
            }

            if status != StatusCode::OK {
                return Err(MediaError::Http {
                    url: url.to_string(),
                    status: status.as_u16(),
                }
                .into());
            }
            break response;
        };

        std::fs::create_dir_all(&self.temp_dir).map_err(MediaError::Io)?;
        let suffix = format!(".{}", extension_of(&url));
        let mut file = Builder::new()
            .prefix("media-")
            .suffix(&suffix)
            .tempfile_in(&self.temp_dir)
            .map_err(MediaError::Io)?;

        // From here on the NamedTempFile removes itself if we bail out.
        let mut response = response;
        let mut written = 0usize;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| classify(e, source_ref))?
        {
            file.write_all(&chunk).map_err(MediaError::Io)?;
            written += chunk.len();
        }
        file.flush().map_err(MediaError::Io)?;

        let temp = file.into_temp_path();
        info!(
            url = source_ref,
            path = %temp.display(),
            bytes = written,
            "Downloaded media"
        );
        Ok(MediaAsset::temporary(source_ref, temp))
    }

    async fn get_with_retry(&self, url: &Url) -> Result<reqwest::Response> {
        for attempt in 1..=CONNECT_ATTEMPTS {
            match self.client.get(url.clone()).send().await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_connect() && !e.is_timeout() && attempt < CONNECT_ATTEMPTS => {
                    let delay_secs = 2_u64.pow(attempt - 1);
                    warn!(
                        "Connect error fetching {} (attempt {}/{}): {}. Retrying in {}s...",
                        url, attempt, CONNECT_ATTEMPTS, e, delay_secs
                    );
                    sleep(Duration::from_secs(delay_secs)).await;
                }
                Err(e) => return Err(classify(e, url.as_str()).into()),
            }
        }

        Err(MediaError::Network(format!(
            "Failed to fetch {} after {} attempts",
            url, CONNECT_ATTEMPTS
        ))
        .into())
    }
}

fn classify(err: reqwest::Error, url: &str) -> MediaError {
    if err.is_timeout() {
        MediaError::DownloadTimeout(url.to_string())
    } else {
        MediaError::Network(err.to_string())
    }
}

/// File extension taken from the URL path, `jpg` when absent or odd
fn extension_of(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}
