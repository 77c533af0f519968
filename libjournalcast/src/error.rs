//! Error types for Journalcast

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, JournalcastError>;

#[derive(Error, Debug)]
pub enum JournalcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Browser launch failed: {0}")]
    BrowserLaunch(String),

    #[error("Browser automation error: {0}")]
    Driver(#[from] DriverError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl JournalcastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            JournalcastError::InvalidInput(_) => 3,
            JournalcastError::Session(_) => 2,
            JournalcastError::Config(_)
            | JournalcastError::BrowserLaunch(_)
            | JournalcastError::Driver(_)
            | JournalcastError::Media(_)
            | JournalcastError::Service(_) => 1,
        }
    }

    /// Whether this error must abort the whole run instead of a single
    /// platform attempt.
    ///
    /// Credential and session problems would fail every remaining attempt the
    /// same way, and a browser that cannot launch leaves nothing to drive.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            JournalcastError::Session(_) | JournalcastError::BrowserLaunch(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Credentials not found at {0}. Run jcast-login first")]
    CredentialsMissing(PathBuf),

    #[error("Credential snapshot is unreadable: {0}")]
    CredentialsCorrupt(String),

    #[error("Session expired, redirected to {url}. Run jcast-login again")]
    SessionExpired { url: String },

    #[error("Login not completed within {0:?}")]
    LoginTimeout(std::time::Duration),
}

#[derive(Error, Debug, Clone)]
pub enum DriverError {
    #[error("Upload target not found: {0}")]
    UploadTargetNotFound(String),

    #[error("Field not found: {0}")]
    FieldNotFound(String),

    #[error("Control not found: {0}")]
    ControlNotFound(String),

    #[error("Submit control not found: {0}")]
    SubmitControlNotFound(String),

    #[error("Platform rejected the post: {0}")]
    Rejected(String),

    #[error("Page operation failed: {0}")]
    Browser(String),
}

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Media file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Download timed out: {0}")]
    DownloadTimeout(String),

    #[error("Too many redirects (max {max}) while fetching {url}")]
    TooManyRedirects { url: String, max: usize },

    #[error("Download of {url} failed with status {status}")]
    Http { url: String, status: u16 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("No media available: {0}")]
    Missing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("{service} returned {status}: {body}")]
    Api {
        service: String,
        status: u16,
        body: String,
    },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Email delivery failed: {0}")]
    Email(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ServiceError::Decode(err.to_string())
        } else {
            ServiceError::Http(err.to_string())
        }
    }
}
