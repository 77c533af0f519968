//! Core types for Journalcast

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::JournalcastError;
use crate::media::MediaAsset;

/// A journal entry as supplied by the content source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub id: String,
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    /// Image reference (local path or URL) attached to the entry, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl JournalRecord {
    pub fn new(id: &str, title: &str, body: &str, tags: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            image: None,
        }
    }
}

/// Publication status of an entry in the content source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryStatus {
    Ready,
    Published,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Ready => "Ready",
            EntryStatus::Published => "Published",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported target platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    /// Thread-based microblogging (x.com)
    X,
    /// Image + caption notes (creator.xiaohongshu.com)
    Rednote,
}

impl PlatformKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::X => "x",
            PlatformKind::Rednote => "rednote",
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformKind {
    type Err = JournalcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "x" | "twitter" => Ok(PlatformKind::X),
            "rednote" | "xhs" | "xiaohongshu" => Ok(PlatformKind::Rednote),
            other => Err(JournalcastError::InvalidInput(format!(
                "Unknown platform '{}'. Valid options: x, rednote",
                other
            ))),
        }
    }
}

/// Ready-to-submit content for one platform.
///
/// Built once per platform per run and never modified afterwards. Dropping the
/// draft releases its media, which deletes any downloaded temp file.
#[derive(Debug)]
pub struct PostDraft {
    pub platform: PlatformKind,
    pub title: String,
    pub body: String,
    /// Thread segments, each already carrying its `(i/N)` marker.
    pub segments: Vec<String>,
    pub media: Option<MediaAsset>,
}

/// States of the publish state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    Init,
    SessionVerified,
    PopupsClear,
    ModeSelected,
    MediaUploaded,
    FieldsFilled,
    Submitted,
    Success,
    Failure,
    Unconfirmed,
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlowState::Success | FlowState::Failure | FlowState::Unconfirmed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlowState::Init => "init",
            FlowState::SessionVerified => "session_verified",
            FlowState::PopupsClear => "popups_clear",
            FlowState::ModeSelected => "mode_selected",
            FlowState::MediaUploaded => "media_uploaded",
            FlowState::FieldsFilled => "fields_filled",
            FlowState::Submitted => "submitted",
            FlowState::Success => "success",
            FlowState::Failure => "failure",
            FlowState::Unconfirmed => "unconfirmed",
        }
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal classification of one adapter invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    /// An explicit error signal was observed, or a required step failed.
    Failure,
    /// Neither success nor failure was observed before the timeout.
    Unconfirmed,
}

/// Result of one adapter invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishOutcome {
    pub platform: PlatformKind,
    pub status: OutcomeStatus,
    pub detail: String,
    /// Last state the flow reached before terminating.
    pub reached: FlowState,
    /// Diagnostic screenshot for non-success terminals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,
}

impl PublishOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Decides whether a run's outcomes justify marking the entry published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishPolicy {
    /// Every attempted platform must succeed.
    #[default]
    All,
    /// At least one platform must succeed.
    Any,
}

impl PublishPolicy {
    /// Apply the policy. An empty set of outcomes never qualifies.
    pub fn is_satisfied(&self, outcomes: &[PublishOutcome]) -> bool {
        if outcomes.is_empty() {
            return false;
        }
        match self {
            PublishPolicy::All => outcomes.iter().all(PublishOutcome::succeeded),
            PublishPolicy::Any => outcomes.iter().any(PublishOutcome::succeeded),
        }
    }
}

impl FromStr for PublishPolicy {
    type Err = JournalcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(PublishPolicy::All),
            "any" => Ok(PublishPolicy::Any),
            other => Err(JournalcastError::InvalidInput(format!(
                "Invalid policy '{}'. Valid options: all, any",
                other
            ))),
        }
    }
}

impl fmt::Display for PublishPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishPolicy::All => f.write_str("all"),
            PublishPolicy::Any => f.write_str("any"),
        }
    }
}
