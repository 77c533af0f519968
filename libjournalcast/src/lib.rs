//! Journalcast - publish a daily journal entry to X and RedNote
//!
//! This library fetches the day's entry from a content source, adapts it per
//! platform and drives each platform's web publishing UI through a browser,
//! since neither site offers a usable posting API.

pub mod browser;
pub mod config;
pub mod credentials;
pub mod driver;
pub mod error;
pub mod logging;
pub mod media;
pub mod notify;
pub mod platforms;
pub mod scheduling;
pub mod service;
pub mod source;
pub mod transform;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use credentials::{CredentialSnapshot, CredentialStore};
pub use error::{JournalcastError, Result};
pub use service::{JournalcastService, RunReport};
pub use types::{
    EntryStatus, FlowState, JournalRecord, OutcomeStatus, PlatformKind, PostDraft,
    PublishOutcome, PublishPolicy,
};
