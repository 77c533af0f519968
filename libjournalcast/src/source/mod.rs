//! Content sources that supply the day's journal entry

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{JournalcastError, Result};
use crate::types::{EntryStatus, JournalRecord};

pub mod markdown;
pub mod notion;

pub use notion::NotionSource;

/// Today's date in local time
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// The entry dated `date` whose status is Ready, if any
    async fn fetch_ready(&self, date: NaiveDate) -> Result<Option<JournalRecord>>;

    async fn update_status(&self, id: &str, status: EntryStatus) -> Result<()>;

    /// Whether any entry exists for `date`, whatever its status
    async fn has_entry(&self, date: NaiveDate) -> Result<bool>;
}

/// An entry as held by [`MemorySource`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    #[serde(flatten)]
    pub record: JournalRecord,
    pub date: NaiveDate,
    pub status: EntryStatus,
}

/// In-process source used for dry runs, local entry files and tests
#[derive(Debug, Default)]
pub struct MemorySource {
    entries: Mutex<Vec<StoredEntry>>,
    updates: Mutex<Vec<(String, EntryStatus)>>,
}

impl MemorySource {
    pub fn new(entries: Vec<StoredEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            updates: Mutex::new(Vec::new()),
        }
    }

    /// A single Ready entry dated today
    pub fn ready_today(record: JournalRecord) -> Self {
        Self::new(vec![StoredEntry {
            record,
            date: today(),
            status: EntryStatus::Ready,
        }])
    }

    /// Load one entry or a list of entries from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            JournalcastError::InvalidInput(format!("{}: {}", path.display(), e))
        })?;
        let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            JournalcastError::InvalidInput(format!("{}: {}", path.display(), e))
        })?;
        let parse = |v: serde_json::Value| {
            serde_json::from_value::<StoredEntry>(v).map_err(|e| {
                JournalcastError::InvalidInput(format!("{}: {}", path.display(), e))
            })
        };
        let entries = match value {
            serde_json::Value::Array(items) => {
                items.into_iter().map(parse).collect::<Result<Vec<_>>>()?
            }
            other => vec![parse(other)?],
        };
        Ok(Self::new(entries))
    }

    /// Status updates received so far, in order
    pub fn updates(&self) -> Vec<(String, EntryStatus)> {
        self.updates
            .lock()
            .map(|u| u.clone())
            .unwrap_or_default()
    }

    pub fn status_of(&self, id: &str) -> Option<EntryStatus> {
        self.entries
            .lock()
            .ok()?
            .iter()
            .find(|e| e.record.id == id)
            .map(|e| e.status)
    }
}

fn poisoned<T>(_: T) -> JournalcastError {
    JournalcastError::InvalidInput("memory source lock poisoned".to_string())
}

#[async_trait]
impl ContentSource for MemorySource {
    async fn fetch_ready(&self, date: NaiveDate) -> Result<Option<JournalRecord>> {
        let entries = self.entries.lock().map_err(poisoned)?;
        Ok(entries
            .iter()
            .find(|e| e.date == date && e.status == EntryStatus::Ready)
            .map(|e| e.record.clone()))
    }

    async fn update_status(&self, id: &str, status: EntryStatus) -> Result<()> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        let entry = entries
            .iter_mut()
            .find(|e| e.record.id == id)
            .ok_or_else(|| JournalcastError::InvalidInput(format!("unknown entry {}", id)))?;
        entry.status = status;
        drop(entries);

        self.updates
            .lock()
            .map_err(poisoned)?
            .push((id.to_string(), status));
        debug!(id, status = %status, "Updated entry status");
        Ok(())
    }

    async fn has_entry(&self, date: NaiveDate) -> Result<bool> {
        let entries = self.entries.lock().map_err(poisoned)?;
        Ok(entries.iter().any(|e| e.date == date))
    }
}
