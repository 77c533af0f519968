//! Daily "no entry yet" reminder

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::notify::{send_best_effort, Notifier, Reminder};
use crate::source::ContentSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderOutcome {
    /// An entry exists for the day, nothing sent
    EntryExists,
    Sent,
    /// Delivery failed; logged, not propagated
    SendFailed,
}

/// Send a reminder for `date` unless an entry, in any status, already exists
///
/// # Errors
///
/// Only a failure to query the source is returned. Delivery problems are
/// reported through [`ReminderOutcome::SendFailed`].
pub async fn remind(
    source: &dyn ContentSource,
    notifier: &dyn Notifier,
    date: NaiveDate,
) -> Result<ReminderOutcome> {
    if source.has_entry(date).await? {
        info!(date = %date, "Journal entry exists, no reminder needed");
        return Ok(ReminderOutcome::EntryExists);
    }

    info!(date = %date, "No journal entry yet, sending reminder");
    if send_best_effort(notifier, &Reminder::new(date)).await {
        Ok(ReminderOutcome::Sent)
    } else {
        Ok(ReminderOutcome::SendFailed)
    }
}
