//! Helpers for the periodic triggers
//!
//! [`RunGate`] keeps two runs of the same job from overlapping: a trigger that
//! finds the gate held is skipped rather than queued.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, NaiveTime, TimeZone};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Non-blocking mutual exclusion for one job
#[derive(Debug, Clone, Default)]
pub struct RunGate {
    lock: Arc<Mutex<()>>,
}

/// Held for the duration of a run
pub type RunPermit = OwnedMutexGuard<()>;

impl RunGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the gate if free
    pub fn try_enter(&self) -> Option<RunPermit> {
        self.lock.clone().try_lock_owned().ok()
    }

    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    /// Wait until any run in progress has finished
    pub async fn wait_idle(&self) {
        let _idle = self.lock.lock().await;
    }
}

/// Next occurrence of wall-clock time `at` strictly after `now`
///
/// Days where `at` falls in a DST gap fire at the first valid instant after it.
pub fn next_daily_at<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut day = now.date_naive();
    loop {
        let mut naive = day.and_time(at);
        let resolved = loop {
            if let Some(found) = tz.from_local_datetime(&naive).earliest() {
                break found;
            }
            naive += chrono::Duration::minutes(30);
        };
        if resolved > *now {
            return resolved;
        }
        day = match day.checked_add_days(Days::new(1)) {
            Some(next) => next,
            None => return resolved,
        };
    }
}

/// Time to wait from `now` until the next `at`
pub fn until_next_daily<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> Duration {
    (next_daily_at(now, at) - now.clone())
        .to_std()
        .unwrap_or(Duration::ZERO)
}
