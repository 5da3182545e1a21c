use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::sample::seconds_between;

/// Throttles scrub updates so small jitters of the playback clock do not
/// trigger a lookup each time.
#[derive(Debug, Clone)]
pub struct PlaybackCursor {
    min_update_delta: Duration,
    last_update: Option<DateTime<Utc>>,
}

impl PlaybackCursor {
    pub fn new(min_update_delta: Duration) -> Self {
        Self {
            min_update_delta,
            last_update: None,
        }
    }

    /// Unconditionally moves the cursor to `time`.
    pub fn start(&mut self, time: DateTime<Utc>) {
        self.last_update = Some(time);
    }

    /// Moves the cursor if `time` is far enough from the last update.
    /// Returns true when the caller should look up a new frame.
    pub fn update(&mut self, time: DateTime<Utc>) -> bool {
        let due = match self.last_update {
            None => true,
            Some(last) => seconds_between(time, last)
                .map(|delta| delta.abs() >= self.min_update_delta.as_secs_f64())
                .unwrap_or(true),
        };
        if due {
            self.last_update = Some(time);
        }
        due
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }
}
