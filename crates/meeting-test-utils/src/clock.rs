//! Wall clock driven by tokio time.
//!
//! Under `start_paused = true`, `tokio::time::advance` moves this clock too,
//! so countdown ticks and "now" stay in step.

use chrono::{DateTime, Utc};
use meeting_client::clock::Clock;
use tokio::time::Instant;

/// `base` plus the tokio time elapsed since construction.
#[derive(Debug, Clone, Copy)]
pub struct AnchoredClock {
    base: DateTime<Utc>,
    anchor: Instant,
}

impl AnchoredClock {
    #[must_use]
    pub fn starting_at(base: DateTime<Utc>) -> Self {
        Self {
            base,
            anchor: Instant::now(),
        }
    }
}

impl Clock for AnchoredClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.anchor.elapsed())
            .expect("elapsed test time fits in chrono::Duration");
        self.base + elapsed
    }
}
