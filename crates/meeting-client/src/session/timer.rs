//! Countdown timer owned by the session actor.
//!
//! Each timer carries a generation number. The actor holds at most one
//! timer and ignores ticks whose generation is not the live one, so a tick
//! already queued when a timer is replaced or cancelled is never acted on.

use crate::observability::metrics;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Recurring tick source for one countdown.
///
/// Dropping the timer cancels it.
#[derive(Debug)]
pub struct CountdownTimer {
    generation: u64,
    cancel_token: CancellationToken,
    task: JoinHandle<()>,
}

impl CountdownTimer {
    /// Start ticking every `period`, sending `generation` on `ticks`.
    ///
    /// The first tick fires immediately.
    pub fn spawn(generation: u64, period: Duration, ticks: mpsc::Sender<u64>) -> Self {
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;

                    () = token.cancelled() => break,

                    _ = interval.tick() => {
                        if token.is_cancelled() || ticks.send(generation).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        metrics::timer_started();
        debug!(target: "meet.session", generation, "Countdown timer started");

        Self {
            generation,
            cancel_token,
            task,
        }
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stop the timer. Consumes it, so a timer is cancelled exactly once.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        self.task.abort();
        metrics::timer_stopped();
        debug!(target: "meet.session", generation = self.generation, "Countdown timer stopped");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_carry_generation() {
        let (tx, mut rx) = mpsc::channel(8);
        let timer = CountdownTimer::spawn(7, Duration::from_secs(1), tx);

        assert_eq!(rx.recv().await, Some(7));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(rx.recv().await, Some(7));

        timer.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tick_after_cancel() {
        let (tx, mut rx) = mpsc::channel(8);
        let timer = CountdownTimer::spawn(1, Duration::from_secs(1), tx);
        assert_eq!(rx.recv().await, Some(1));

        timer.cancel();
        tokio::time::advance(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;

        // The task dropped its sender; nothing was sent after cancellation.
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let (tx, mut rx) = mpsc::channel(8);
        {
            let _timer = CountdownTimer::spawn(3, Duration::from_secs(1), tx);
            assert_eq!(rx.recv().await, Some(3));
        }
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(rx.recv().await, None);
    }
}
