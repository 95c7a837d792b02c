//! Fixed-rate heartbeat timer.
//!
//! [`Heartbeat`] owns at most one running timer. The client awaits
//! [`Heartbeat::tick`] inside its `tokio::select!` loop and sends a
//! `heartbeat` envelope each time it resolves. While no timer is running
//! `tick` pends forever, so the select loop only wakes for inbound messages.

use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::error::{Result, WorkerLinkError};

/// Longest supported tick period. Longer rates are clamped to this.
pub const MAX_RATE: Duration = Duration::from_secs(24 * 60 * 60);

/// Single repeating timer for liveness messages.
#[derive(Debug)]
pub struct Heartbeat {
    rate: Duration,
    /// Deadline of the next tick; `Some` while running.
    next: Option<Instant>,
}

impl Heartbeat {
    /// Create a stopped timer that will tick every `rate` once started.
    ///
    /// `rate` is clamped to at most [`MAX_RATE`].
    pub fn new(rate: Duration) -> Self {
        Self {
            rate: rate.min(MAX_RATE),
            next: None,
        }
    }

    /// The configured tick period.
    pub fn rate(&self) -> Duration {
        self.rate
    }

    /// Returns `true` while a timer is running.
    pub fn is_running(&self) -> bool {
        self.next.is_some()
    }

    /// Start the timer. The first tick fires one full period from now.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerLinkError::HeartbeatAlreadyRunning`] if a timer exists.
    pub fn start(&mut self) -> Result<()> {
        if self.next.is_some() {
            return Err(WorkerLinkError::HeartbeatAlreadyRunning);
        }
        self.next = Some(Instant::now() + self.rate);
        trace!(rate = ?self.rate, "heartbeat started");
        Ok(())
    }

    /// Cancel the timer. Safe to call when nothing is running.
    pub fn stop(&mut self) {
        if self.next.take().is_some() {
            trace!("heartbeat stopped");
        }
    }

    /// Wait for the next tick.
    ///
    /// Cancel-safe: dropping the future before it resolves leaves the
    /// deadline untouched. Ticks missed while the caller was busy are
    /// skipped, not replayed.
    pub async fn tick(&mut self) {
        let Some(deadline) = self.next else {
            return std::future::pending().await;
        };
        tokio::time::sleep_until(deadline).await;

        let now = Instant::now();
        let mut next = deadline + self.rate;
        if next <= now {
            next = now + self.rate;
        }
        self.next = Some(next);
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    const RATE: Duration = Duration::from_millis(1000);

    #[test]
    fn start_twice_fails() {
        let mut hb = Heartbeat::new(RATE);
        hb.start().unwrap();
        let err = hb.start().unwrap_err();
        assert!(matches!(err, WorkerLinkError::HeartbeatAlreadyRunning));
        assert!(hb.is_running());
    }

    #[test]
    fn stop_is_idempotent() {
        let mut hb = Heartbeat::new(RATE);
        hb.stop();
        hb.start().unwrap();
        hb.stop();
        hb.stop();
        assert!(!hb.is_running());
        // A stopped timer can be started again.
        hb.start().unwrap();
    }

    #[test]
    fn oversized_rate_is_clamped_and_starts() {
        let mut hb = Heartbeat::new(Duration::MAX);
        assert_eq!(hb.rate(), MAX_RATE);
        hb.start().unwrap();
        assert!(hb.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn clamped_rate_ticks_once_per_day() {
        let mut hb = Heartbeat::new(Duration::MAX);
        hb.start().unwrap();
        let started = Instant::now();

        hb.tick().await;
        assert_eq!(started.elapsed(), MAX_RATE);
        hb.tick().await;
        assert_eq!(started.elapsed(), MAX_RATE * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_fires_after_one_period() {
        let mut hb = Heartbeat::new(RATE);
        hb.start().unwrap();
        let started = Instant::now();

        hb.tick().await;
        assert_eq!(started.elapsed(), RATE);

        hb.tick().await;
        assert_eq!(started.elapsed(), RATE * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_timer_never_ticks() {
        let mut hb = Heartbeat::new(RATE);
        let mut fut = task::spawn(hb.tick());
        assert_pending!(fut.poll());

        tokio::time::advance(RATE * 10).await;
        assert_pending!(fut.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn tick_is_ready_once_deadline_passes() {
        let mut hb = Heartbeat::new(RATE);
        hb.start().unwrap();

        tokio::time::advance(RATE).await;
        let mut fut = task::spawn(hb.tick());
        assert_ready!(fut.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn missed_ticks_are_skipped() {
        let mut hb = Heartbeat::new(RATE);
        hb.start().unwrap();
        let started = Instant::now();

        tokio::time::advance(RATE * 5 + Duration::from_millis(10)).await;
        // Late tick resolves immediately, then the schedule restarts from now.
        hb.tick().await;
        let late = started.elapsed();
        hb.tick().await;
        assert_eq!(started.elapsed(), late + RATE);
    }
}
