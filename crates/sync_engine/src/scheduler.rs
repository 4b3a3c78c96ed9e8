//! Single re-armable round deadline.
//!
//! The armed deadline lives inside the round state (guarded by the round
//! lock); the scheduler task only learns about changes through a `watch`
//! channel and, once the deadline passes, asks the owner to fire. Firing
//! never blocks on the round lock: on contention the task retries after
//! [`RETRY_INTERVAL`].

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

/// Retry delay when the round lock is held at firing time.
pub const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Longest delay a deadline can be armed with.
pub const MAX_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Round deadline stored next to the slot maps.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// Replace any pending deadline with one `secs` from `now`.
    ///
    /// Non-positive durations are due immediately; longer ones are capped
    /// at [`MAX_DELAY`].
    pub fn arm(&mut self, now: Instant, secs: f64) -> Instant {
        let delay = if secs > 0.0 {
            Duration::try_from_secs_f64(secs).map_or(MAX_DELAY, |d| d.min(MAX_DELAY))
        } else {
            Duration::ZERO
        };
        // Instant 溢出时立即到期
        let at = now.checked_add(delay).unwrap_or(now);
        self.0 = Some(at);
        at
    }

    pub fn cancel(&mut self) {
        self.0 = None;
    }

    pub fn at(&self) -> Option<Instant> {
        self.0
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.0.is_some_and(|at| at <= now)
    }
}

/// Result of one firing attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// The round was closed.
    Fired,
    /// The round lock was held elsewhere.
    Contended,
    /// Nothing due (cancelled or re-armed meanwhile).
    Idle,
    /// The owner is gone.
    Stopped,
}

/// Deadline notifier shared with the round owner.
#[derive(Debug)]
pub struct TimeoutScheduler {
    tx: watch::Sender<Option<Instant>>,
}

impl TimeoutScheduler {
    pub fn new() -> (Self, watch::Receiver<Option<Instant>>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, rx)
    }

    /// Publish the current deadline. Call while holding the round lock.
    pub fn notify(&self, deadline: Deadline) {
        self.tx.send_replace(deadline.at());
    }

    /// Run the firing loop on the ambient runtime.
    ///
    /// `fire` is invoked once the observed deadline has passed; it must not
    /// block on the round lock.
    pub fn spawn<F>(mut rx: watch::Receiver<Option<Instant>>, fire: F) -> JoinHandle<()>
    where
        F: Fn(Instant) -> FireOutcome + Send + 'static,
    {
        tokio::spawn(async move {
            let mut armed = *rx.borrow_and_update();
            loop {
                tokio::select! {
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        armed = *rx.borrow_and_update();
                    }
                    _ = sleep_until(armed.unwrap_or_else(Instant::now)), if armed.is_some() => {
                        match fire(Instant::now()) {
                            FireOutcome::Contended => {
                                trace!("round lock busy, retrying deadline");
                                armed = Some(Instant::now() + RETRY_INTERVAL);
                            }
                            FireOutcome::Fired | FireOutcome::Idle => armed = None,
                            FireOutcome::Stopped => break,
                        }
                    }
                }
            }
            trace!("timeout scheduler stopped");
        })
    }
}
