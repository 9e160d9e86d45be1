//! Reconnect scheduling with linear backoff
//!
//! Owns the backoff state shared between the connection manager and the
//! consume loop: an attempt counter, an "armed" flag guaranteeing at most
//! one in-flight timer, and a cancelled flag observed by a timer that
//! fires after shutdown. Attempt N waits N times the base interval; once
//! the counter reaches the configured maximum no further timers are armed
//! until a successful connect resets it.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

pub struct ReconnectScheduler {
    base_interval: Duration,
    max_attempts: u32,
    attempts: AtomicU32,
    armed: AtomicBool,
    cancelled: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl ReconnectScheduler {
    pub fn new(base_interval: Duration, max_attempts: u32) -> Self {
        Self {
            base_interval,
            max_attempts,
            attempts: AtomicU32::new(0),
            armed: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            timer: Mutex::new(None),
        }
    }

    /// Claim the single timer slot and advance the attempt counter.
    ///
    /// Returns the delay to wait before the next connect attempt, or
    /// `None` when a timer is already armed, attempts are exhausted, or
    /// the scheduler has been cancelled. Exactly one caller wins when
    /// failure notifications race.
    pub fn arm(&self) -> Option<Duration> {
        if self.cancelled.load(Ordering::SeqCst) {
            return None;
        }

        if self
            .armed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }

        if self.attempts.load(Ordering::SeqCst) >= self.max_attempts {
            self.armed.store(false, Ordering::SeqCst);
            warn!(
                max_attempts = self.max_attempts,
                "Max reconnection attempts reached"
            );
            return None;
        }

        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        Some(self.base_interval * attempt)
    }

    /// Release the timer slot; called when the armed timer fires.
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    /// Forgive prior failures; called on every successful connect.
    pub fn reset(&self) {
        self.attempts.store(0, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts.load(Ordering::SeqCst) >= self.max_attempts
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Permanently stop scheduling and abort any outstanding timer.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
    }

    /// Track the spawned timer task so cancel() can abort it.
    pub fn set_timer(&self, handle: JoinHandle<()>) {
        *self.timer.lock() = Some(handle);
    }
}
