//! Consumer statistics
//!
//! Counters are plain atomic increments so the hot path never blocks.
//! `last_message_time` is the only overwritten field and sits behind a
//! short-lived lock that is never held across await points.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters updated by the pump and connection manager
#[derive(Debug, Default)]
pub struct StatsCollector {
    messages_received: AtomicU64,
    messages_processed: AtomicU64,
    messages_failed: AtomicU64,
    connection_errors: AtomicU64,
    last_message_time: parking_lot::RwLock<Option<DateTime<Utc>>>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a delivery and stamp its arrival time
    pub fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::SeqCst);
        *self.last_message_time.write() = Some(Utc::now());
    }

    pub fn record_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_failed(&self) {
        self.messages_failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::SeqCst);
    }

    pub fn received(&self) -> u64 {
        self.messages_received.load(Ordering::SeqCst)
    }

    pub fn processed(&self) -> u64 {
        self.messages_processed.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> u64 {
        self.messages_failed.load(Ordering::SeqCst)
    }

    pub fn connection_errors(&self) -> u64 {
        self.connection_errors.load(Ordering::SeqCst)
    }

    pub fn last_message_time(&self) -> Option<DateTime<Utc>> {
        *self.last_message_time.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = StatsCollector::new();
        assert!(stats.last_message_time().is_none());

        stats.record_received();
        stats.record_received();
        stats.record_processed();
        stats.record_failed();
        stats.record_connection_error();

        assert_eq!(stats.received(), 2);
        assert_eq!(stats.processed(), 1);
        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.connection_errors(), 1);
        assert!(stats.last_message_time().is_some());
    }
}
