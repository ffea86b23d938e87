//! Observed chain tip tracking.
//!
//! The gateway does not sync the chain itself; it only observes
//! `idx:latest` moving as the indexer writes. [`ChainStatus`] records
//! the highest height seen and when it last advanced so the health
//! endpoint can report staleness.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

#[derive(Debug)]
pub struct ChainStatus {
    tip: AtomicU64,
    last_advance: AtomicU64,
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

impl ChainStatus {
    #[must_use]
    pub fn new() -> Self {
        Self { tip: AtomicU64::new(0), last_advance: AtomicU64::new(unix_now()) }
    }

    /// Records an observed height. The advance timestamp only moves
    /// when the height actually increases.
    pub fn observe(&self, height: u64) {
        let prev = self.tip.fetch_max(height, Ordering::AcqRel);
        if height > prev {
            self.last_advance.store(unix_now(), Ordering::Release);
        }
    }

    #[must_use]
    pub fn tip(&self) -> u64 {
        self.tip.load(Ordering::Acquire)
    }

    /// Seconds since the observed tip last advanced.
    #[must_use]
    pub fn seconds_since_advance(&self) -> u64 {
        unix_now().saturating_sub(self.last_advance.load(Ordering::Acquire))
    }
}

impl Default for ChainStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_tracks_maximum() {
        let status = ChainStatus::new();
        status.observe(10);
        status.observe(5);
        assert_eq!(status.tip(), 10);
        status.observe(11);
        assert_eq!(status.tip(), 11);
    }

    #[test]
    fn fresh_status_is_not_stale() {
        let status = ChainStatus::new();
        status.observe(1);
        assert!(status.seconds_since_advance() < 2);
    }
}
