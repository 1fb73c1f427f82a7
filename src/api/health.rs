//! Shared health state for the /health endpoint.
//! Updated by the refresher, read by the API.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct HealthState {
    /// Unix seconds of the last successful publish (0 = never).
    pub last_refresh_at_secs: AtomicU64,
    /// Refreshes that finished and were published.
    pub refreshes_completed: AtomicU64,
    /// Refreshes aborted because a newer request superseded them.
    pub refreshes_superseded: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_refresh(&self, at_secs: u64) {
        self.last_refresh_at_secs.store(at_secs, Ordering::Relaxed);
        self.refreshes_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_superseded(&self) {
        self.refreshes_superseded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_refresh_at_secs(&self) -> u64 {
        self.last_refresh_at_secs.load(Ordering::Relaxed)
    }

    pub fn refreshes_completed(&self) -> u64 {
        self.refreshes_completed.load(Ordering::Relaxed)
    }

    pub fn refreshes_superseded(&self) -> u64 {
        self.refreshes_superseded.load(Ordering::Relaxed)
    }
}
