//! Global atomic counters for reconciliation runs.
//!
//! Counters are incremented at the call site after real writes. Call
//! [`Metrics::flush`] to emit and zero them as one `tracing::info!` event;
//! the coordinator does so once per run, so each event covers one run.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    installs: AtomicU64,
    updates: AtomicU64,
    skips: AtomicU64,
    failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            installs: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            skips: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn inc_installs(&self) {
        self.installs.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "installs", "counter incremented");
    }

    pub fn inc_updates(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "updates", "counter incremented");
    }

    /// Skips of any kind, expected failures included.
    pub fn inc_skips(&self) {
        self.skips.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "skips", "counter incremented");
    }

    pub fn inc_failures(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "failures", "counter incremented");
    }

    /// Emit the counts since the previous flush as a single `info!` event
    /// and start counting from zero.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            installs = self.installs.swap(0, Ordering::Relaxed),
            updates = self.updates.swap(0, Ordering::Relaxed),
            skips = self.skips.swap(0, Ordering::Relaxed),
            failures = self.failures.swap(0, Ordering::Relaxed),
        );
    }

    pub fn installs(&self) -> u64 {
        self.installs.load(Ordering::Relaxed)
    }

    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    pub fn skips(&self) -> u64 {
        self.skips.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_installs();
        m.inc_installs();
        m.inc_updates();
        m.inc_skips();
        m.inc_failures();
        assert_eq!(m.installs(), 2);
        assert_eq!(m.updates(), 1);
        assert_eq!(m.skips(), 1);
        assert_eq!(m.failures(), 1);
    }

    #[test]
    fn flush_starts_the_next_run_from_zero() {
        let m = Metrics::new();
        m.inc_installs();
        m.inc_failures();
        m.flush();
        assert_eq!(m.installs(), 0);
        assert_eq!(m.failures(), 0);

        m.inc_updates();
        assert_eq!(m.updates(), 1);
        assert_eq!(m.installs(), 0);
    }
}
