//! Global atomic counters for bindeval observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a run).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    jobs_submitted: AtomicU64,
    cache_hits: AtomicU64,
    job_failures: AtomicU64,
    scores_extracted: AtomicU64,
    units_recorded: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            jobs_submitted: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            job_failures: AtomicU64::new(0),
            scores_extracted: AtomicU64::new(0),
            units_recorded: AtomicU64::new(0),
        }
    }

    /// A prediction job was handed to the engine.
    pub fn inc_jobs_submitted(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "jobs_submitted", "counter incremented");
    }

    /// A design was served from the prediction cache.
    pub fn inc_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cache_hits", "counter incremented");
    }

    /// A prediction job failed or timed out.
    pub fn inc_job_failures(&self) {
        self.job_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "job_failures", "counter incremented");
    }

    pub fn inc_scores_extracted(&self) {
        self.scores_extracted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "scores_extracted", "counter incremented");
    }

    pub fn inc_units_recorded(&self) {
        self.units_recorded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "units_recorded", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (end of a run) rather than on every
    /// increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            jobs_submitted = self.jobs_submitted(),
            cache_hits = self.cache_hits(),
            job_failures = self.job_failures(),
            scores_extracted = self.scores_extracted(),
            units_recorded = self.units_recorded(),
        );
    }

    pub fn jobs_submitted(&self) -> u64 {
        self.jobs_submitted.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn job_failures(&self) -> u64 {
        self.job_failures.load(Ordering::Relaxed)
    }

    pub fn scores_extracted(&self) -> u64 {
        self.scores_extracted.load(Ordering::Relaxed)
    }

    pub fn units_recorded(&self) -> u64 {
        self.units_recorded.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.jobs_submitted.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.job_failures.store(0, Ordering::Relaxed);
        self.scores_extracted.store(0, Ordering::Relaxed);
        self.units_recorded.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment() {
        let m = Metrics::new();
        assert_eq!(m.jobs_submitted(), 0);
        m.inc_jobs_submitted();
        m.inc_jobs_submitted();
        assert_eq!(m.jobs_submitted(), 2);

        m.inc_cache_hits();
        assert_eq!(m.cache_hits(), 1);

        m.inc_job_failures();
        m.inc_scores_extracted();
        m.inc_units_recorded();
        m.inc_units_recorded();
        assert_eq!(m.job_failures(), 1);
        assert_eq!(m.scores_extracted(), 1);
        assert_eq!(m.units_recorded(), 2);
    }

    #[test]
    fn test_reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_jobs_submitted();
        m.inc_cache_hits();
        m.inc_job_failures();
        m.reset();
        assert_eq!(m.jobs_submitted(), 0);
        assert_eq!(m.cache_hits(), 0);
        assert_eq!(m.job_failures(), 0);
    }
}
