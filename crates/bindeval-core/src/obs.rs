//! Structured observability hooks for the evaluation lifecycle.
//!
//! This module provides:
//! - Unit-scoped tracing spans via the `UnitSpan` RAII guard
//! - Emission functions for unit, job, ledger and run lifecycle events
//!
//! Every event carries an `event` field (`unit.started`, `job.cache_hit`, ...)
//! so JSON logs can be filtered without parsing messages.

use tracing::{info, warn};

/// RAII guard that enters a unit-scoped tracing span.
///
/// # Example
///
/// ```ignore
/// let _span = UnitSpan::enter("2501_batch");
/// // all tracing calls now carry unit_id = "2501_batch"
/// ```
pub struct UnitSpan {
    _span: tracing::span::EnteredSpan,
}

impl UnitSpan {
    /// Create and enter a span tagged with the unit id.
    pub fn enter(unit_id: &str) -> Self {
        let span = tracing::info_span!("bindeval.unit", unit_id = %unit_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Span to attach to async unit work with `Instrument::instrument`.
pub fn unit_span(unit_id: &str) -> tracing::Span {
    tracing::info_span!("bindeval.unit", unit_id = %unit_id)
}

pub fn emit_unit_started(unit_id: &str) {
    info!(event = "unit.started", unit_id = %unit_id);
}

/// Emit event: unit finished with its outcome label and design counts.
pub fn emit_unit_finished(unit_id: &str, outcome: &str, designs: usize, scored: usize) {
    info!(
        event = "unit.finished",
        unit_id = %unit_id,
        outcome = %outcome,
        designs = designs,
        scored = scored,
    );
}

pub fn emit_job_submitted(design_id: &str) {
    info!(event = "job.submitted", design_id = %design_id);
}

pub fn emit_job_cache_hit(design_id: &str, archive: &str) {
    info!(event = "job.cache_hit", design_id = %design_id, archive = %archive);
}

/// Emit event: job failed or timed out (warning level).
pub fn emit_job_failed(design_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "job.failed", design_id = %design_id, error = %error);
}

pub fn emit_ledger_flushed(path: &str, rows: usize) {
    info!(event = "ledger.flushed", path = %path, rows = rows);
}

/// Emit event: run finished with unit counts and duration.
pub fn emit_run_finished(
    run_id: &str,
    duration_ms: u64,
    succeeded: usize,
    skipped: usize,
    failed: usize,
) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        succeeded = succeeded,
        skipped = skipped,
        failed = failed,
    );
}
