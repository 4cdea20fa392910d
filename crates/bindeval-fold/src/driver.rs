//! Incremental run driver.
//!
//! One run: load the ledger, diff the remote listing against the processed
//! units, evaluate new units with bounded parallelism and merge each result
//! through a single writer. A unit is marked processed only after the ledger
//! and binder export holding its rows have been written.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use bindeval_core::{
    emit_ledger_flushed, emit_run_finished, emit_unit_finished, emit_unit_started, unit_span,
    write_binder_fasta, Design, Diagnostic, EvalError, Ledger, MergeOutcome, Stage, UnitState,
    WorkTracker, WorkUnit, METRICS,
};
use bindeval_state::RemoteStore;
use chrono::{DateTime, Utc};
use futures::{future, StreamExt};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::error::{RunError, UnitError};
use crate::pipeline::{UnitEvaluation, UnitOutcome, UnitPipeline};

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Remote prefix holding one folder per work unit.
    pub remote_prefix: String,
    /// Local mirror; unit `u` lives in `local_root/u`.
    pub local_root: PathBuf,
    pub ledger_path: PathBuf,
    pub binder_fasta_path: PathBuf,
    pub max_parallel_units: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitFailure {
    pub unit_id: String,
    pub error: String,
}

/// Summary of one run. Always produced, even when nothing was new.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub discovered: Vec<String>,
    pub succeeded: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<UnitFailure>,
    /// Discovered but never dispatched because of a shutdown request.
    pub not_started: Vec<String>,
    pub designs_recorded: usize,
    pub designs_scored: usize,
    pub designs_unscored: usize,
    pub jobs_submitted: usize,
    pub cache_hits: usize,
    pub job_failures: usize,
    /// Per-unit diagnostics.
    pub diagnostics: BTreeMap<String, Vec<Diagnostic>>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            duration_ms: 0,
            discovered: Vec::new(),
            succeeded: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            not_started: Vec::new(),
            designs_recorded: 0,
            designs_scored: 0,
            designs_unscored: 0,
            jobs_submitted: 0,
            cache_hits: 0,
            job_failures: 0,
            diagnostics: BTreeMap::new(),
        }
    }

    pub fn no_new_work(&self) -> bool {
        self.discovered.is_empty()
    }

    pub fn diagnostic_count(&self) -> usize {
        self.diagnostics.values().map(Vec::len).sum()
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        if self.no_new_work() {
            return "no new work units".to_string();
        }
        let mut line = format!(
            "{} discovered: {} succeeded, {} skipped, {} failed; {} designs recorded ({} scored, {} unscored); {} jobs submitted, {} cache hits, {} job failures",
            self.discovered.len(),
            self.succeeded.len(),
            self.skipped.len(),
            self.failed.len(),
            self.designs_recorded,
            self.designs_scored,
            self.designs_unscored,
            self.jobs_submitted,
            self.cache_hits,
            self.job_failures,
        );
        if !self.not_started.is_empty() {
            line.push_str(&format!("; {} not started (interrupted)", self.not_started.len()));
        }
        line
    }

    fn push_diagnostics(&mut self, unit_id: &str, diagnostics: Vec<Diagnostic>) {
        if !diagnostics.is_empty() {
            self.diagnostics
                .entry(unit_id.to_string())
                .or_default()
                .extend(diagnostics);
        }
    }
}

pub struct IncrementalRunner {
    remote: Arc<dyn RemoteStore>,
    pipeline: Arc<UnitPipeline>,
    config: RunnerConfig,
}

async fn has_entries(dir: &Path) -> bool {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
        Err(_) => false,
    }
}

impl IncrementalRunner {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        pipeline: Arc<UnitPipeline>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            remote,
            pipeline,
            config,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Process every unit not yet in the ledger, plus `forced` units.
    ///
    /// Setting `shutdown` to `true` stops dispatching; units already in
    /// flight finish and are flushed.
    pub async fn run(
        &self,
        forced: &[String],
        shutdown: watch::Receiver<bool>,
    ) -> Result<RunReport, RunError> {
        let started = Instant::now();
        let mut report = RunReport::new();

        let mut ledger = Ledger::load(&self.config.ledger_path).map_err(RunError::Ledger)?;
        let mut tracker = WorkTracker::from_ledger(&ledger);
        let new_units = tracker
            .discover(self.remote.as_ref(), &self.config.remote_prefix, forced)
            .await
            .map_err(RunError::Discovery)?;
        report.discovered = new_units.clone();

        if new_units.is_empty() {
            info!(run_id = %report.run_id, processed = tracker.processed().len(), "no new work units");
        }

        let mut results = futures::stream::iter(new_units.clone())
            .take_while(|_| future::ready(!*shutdown.borrow()))
            .map(|unit_id| self.process_unit(unit_id))
            .buffered(self.config.max_parallel_units.max(1));

        while let Some((unit_id, result)) = results.next().await {
            match result {
                Err(e) => {
                    warn!(unit_id = %unit_id, error = %e, "unit failed; it will be retried next run");
                    emit_unit_finished(&unit_id, "failed", 0, 0);
                    report.failed.push(UnitFailure {
                        unit_id,
                        error: e.to_string(),
                    });
                }
                Ok((_, UnitOutcome::NoData { warnings })) => {
                    emit_unit_finished(&unit_id, "skipped", 0, 0);
                    report.push_diagnostics(&unit_id, warnings);
                    report.skipped.push(unit_id);
                }
                Ok((mut unit, UnitOutcome::Evaluated(eval))) => {
                    self.commit(&mut ledger, &mut tracker, &mut unit, eval, &mut report);
                }
            }
        }
        drop(results);

        report.not_started = new_units
            .into_iter()
            .filter(|u| {
                !report.succeeded.contains(u)
                    && !report.skipped.contains(u)
                    && !report.failed.iter().any(|f| &f.unit_id == u)
            })
            .collect();
        if !report.not_started.is_empty() {
            warn!(units = ?report.not_started, "shutdown requested; units left for the next run");
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        emit_run_finished(
            &report.run_id.to_string(),
            report.duration_ms,
            report.succeeded.len(),
            report.skipped.len(),
            report.failed.len(),
        );
        METRICS.flush();
        Ok(report)
    }

    /// Merge one evaluated unit into the ledger and flush it.
    fn commit(
        &self,
        ledger: &mut Ledger,
        tracker: &mut WorkTracker,
        unit: &mut WorkUnit,
        eval: UnitEvaluation,
        report: &mut RunReport,
    ) {
        let unit_id = eval.unit_id.clone();
        let designs = eval.designs.len();
        let scored = eval.scored();
        report.jobs_submitted += eval.jobs.submitted;
        report.cache_hits += eval.jobs.cache_hits;
        report.job_failures += eval.jobs.failed;
        report.push_diagnostics(&unit_id, eval.diagnostics);

        let merge = match self.flush(ledger, &unit_id, eval.designs) {
            Ok(merge) => merge,
            Err(e) => {
                warn!(unit_id = %unit_id, error = %e, "cannot record unit; it will be retried next run");
                emit_unit_finished(&unit_id, "failed", designs, scored);
                report.failed.push(UnitFailure {
                    unit_id,
                    error: e.to_string(),
                });
                return;
            }
        };
        report.push_diagnostics(&unit_id, merge.diagnostics);

        if merge.added == 0 {
            let diag = Diagnostic::warn(Stage::Ledger, None, "no rows recorded for unit");
            report.push_diagnostics(&unit_id, vec![diag]);
            emit_unit_finished(&unit_id, "skipped", designs, scored);
            report.skipped.push(unit_id);
            return;
        }

        if let Err(e) = unit.advance(UnitState::Recorded) {
            debug!(unit_id = %unit_id, error = %e, "unexpected unit state");
        }
        tracker.mark_processed(&unit_id);
        METRICS.inc_units_recorded();
        report.designs_recorded += merge.added;
        report.designs_scored += scored;
        report.designs_unscored += designs - scored;
        emit_unit_finished(&unit_id, "succeeded", designs, scored);
        report.succeeded.push(unit_id);
    }

    /// Merge into a copy, write the binder export, then save the ledger and
    /// adopt the copy. The ledger save is the commit point: a unit whose rows
    /// are not on disk is rediscovered next run.
    fn flush(
        &self,
        ledger: &mut Ledger,
        unit_id: &str,
        designs: Vec<Design>,
    ) -> Result<MergeOutcome, EvalError> {
        let mut staged = ledger.clone();
        let merge = staged.merge_unit(unit_id, designs);
        write_binder_fasta(&self.config.binder_fasta_path, staged.designs())?;
        staged.save(&self.config.ledger_path)?;
        emit_ledger_flushed(&self.config.ledger_path.display().to_string(), staged.len());
        *ledger = staged;
        Ok(merge)
    }

    async fn process_unit(
        &self,
        unit_id: String,
    ) -> (String, Result<(WorkUnit, UnitOutcome), UnitError>) {
        let span = unit_span(&unit_id);
        let result = async {
            emit_unit_started(&unit_id);
            let mut unit = WorkUnit::discovered(unit_id.as_str());
            self.ensure_local(&unit_id).await?;
            unit.advance(UnitState::Fetched)?;
            let outcome = self
                .pipeline
                .evaluate_unit(&self.config.local_root, &unit_id)
                .await?;
            if matches!(outcome, UnitOutcome::Evaluated(_)) {
                unit.advance(UnitState::Evaluated)?;
            }
            Ok::<_, UnitError>((unit, outcome))
        }
        .instrument(span)
        .await;
        (unit_id, result)
    }

    /// Fetch the unit unless a non-empty local copy already exists.
    async fn ensure_local(&self, unit_id: &str) -> Result<(), UnitError> {
        let dest = self.config.local_root.join(unit_id);
        if has_entries(&dest).await {
            debug!(path = %dest.display(), "local copy present; fetch skipped");
            return Ok(());
        }
        let fetched = self
            .remote
            .fetch_folder(&self.config.remote_prefix, unit_id, &dest)
            .await?;
        info!(files = fetched.files, path = %fetched.path.display(), "unit fetched");
        Ok(())
    }
}
