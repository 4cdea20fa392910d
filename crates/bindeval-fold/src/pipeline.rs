//! Evaluation of one fetched work unit.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use bindeval_core::{
    aggregate_folders, build_catalog, extract_accepted, rank_designs, Design, Diagnostic,
    JoinKey, SequenceExtractor, StatsOutcome,
};
use serde::Serialize;
use tracing::info;

use crate::error::UnitError;
use crate::submitter::{DesignScore, JobOutcome, PredictionSubmitter};

/// Per-unit job counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub submitted: usize,
    pub cache_hits: usize,
    pub failed: usize,
}

impl JobCounts {
    fn tally(scores: &[DesignScore]) -> Self {
        let mut counts = Self::default();
        for s in scores {
            match s.outcome {
                JobOutcome::Submitted => counts.submitted += 1,
                JobOutcome::CacheHit => counts.cache_hits += 1,
                JobOutcome::Failed | JobOutcome::TimedOut => counts.failed += 1,
                JobOutcome::ClaimHeld | JobOutcome::Skipped => {}
            }
        }
        counts
    }
}

/// Ranked rows of one unit, ready for the ledger.
#[derive(Debug, Clone)]
pub struct UnitEvaluation {
    pub unit_id: String,
    pub designs: Vec<Design>,
    pub jobs: JobCounts,
    pub diagnostics: Vec<Diagnostic>,
}

impl UnitEvaluation {
    pub fn scored(&self) -> usize {
        self.designs
            .iter()
            .filter(|d| d.interface_score.is_some())
            .count()
    }
}

#[derive(Debug, Clone)]
pub enum UnitOutcome {
    Evaluated(UnitEvaluation),
    /// No readable stats table; nothing to record.
    NoData { warnings: Vec<Diagnostic> },
}

/// Stats -> sequences -> catalog -> scores -> ranking for one unit.
pub struct UnitPipeline {
    submitter: Arc<PredictionSubmitter>,
    extractor: Arc<dyn SequenceExtractor>,
    join_key: JoinKey,
}

impl UnitPipeline {
    pub fn new(
        submitter: Arc<PredictionSubmitter>,
        extractor: Arc<dyn SequenceExtractor>,
        join_key: JoinKey,
    ) -> Self {
        Self {
            submitter,
            extractor,
            join_key,
        }
    }

    /// Evaluate `unit_id`, whose files live in `local_root/unit_id`.
    pub async fn evaluate_unit(
        &self,
        local_root: &std::path::Path,
        unit_id: &str,
    ) -> Result<UnitOutcome, UnitError> {
        let unit_dir: PathBuf = local_root.join(unit_id);

        let (table, mut diagnostics) =
            match aggregate_folders(local_root, &[unit_id.to_string()]) {
                StatsOutcome::Table { table, warnings } => (table, warnings),
                StatsOutcome::NoData { warnings } => {
                    info!(unit_id = %unit_id, "no stats table, unit skipped");
                    return Ok(UnitOutcome::NoData { warnings });
                }
            };

        let scan = extract_accepted(&unit_dir, self.extractor.as_ref())?;
        diagnostics.extend(scan.diagnostics);

        let catalog = build_catalog(unit_id, &table, &scan.records, self.join_key)?;
        diagnostics.extend(catalog.diagnostics.iter().cloned());

        let scores = self.submitter.score_designs(&catalog.designs).await;
        let jobs = JobCounts::tally(&scores);
        let by_id: HashMap<String, Option<f64>> = scores
            .iter()
            .map(|s| (s.design_id.clone(), s.score))
            .collect();
        diagnostics.extend(scores.into_iter().flat_map(|s| s.diagnostics));

        let ranked = rank_designs(catalog, &by_id);
        diagnostics.extend(ranked.diagnostics);

        Ok(UnitOutcome::Evaluated(UnitEvaluation {
            unit_id: unit_id.to_string(),
            designs: ranked.designs,
            jobs,
            diagnostics,
        }))
    }
}
