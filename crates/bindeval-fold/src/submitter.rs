//! Prediction cache and submitter.
//!
//! Each design goes through: job input artifact -> cache lookup -> claim ->
//! engine call (bounded and timed) -> cache record -> score extraction.
//! Engine calls across every unit of a run share one semaphore.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bindeval_core::{
    emit_job_cache_hit, emit_job_failed, emit_job_submitted, Design, Diagnostic, Stage, METRICS,
};
use bindeval_state::{CacheEntry, ClaimOutcome, PredictionCache};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::engine::PredictionEngine;
use crate::job::{JobArtifact, JobInput};
use crate::score::extract_interface_score;

/// How a design's score was obtained, or why it has none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    CacheHit,
    Submitted,
    Failed,
    TimedOut,
    /// Another submitter holds the design's claim.
    ClaimHeld,
    /// No job could be built, or the design is already in flight here.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct DesignScore {
    pub design_id: String,
    pub score: Option<f64>,
    pub outcome: JobOutcome,
    pub archive: Option<PathBuf>,
    pub diagnostics: Vec<Diagnostic>,
}

impl DesignScore {
    fn unscored(design_id: &str, outcome: JobOutcome, diagnostic: Diagnostic) -> Self {
        Self {
            design_id: design_id.to_string(),
            score: None,
            outcome,
            archive: None,
            diagnostics: vec![diagnostic],
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    /// Engine calls allowed in flight at once.
    pub max_concurrent_jobs: usize,
    /// Hard limit per engine call.
    pub job_timeout: Duration,
    /// Directory receiving `<design>.fasta` job inputs.
    pub job_inputs_dir: PathBuf,
}

pub struct PredictionSubmitter {
    engine: Arc<dyn PredictionEngine>,
    cache: Arc<dyn PredictionCache>,
    config: SubmitterConfig,
    permits: Arc<Semaphore>,
    in_flight: Mutex<HashSet<String>>,
}

/// Removes a design id from the in-flight set on drop.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    design_id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.design_id);
        }
    }
}

fn job_diag(design_id: &str, message: impl Into<String>) -> Diagnostic {
    Diagnostic::warn(Stage::Job, Some(design_id), message)
}

impl PredictionSubmitter {
    pub fn new(
        engine: Arc<dyn PredictionEngine>,
        cache: Arc<dyn PredictionCache>,
        config: SubmitterConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        Self {
            engine,
            cache,
            config,
            permits,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &SubmitterConfig {
        &self.config
    }

    /// Score every design. Results come back in input order.
    pub async fn score_designs(&self, designs: &[Design]) -> Vec<DesignScore> {
        join_all(designs.iter().map(|d| self.score_one(d))).await
    }

    fn enter(&self, design_id: &str) -> Option<InFlight<'_>> {
        let mut set = self.in_flight.lock().ok()?;
        if !set.insert(design_id.to_string()) {
            return None;
        }
        Some(InFlight {
            set: &self.in_flight,
            design_id: design_id.to_string(),
        })
    }

    async fn score_one(&self, design: &Design) -> DesignScore {
        let id = design.design_id.as_str();
        let job = match JobInput::from_design(design) {
            Ok(job) => job,
            Err(e) => {
                return DesignScore::unscored(
                    id,
                    JobOutcome::Skipped,
                    job_diag(id, format!("no job input: {e}")),
                )
            }
        };
        let artifact = match job.write_artifact(&self.config.job_inputs_dir) {
            Ok(a) => a,
            Err(e) => {
                return DesignScore::unscored(
                    id,
                    JobOutcome::Failed,
                    job_diag(id, format!("cannot write job input: {e}")),
                )
            }
        };

        let Some(_guard) = self.enter(id) else {
            return DesignScore::unscored(
                id,
                JobOutcome::Skipped,
                job_diag(id, "already in flight in this run"),
            );
        };

        match self.cache.lookup(id).await {
            Ok(Some(entry)) => {
                METRICS.inc_cache_hits();
                emit_job_cache_hit(id, &entry.archive.display().to_string());
                return self.scored(id, JobOutcome::CacheHit, entry.archive, Vec::new()).await;
            }
            Ok(None) => {}
            Err(e) => {
                return DesignScore::unscored(
                    id,
                    JobOutcome::Failed,
                    job_diag(id, format!("cache lookup failed: {e}")),
                )
            }
        }

        self.submit(&job, &artifact).await
    }

    async fn submit(&self, job: &JobInput, artifact: &JobArtifact) -> DesignScore {
        let id = job.design_id.as_str();
        let Ok(_permit) = self.permits.clone().acquire_owned().await else {
            return DesignScore::unscored(id, JobOutcome::Failed, job_diag(id, "submitter closed"));
        };

        match self.cache.claim(id).await {
            Ok(ClaimOutcome::Acquired) => {}
            Ok(ClaimOutcome::Held) => {
                return DesignScore::unscored(
                    id,
                    JobOutcome::ClaimHeld,
                    job_diag(id, "claimed by another submitter"),
                )
            }
            Err(e) => {
                return DesignScore::unscored(
                    id,
                    JobOutcome::Failed,
                    job_diag(id, format!("cannot claim design: {e}")),
                )
            }
        }
        // A result recorded between lookup and claim.
        if let Ok(Some(entry)) = self.cache.lookup(id).await {
            self.release(id).await;
            METRICS.inc_cache_hits();
            emit_job_cache_hit(id, &entry.archive.display().to_string());
            return self.scored(id, JobOutcome::CacheHit, entry.archive, Vec::new()).await;
        }

        METRICS.inc_jobs_submitted();
        emit_job_submitted(id);
        let result = tokio::time::timeout(
            self.config.job_timeout,
            self.engine.submit(job, &artifact.path),
        )
        .await;

        let score = match result {
            Ok(Ok(archive)) => {
                let entry = CacheEntry::new(id, archive.clone()).with_digest(&artifact.digest);
                let mut diagnostics = Vec::new();
                match self.cache.record(&entry).await {
                    Ok(true) => {}
                    Ok(false) => debug!(design_id = %id, "cache entry already recorded"),
                    Err(e) => diagnostics.push(job_diag(id, format!("cannot record result: {e}"))),
                }
                self.scored(id, JobOutcome::Submitted, archive, diagnostics).await
            }
            Ok(Err(e)) => {
                METRICS.inc_job_failures();
                emit_job_failed(id, &e);
                DesignScore::unscored(id, JobOutcome::Failed, job_diag(id, format!("job failed: {e}")))
            }
            Err(_) => {
                let message = format!("job timed out after {:?}", self.config.job_timeout);
                METRICS.inc_job_failures();
                emit_job_failed(id, &message);
                DesignScore::unscored(id, JobOutcome::TimedOut, job_diag(id, message))
            }
        };
        self.release(id).await;
        score
    }

    async fn release(&self, design_id: &str) {
        if let Err(e) = self.cache.release(design_id).await {
            warn!(design_id = %design_id, error = %e, "failed to release claim");
        }
    }

    /// Score extraction reads the archive off the async executor.
    async fn scored(
        &self,
        design_id: &str,
        outcome: JobOutcome,
        archive: PathBuf,
        mut diagnostics: Vec<Diagnostic>,
    ) -> DesignScore {
        let path = archive.clone();
        let extracted = tokio::task::spawn_blocking(move || extract_interface_score(&path)).await;
        let score = match extracted {
            Ok(Ok(score)) => {
                METRICS.inc_scores_extracted();
                Some(score)
            }
            Ok(Err(e)) => {
                diagnostics.push(Diagnostic::warn(Stage::Score, Some(design_id), e.to_string()));
                None
            }
            Err(e) => {
                diagnostics.push(Diagnostic::warn(
                    Stage::Score,
                    Some(design_id),
                    format!("score extraction task failed: {e}"),
                ));
                None
            }
        };
        DesignScore {
            design_id: design_id.to_string(),
            score,
            outcome,
            archive: Some(archive),
            diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedEngine;
    use bindeval_state::fakes::MemoryPredictionCache;

    fn design(id: &str, binder: Option<&str>) -> Design {
        let mut d = Design::new(id, "2501_a");
        d.target_sequence = Some("ACDE".into());
        d.binder_sequence = binder.map(String::from);
        d
    }

    fn submitter(
        dir: &std::path::Path,
        engine: Arc<ScriptedEngine>,
        cache: Arc<MemoryPredictionCache>,
        timeout: Duration,
    ) -> PredictionSubmitter {
        PredictionSubmitter::new(
            engine,
            cache,
            SubmitterConfig {
                max_concurrent_jobs: 2,
                job_timeout: timeout,
                job_inputs_dir: dir.join("jobs"),
            },
        )
    }

    #[tokio::test]
    async fn test_results_keep_input_order_and_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(
            ScriptedEngine::new(dir.path().join("results"))
                .with_score("a", 0.8)
                .with_failure("b")
                .with_delay("a", Duration::from_millis(20)),
        );
        let cache = Arc::new(MemoryPredictionCache::new());
        let s = submitter(dir.path(), engine.clone(), cache.clone(), Duration::from_secs(5));

        let scores = s
            .score_designs(&[design("a", Some("MKV")), design("b", Some("GGS")), design("c", None)])
            .await;
        let ids: Vec<_> = scores.iter().map(|s| s.design_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(scores[0].outcome, JobOutcome::Submitted);
        assert_eq!(scores[0].score, Some(0.8));
        assert_eq!(scores[1].outcome, JobOutcome::Failed);
        assert_eq!(scores[1].score, None);
        assert_eq!(scores[2].outcome, JobOutcome::Skipped);
        assert_eq!(engine.submission_count(), 2);
        // only the successful job is cached
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_job_input_is_written_even_on_cache_hit() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine::new(dir.path().join("results")).with_score("a", 1.5));
        let cache = Arc::new(MemoryPredictionCache::new());
        let s = submitter(dir.path(), engine.clone(), cache, Duration::from_secs(5));

        s.score_designs(&[design("a", Some("MKV"))]).await;
        std::fs::remove_file(dir.path().join("jobs/a.fasta")).unwrap();

        let again = s.score_designs(&[design("a", Some("MKV"))]).await;
        assert_eq!(again[0].outcome, JobOutcome::CacheHit);
        assert_eq!(again[0].score, Some(1.5));
        assert_eq!(engine.submission_count(), 1);
        assert!(dir.path().join("jobs/a.fasta").exists());
    }

    #[tokio::test]
    async fn test_timed_out_job_has_null_score() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(
            ScriptedEngine::new(dir.path().join("results"))
                .with_score("slow", 2.0)
                .with_delay("slow", Duration::from_secs(30)),
        );
        let cache = Arc::new(MemoryPredictionCache::new());
        let s = submitter(dir.path(), engine, cache.clone(), Duration::from_millis(50));

        let scores = s.score_designs(&[design("slow", Some("MKV"))]).await;
        assert_eq!(scores[0].outcome, JobOutcome::TimedOut);
        assert_eq!(scores[0].score, None);
        assert!(cache.is_empty());
        // claim released after the timeout
        assert_eq!(cache.claim("slow").await.unwrap(), ClaimOutcome::Acquired);
    }

    #[tokio::test]
    async fn test_held_claim_blocks_submission() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine::new(dir.path().join("results")));
        let cache = Arc::new(MemoryPredictionCache::new());
        cache.claim("a").await.unwrap();
        let s = submitter(dir.path(), engine.clone(), cache, Duration::from_secs(5));

        let scores = s.score_designs(&[design("a", Some("MKV"))]).await;
        assert_eq!(scores[0].outcome, JobOutcome::ClaimHeld);
        assert_eq!(engine.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_engine_calls_never_exceed_job_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = ScriptedEngine::new(dir.path().join("results"));
        let ids = ["a", "b", "c", "d", "e", "f"];
        for id in ids {
            engine = engine
                .with_score(id, 1.0)
                .with_delay(id, Duration::from_millis(30));
        }
        let engine = Arc::new(engine);
        let cache = Arc::new(MemoryPredictionCache::new());
        let s = submitter(dir.path(), engine.clone(), cache, Duration::from_secs(5));

        let designs: Vec<_> = ids.iter().map(|id| design(id, Some("MKV"))).collect();
        let scores = s.score_designs(&designs).await;
        assert!(scores.iter().all(|d| d.outcome == JobOutcome::Submitted));
        assert_eq!(engine.submission_count(), 6);
        assert_eq!(engine.peak_concurrency(), 2);
    }

    #[tokio::test]
    async fn test_design_in_flight_is_submitted_once() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(
            ScriptedEngine::new(dir.path().join("results"))
                .with_score("a", 0.5)
                .with_delay("a", Duration::from_millis(50)),
        );
        let cache = Arc::new(MemoryPredictionCache::new());
        let s = submitter(dir.path(), engine.clone(), cache, Duration::from_secs(5));

        let batch = [design("a", Some("MKV"))];
        let (first, second) = tokio::join!(s.score_designs(&batch), s.score_designs(&batch));
        let mut outcomes = vec![first[0].outcome, second[0].outcome];
        outcomes.sort_by_key(|o| format!("{o:?}"));
        assert_eq!(outcomes, vec![JobOutcome::Skipped, JobOutcome::Submitted]);
        assert_eq!(engine.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_path_like_design_id_is_skipped_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine::new(dir.path().join("results")));
        let cache = Arc::new(MemoryPredictionCache::new());
        let s = submitter(dir.path(), engine.clone(), cache, Duration::from_secs(5));

        let scores = s.score_designs(&[design("../escaped", Some("MKV"))]).await;
        assert_eq!(scores[0].outcome, JobOutcome::Skipped);
        assert!(scores[0].diagnostics[0].message.contains("../escaped"));
        assert!(!dir.path().join("escaped.fasta").exists());
        assert_eq!(engine.submission_count(), 0);
    }
}
