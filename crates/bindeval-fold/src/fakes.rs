//! Scripted engine for tests.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bindeval_state::ARCHIVE_SUFFIX;

use crate::engine::PredictionEngine;
use crate::error::EngineError;
use crate::job::JobInput;

/// Write a zip archive with the given `(member name, contents)` pairs.
pub fn write_result_archive(path: &Path, members: &[(&str, &str)]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for (name, body) in members {
        zip.start_file(*name, options)
            .map_err(std::io::Error::other)?;
        zip.write_all(body.as_bytes())?;
    }
    zip.finish().map_err(std::io::Error::other)?;
    Ok(())
}

/// Json member body carrying `score` the way the predictor reports it.
pub fn ipae_json(score: f64) -> String {
    serde_json::json!({ "ipae": { "0": score, "1": score } }).to_string()
}

/// Engine that writes canned result archives instead of predicting.
///
/// Designs without a scripted score still get an archive, but one that
/// carries no `ipae` field.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    results_dir: PathBuf,
    scores: HashMap<String, f64>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    submissions: Mutex<Vec<String>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

/// Counts a running submission; decrements on drop so timeouts are counted too.
struct Running<'a>(&'a AtomicUsize);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedEngine {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_score(mut self, design_id: &str, score: f64) -> Self {
        self.scores.insert(design_id.to_string(), score);
        self
    }

    pub fn with_failure(mut self, design_id: &str) -> Self {
        self.failing.insert(design_id.to_string());
        self
    }

    pub fn with_delay(mut self, design_id: &str, delay: Duration) -> Self {
        self.delays.insert(design_id.to_string(), delay);
        self
    }

    /// Design ids submitted so far, in submission order.
    pub fn submissions(&self) -> Vec<String> {
        self.submissions
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().map(|s| s.len()).unwrap_or_default()
    }

    /// Most submissions ever running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PredictionEngine for ScriptedEngine {
    async fn submit(&self, job: &JobInput, _input_path: &Path) -> Result<PathBuf, EngineError> {
        if let Ok(mut submissions) = self.submissions.lock() {
            submissions.push(job.design_id.clone());
        }
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _running = Running(&self.running);

        if let Some(delay) = self.delays.get(&job.design_id) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(&job.design_id) {
            return Err(EngineError::Exit {
                code: Some(1),
                stderr: format!("scripted failure for {}", job.design_id),
            });
        }

        let archive = self
            .results_dir
            .join(&job.design_id)
            .join(format!("{}{ARCHIVE_SUFFIX}", job.design_id));
        let body = match self.scores.get(&job.design_id) {
            Some(score) => ipae_json(*score),
            None => r#"{"plddt": 80.0}"#.to_string(),
        };
        let member = format!("{}/{}_scores.json", job.design_id, job.design_id);
        write_result_archive(&archive, &[(member.as_str(), body.as_str())])?;
        Ok(archive)
    }
}
