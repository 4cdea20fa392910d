//! External structure-prediction engines.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use bindeval_state::find_archive;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::EngineError;
use crate::job::JobInput;

/// Characters of engine stderr kept in errors.
const STDERR_TAIL: usize = 2000;

fn tail(text: &str, max_chars: usize) -> String {
    let skip = text.chars().count().saturating_sub(max_chars);
    text.chars().skip(skip).collect()
}

/// Submits one job and waits for its result archive.
///
/// Implementations must be cancel-safe: the submitter drops the future when
/// the job timeout fires.
#[async_trait]
pub trait PredictionEngine: Send + Sync {
    async fn submit(&self, job: &JobInput, input_path: &Path) -> Result<PathBuf, EngineError>;
}

/// Runs a command-line predictor once per job.
///
/// Arguments may contain `{input}` (job input file), `{out_dir}` (results
/// directory) and `{name}` (design id).
#[derive(Debug, Clone)]
pub struct CommandEngine {
    command: Vec<String>,
    env: BTreeMap<String, String>,
    results_dir: PathBuf,
}

impl CommandEngine {
    pub fn new(command: Vec<String>, results_dir: impl Into<PathBuf>) -> Self {
        Self {
            command,
            env: BTreeMap::new(),
            results_dir: results_dir.into(),
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Argument vector with placeholders filled in.
    pub fn render(&self, job: &JobInput, input_path: &Path) -> Vec<String> {
        let input = input_path.to_string_lossy();
        let out_dir = self.results_dir.to_string_lossy();
        self.command
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input)
                    .replace("{out_dir}", &out_dir)
                    .replace("{name}", &job.design_id)
            })
            .collect()
    }
}

#[async_trait]
impl PredictionEngine for CommandEngine {
    async fn submit(&self, job: &JobInput, input_path: &Path) -> Result<PathBuf, EngineError> {
        let argv = self.render(job, input_path);
        let (exe, args) = argv.split_first().ok_or(EngineError::EmptyCommand)?;
        tokio::fs::create_dir_all(&self.results_dir).await?;

        debug!(design_id = %job.design_id, command = ?argv, "starting engine");
        let child = Command::new(exe)
            .args(args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(EngineError::Spawn)?;

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Exit {
                code: output.status.code(),
                stderr: tail(stderr.trim(), STDERR_TAIL),
            });
        }

        let root = self.results_dir.clone();
        let id = job.design_id.clone();
        let found = tokio::task::spawn_blocking(move || find_archive(&root, &id))
            .await
            .map_err(|e| EngineError::Io(std::io::Error::other(e)))??;
        match found {
            Some(archive) => {
                info!(design_id = %job.design_id, archive = %archive.display(), "engine produced archive");
                Ok(archive)
            }
            None => Err(EngineError::ArchiveMissing {
                design_id: job.design_id.clone(),
                results_dir: self.results_dir.clone(),
            }),
        }
    }
}
