//! Error types for job execution, score extraction and runs.

use std::path::PathBuf;

use bindeval_core::EvalError;
use bindeval_state::StorageError;

/// A job input could not be built from a design.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobInputError {
    #[error("missing {chain} sequence")]
    MissingSequence { chain: &'static str },

    #[error("{chain} sequence contains unsupported residue {residue:?}")]
    InvalidResidue { chain: &'static str, residue: char },

    #[error("design id {0:?} cannot name a job file")]
    InvalidDesignId(String),
}

/// The external structure predictor failed.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine command is empty")]
    EmptyCommand,

    #[error("failed to start engine: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("engine exited with status {code:?}: {stderr}")]
    Exit { code: Option<i32>, stderr: String },

    #[error("engine finished but no result archive for {design_id} under {}", results_dir.display())]
    ArchiveMissing {
        design_id: String,
        results_dir: PathBuf,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// No usable interface score in a result archive. Never fatal.
#[derive(Debug, thiserror::Error)]
pub enum ScoreError {
    #[error("result archive {} not found", .0.display())]
    ArchiveMissing(PathBuf),

    #[error("unreadable result archive: {0}")]
    BadArchive(String),

    #[error("no json member carries an ipae field")]
    NoScore,

    #[error("ipae value {0} is not numeric")]
    NonNumeric(String),

    #[error("malformed json member {member}: {reason}")]
    Malformed { member: String, reason: String },
}

impl From<zip::result::ZipError> for ScoreError {
    fn from(e: zip::result::ZipError) -> Self {
        ScoreError::BadArchive(e.to_string())
    }
}

/// A unit could not be evaluated; it stays unprocessed and is retried next run.
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] StorageError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// Run-level failures; these abort before any unit is processed.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("cannot load ledger: {0}")]
    Ledger(#[source] EvalError),

    #[error("cannot list work units: {0}")]
    Discovery(#[source] EvalError),
}

pub type Result<T> = std::result::Result<T, RunError>;
