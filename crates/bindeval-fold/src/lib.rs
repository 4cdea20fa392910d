//! bindeval execution layer
//!
//! Turns catalogued designs into scored, ranked ledger rows:
//! - job inputs and the external structure-prediction engine
//! - interface score extraction from result archives
//! - the bounded, timed prediction submitter
//! - per-unit pipeline and the incremental run driver

pub mod driver;
pub mod engine;
pub mod error;
pub mod fakes;
pub mod job;
pub mod pipeline;
pub mod score;
pub mod submitter;

pub use driver::{IncrementalRunner, RunReport, RunnerConfig, UnitFailure};
pub use engine::{CommandEngine, PredictionEngine};
pub use error::{EngineError, JobInputError, RunError, ScoreError, UnitError};
pub use job::{JobArtifact, JobInput, ALLOWED_RESIDUES};
pub use pipeline::{JobCounts, UnitEvaluation, UnitOutcome, UnitPipeline};
pub use score::extract_interface_score;
pub use submitter::{DesignScore, JobOutcome, PredictionSubmitter, SubmitterConfig};
