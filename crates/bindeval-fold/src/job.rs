//! Structure-prediction job inputs.
//!
//! One job per design: a FASTA record labelled with the design id whose
//! sequence is `TARGET:BINDER`.

use std::path::{Path, PathBuf};

use bindeval_core::{write_atomic, Design, EvalError};
use bindeval_state::check_design_id;
use sha2::{Digest, Sha256};

use crate::error::JobInputError;

/// Residues the predictor accepts.
pub const ALLOWED_RESIDUES: &str = "ACDEFGHIKLMNPQRSTVWY";

/// Separator between chains in a sequence input.
pub const CHAIN_SEPARATOR: char = ':';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInput {
    pub design_id: String,
    pub target: String,
    pub binder: String,
}

/// A job input written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobArtifact {
    pub path: PathBuf,
    /// SHA-256 hex of the file contents.
    pub digest: String,
}

fn normalise(chain: &'static str, seq: Option<&str>) -> Result<String, JobInputError> {
    let seq = seq
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(JobInputError::MissingSequence { chain })?
        .to_ascii_uppercase();
    if let Some(residue) = seq.chars().find(|c| !ALLOWED_RESIDUES.contains(*c)) {
        return Err(JobInputError::InvalidResidue { chain, residue });
    }
    Ok(seq)
}

impl JobInput {
    pub fn from_design(design: &Design) -> Result<Self, JobInputError> {
        check_design_id(&design.design_id)
            .map_err(|_| JobInputError::InvalidDesignId(design.design_id.clone()))?;
        Ok(Self {
            design_id: design.design_id.clone(),
            target: normalise("target", design.target_sequence.as_deref())?,
            binder: normalise("binder", design.binder_sequence.as_deref())?,
        })
    }

    /// `TARGET:BINDER`.
    pub fn sequence_input(&self) -> String {
        format!("{}{CHAIN_SEPARATOR}{}", self.target, self.binder)
    }

    pub fn fasta(&self) -> String {
        format!(">{}\n{}\n", self.design_id, self.sequence_input())
    }

    pub fn file_name(&self) -> String {
        format!("{}.fasta", self.design_id)
    }

    /// Write `<dir>/<design_id>.fasta` atomically.
    pub fn write_artifact(&self, dir: &Path) -> Result<JobArtifact, EvalError> {
        std::fs::create_dir_all(dir)?;
        let body = self.fasta();
        let path = dir.join(self.file_name());
        write_atomic(&path, body.as_bytes())?;
        Ok(JobArtifact {
            path,
            digest: hex::encode(Sha256::digest(body.as_bytes())),
        })
    }
}
