//! Binder/target sequences from accepted structural models.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::domain::{Diagnostic, Result, Stage};
use crate::pdb;

/// Directory name holding the models that passed upstream filters.
pub const ACCEPTED_DIR: &str = "Accepted";

/// Chain carrying the target protein.
pub const TARGET_CHAIN: char = 'A';
/// Chain carrying the designed binder.
pub const BINDER_CHAIN: char = 'B';

/// Parses a structure file into one sequence per polymer chain.
pub trait SequenceExtractor: Send + Sync {
    /// Chain id → first peptide segment. Chains without residues are absent.
    fn extract(&self, path: &Path) -> Result<BTreeMap<char, String>>;
}

/// [`SequenceExtractor`] for PDB files.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdbSequenceExtractor;

impl SequenceExtractor for PdbSequenceExtractor {
    fn extract(&self, path: &Path) -> Result<BTreeMap<char, String>> {
        let text = std::fs::read_to_string(path)?;
        let structure = pdb::parse_pdb(&text)?;
        Ok(structure
            .chains
            .iter()
            .filter_map(|c| c.first_peptide().map(|seq| (c.id, seq)))
            .collect())
    }
}

/// Sequences extracted from one model file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRecord {
    /// File stem of the model; the design id.
    pub design_model: String,
    pub source: PathBuf,
    pub target: Option<String>,
    pub binder: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SequenceScan {
    pub records: Vec<SequenceRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

/// `.pdb` files directly inside every directory named `Accepted` below
/// `root`, sorted by path.
pub fn accepted_models(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut models = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let is_accepted = dir.file_name().is_some_and(|n| n == ACCEPTED_DIR);
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                stack.push(path);
            } else if is_accepted
                && file_type.is_file()
                && path.extension().is_some_and(|e| e == "pdb")
            {
                models.push(path);
            }
        }
    }
    models.sort();
    Ok(models)
}

/// Extract target (chain A) and binder (chain B) sequences for every
/// accepted model below `root`. Unparseable files are reported and omitted.
pub fn extract_accepted(root: &Path, extractor: &dyn SequenceExtractor) -> Result<SequenceScan> {
    let mut scan = SequenceScan::default();
    for path in accepted_models(root)? {
        let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        debug!(model = %path.display(), "extracting sequences");
        match extractor.extract(&path) {
            Ok(chains) if chains.is_empty() => scan.diagnostics.push(Diagnostic::warn(
                Stage::Sequence,
                Some(&stem),
                format!("no polymer chains in {}", path.display()),
            )),
            Ok(mut chains) => scan.records.push(SequenceRecord {
                design_model: stem,
                source: path,
                target: chains.remove(&TARGET_CHAIN),
                binder: chains.remove(&BINDER_CHAIN),
            }),
            Err(e) => scan.diagnostics.push(Diagnostic::warn(
                Stage::Sequence,
                Some(&stem),
                format!("cannot parse {}: {e}", path.display()),
            )),
        }
    }
    Ok(scan)
}
