//! Sequence exports derived from the ledger.
//!
//! - binder FASTA: `>design\nBINDER\n\n` per design with a binder sequence
//! - AlphaFold server batch JSON: one binder + target complex job per design

use std::path::Path;

use serde::Serialize;

use crate::domain::{Design, Diagnostic, EvalError, Result, Stage};
use crate::ledger::write_atomic;

/// Default binder FASTA file name.
pub const BINDER_FASTA_FILE: &str = "all_binder_fastas.fasta";

#[derive(Debug, Clone, Default)]
pub struct ExportReport {
    pub written: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Render the binder FASTA. Designs without a binder sequence are skipped.
pub fn binder_fasta(designs: &[Design]) -> (String, ExportReport) {
    let mut out = String::new();
    let mut report = ExportReport::default();
    for design in designs {
        match design.binder_sequence.as_deref() {
            Some(seq) => {
                out.push_str(&format!(">{}\n{}\n\n", design.design_id, seq));
                report.written += 1;
            }
            None => report.diagnostics.push(Diagnostic::warn(
                Stage::Export,
                Some(&design.design_id),
                "no binder sequence; left out of FASTA export",
            )),
        }
    }
    (out, report)
}

pub fn write_binder_fasta(path: &Path, designs: &[Design]) -> Result<ExportReport> {
    let (text, report) = binder_fasta(designs);
    write_atomic(path, text.as_bytes())?;
    Ok(report)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProteinChain {
    pub sequence: String,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChainEntry {
    pub protein_chain: ProteinChain,
}

/// One AlphaFold server job.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Af3Job {
    pub name: String,
    pub model_seeds: Vec<u64>,
    pub sequences: Vec<ChainEntry>,
    pub dialect: &'static str,
    pub version: u32,
}

impl Af3Job {
    fn complex(name: &str, binder: &str, target: &str) -> Self {
        let chain = |seq: &str| ChainEntry {
            protein_chain: ProteinChain {
                sequence: seq.to_string(),
                count: 1,
            },
        };
        Self {
            name: name.to_string(),
            model_seeds: Vec::new(),
            sequences: vec![chain(binder), chain(target)],
            dialect: "alphafoldserver",
            version: 1,
        }
    }
}

fn is_upper_alpha(seq: &str) -> bool {
    seq.chars().all(|c| c.is_ascii_uppercase())
}

/// Jobs for every design with valid binder and target sequences.
pub fn af3_jobs(designs: &[Design]) -> (Vec<Af3Job>, ExportReport) {
    let mut jobs = Vec::new();
    let mut report = ExportReport::default();
    for design in designs {
        let id = design.design_id.as_str();
        let (Some(binder), Some(target)) = (
            design.binder_sequence.as_deref(),
            design.target_sequence.as_deref(),
        ) else {
            report.diagnostics.push(Diagnostic::warn(
                Stage::Export,
                Some(id),
                "missing binder or target sequence; no AlphaFold job",
            ));
            continue;
        };
        if !is_upper_alpha(binder) || !is_upper_alpha(target) {
            report.diagnostics.push(Diagnostic::warn(
                Stage::Export,
                Some(id),
                "sequence has characters outside A-Z; no AlphaFold job",
            ));
            continue;
        }
        jobs.push(Af3Job::complex(id, binder, target));
    }
    report.written = jobs.len();
    (jobs, report)
}

/// Write the AlphaFold server batch file. Refuses to write an empty batch.
pub fn write_af3_jobs(path: &Path, designs: &[Design]) -> Result<ExportReport> {
    let (jobs, report) = af3_jobs(designs);
    if jobs.is_empty() {
        return Err(EvalError::Export(
            "no design has valid binder and target sequences".to_string(),
        ));
    }
    let json = serde_json::to_vec_pretty(&jobs)?;
    write_atomic(path, &json)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn design(id: &str, binder: Option<&str>, target: Option<&str>) -> Design {
        let mut d = Design::new(id, "u");
        d.binder_sequence = binder.map(str::to_string);
        d.target_sequence = target.map(str::to_string);
        d
    }

    #[test]
    fn test_fasta_records_are_blank_line_separated() {
        let designs = vec![
            design("d1", Some("MKV"), None),
            design("d2", None, None),
            design("d3", Some("GGS"), None),
        ];
        let (text, report) = binder_fasta(&designs);
        assert_eq!(text, ">d1\nMKV\n\n>d3\nGGS\n\n");
        assert_eq!(report.written, 2);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].design_id.as_deref(), Some("d2"));
    }

    #[test]
    fn test_af3_job_lists_binder_then_target() {
        let (jobs, report) = af3_jobs(&[design("d1", Some("MKV"), Some("ACDE"))]);
        assert!(report.diagnostics.is_empty());
        let json = serde_json::to_value(&jobs).unwrap();
        assert_eq!(json[0]["name"], "d1");
        assert_eq!(json[0]["modelSeeds"], serde_json::json!([]));
        assert_eq!(json[0]["sequences"][0]["proteinChain"]["sequence"], "MKV");
        assert_eq!(json[0]["sequences"][1]["proteinChain"]["sequence"], "ACDE");
        assert_eq!(json[0]["sequences"][1]["proteinChain"]["count"], 1);
        assert_eq!(json[0]["dialect"], "alphafoldserver");
        assert_eq!(json[0]["version"], 1);
    }

    #[test]
    fn test_af3_skips_invalid_or_incomplete_rows() {
        let designs = vec![
            design("d1", Some("mkv"), Some("ACDE")),
            design("d2", Some("MKV"), None),
            design("d3", Some("MKV"), Some("AC-E")),
        ];
        let (jobs, report) = af3_jobs(&designs);
        assert!(jobs.is_empty());
        assert_eq!(report.diagnostics.len(), 3);
    }

    #[test]
    fn test_empty_af3_batch_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        assert!(write_af3_jobs(&path, &[]).is_err());
        assert!(!path.exists());
    }
}
