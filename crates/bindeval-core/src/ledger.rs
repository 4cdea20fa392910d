//! Persisted ranked ledger of every evaluated design.
//!
//! The ledger is a CSV file with the fixed [`LEDGER_COLUMNS`] layout. It is
//! both the run's output and, on the next run, the source of the set of
//! already-processed work units (distinct `Folder` values).

use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::domain::{columns, non_null, Design, Diagnostic, EvalError, Result, Stage};
use crate::ranking::{sort_and_rank, LEDGER_COLUMNS};

/// Default ledger file name.
pub const LEDGER_FILE: &str = "final_results.csv";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    designs: Vec<Design>,
}

/// What a `merge_unit` call changed.
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub added: usize,
    /// Rows of the same unit dropped before appending (forced reprocess).
    pub replaced: usize,
    pub diagnostics: Vec<Diagnostic>,
}

fn format_score(score: f64) -> String {
    format!("{score}")
}

fn design_to_row(design: &Design) -> Vec<String> {
    LEDGER_COLUMNS
        .iter()
        .map(|&col| match col {
            columns::RANK => design.rank.map(|r| r.to_string()).unwrap_or_default(),
            columns::DESIGN => design.design_id.clone(),
            columns::LENGTH => match design.stat(columns::LENGTH) {
                Some(len) => len.to_string(),
                None if design.binder_sequence.is_some() => design.binder_length().to_string(),
                None => String::new(),
            },
            columns::SCORE => design.interface_score.map(format_score).unwrap_or_default(),
            columns::SEQUENCE => design.binder_sequence.clone().unwrap_or_default(),
            columns::TARGET_SEQUENCE => design.target_sequence.clone().unwrap_or_default(),
            columns::TARGET_LENGTH => design.target_length().to_string(),
            columns::FOLDER => design.folder.clone(),
            other => design.stat(other).unwrap_or_default().to_string(),
        })
        .collect()
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the ledger at `path`. A missing file is an empty ledger; any
    /// other failure is an [`EvalError::LedgerFormat`].
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no ledger yet; starting empty");
                return Ok(Self::new());
            }
            Err(e) => {
                return Err(EvalError::LedgerFormat {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        };
        Self::from_csv(&bytes).map_err(|reason| EvalError::LedgerFormat {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn from_csv(bytes: &[u8]) -> std::result::Result<Self, String> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::new());
        }
        let mut reader = csv::ReaderBuilder::new().from_reader(bytes);
        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| e.to_string())?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        for required in [columns::DESIGN, columns::FOLDER] {
            if !headers.iter().any(|h| h == required) {
                return Err(format!("missing required column {required}"));
            }
        }

        let mut designs = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let record = record.map_err(|e| e.to_string())?;
            let cells: HashMap<&str, &str> = headers
                .iter()
                .map(String::as_str)
                .zip(record.iter())
                .filter_map(|(h, v)| non_null(v).map(|v| (h, v)))
                .collect();
            let Some(design_id) = cells.get(columns::DESIGN) else {
                warn!(row = idx + 2, "ledger row without design id ignored");
                continue;
            };
            let mut design = Design::new(
                *design_id,
                cells.get(columns::FOLDER).copied().unwrap_or_default(),
            );
            for (&col, &value) in &cells {
                match col {
                    columns::DESIGN | columns::FOLDER | columns::TARGET_LENGTH => {}
                    columns::SEQUENCE => design.binder_sequence = Some(value.to_string()),
                    columns::TARGET_SEQUENCE => design.target_sequence = Some(value.to_string()),
                    columns::SCORE => match value.parse::<f64>() {
                        Ok(score) if !score.is_nan() => design.interface_score = Some(score),
                        _ => warn!(design_id = %design_id, value, "non-numeric ledger score ignored"),
                    },
                    columns::RANK => design.rank = value.parse().ok(),
                    other => {
                        design.stats.insert(other.to_string(), value.to_string());
                    }
                }
            }
            designs.push(design);
        }
        Ok(Self { designs })
    }

    pub fn designs(&self) -> &[Design] {
        &self.designs
    }

    pub fn len(&self) -> usize {
        self.designs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.designs.is_empty()
    }

    /// Distinct work units with at least one row in the ledger.
    pub fn processed_units(&self) -> BTreeSet<String> {
        self.designs
            .iter()
            .filter(|d| !d.folder.is_empty())
            .map(|d| d.folder.clone())
            .collect()
    }

    /// Union one unit's ranked designs into the ledger and re-rank globally.
    ///
    /// Existing rows of `unit` are replaced. A design id already owned by a
    /// different unit is reported and the incoming row dropped.
    pub fn merge_unit(&mut self, unit: &str, designs: Vec<Design>) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        let before = self.designs.len();
        self.designs.retain(|d| d.folder != unit);
        outcome.replaced = before - self.designs.len();

        let owners: HashMap<String, String> = self
            .designs
            .iter()
            .map(|d| (d.design_id.clone(), d.folder.clone()))
            .collect();
        let mut incoming: BTreeSet<String> = BTreeSet::new();

        for mut design in designs {
            if let Some(owner) = owners.get(&design.design_id) {
                outcome.diagnostics.push(Diagnostic::warn(
                    Stage::Ledger,
                    Some(&design.design_id),
                    format!("design id already recorded for unit {owner}; row from {unit} dropped"),
                ));
                continue;
            }
            if !incoming.insert(design.design_id.clone()) {
                outcome.diagnostics.push(Diagnostic::warn(
                    Stage::Ledger,
                    Some(&design.design_id),
                    "duplicate design id within unit; keeping first occurrence",
                ));
                continue;
            }
            design.folder = unit.to_string();
            self.designs.push(design);
            outcome.added += 1;
        }

        sort_and_rank(&mut self.designs);
        outcome
    }

    /// Serialise with the fixed column set; identical content gives identical bytes.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(LEDGER_COLUMNS)?;
        for design in &self.designs {
            writer.write_record(design_to_row(design))?;
        }
        writer
            .into_inner()
            .map_err(|e| EvalError::Io(e.into_error()))
    }

    /// Atomically replace the ledger file at `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.to_csv_bytes()?)
    }
}

/// Write `bytes` to a temp file beside `path`, then rename over it.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
