//! Per-unit design statistics tables.
//!
//! Each work unit may carry a `final_design_stats.csv`. Readable tables are
//! unioned into one [`StatsTable`] with every row tagged by its folder.
//! Unreadable, malformed or empty tables are skipped with a diagnostic.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::domain::{columns, non_null, Diagnostic, Stage};

/// File name of the per-unit statistics table.
pub const STATS_FILE: &str = "final_design_stats.csv";

/// One stats row: column name → non-null cell text.
pub type StatsRow = BTreeMap<String, String>;

/// Union of all readable stats tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsTable {
    /// Column names in first-seen order; `Folder` is always present.
    pub columns: Vec<String>,
    pub rows: Vec<StatsRow>,
}

impl StatsTable {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    fn add_column(&mut self, name: &str) {
        if !self.has_column(name) {
            self.columns.push(name.to_string());
        }
    }
}

/// Result of aggregating stats across one or more folders.
#[derive(Debug, Clone, PartialEq)]
pub enum StatsOutcome {
    Table {
        table: StatsTable,
        warnings: Vec<Diagnostic>,
    },
    /// No folder contributed a readable, non-empty table.
    NoData { warnings: Vec<Diagnostic> },
}

impl StatsOutcome {
    pub fn warnings(&self) -> &[Diagnostic] {
        match self {
            StatsOutcome::Table { warnings, .. } | StatsOutcome::NoData { warnings } => warnings,
        }
    }
}

enum ReadOutcome {
    Missing,
    Skipped(Diagnostic),
    Rows(Vec<String>, Vec<StatsRow>),
}

fn read_table(path: &Path) -> ReadOutcome {
    let display = path.display();
    let mut reader = match csv::ReaderBuilder::new().flexible(false).from_path(path) {
        Ok(r) => r,
        Err(e) => {
            if let csv::ErrorKind::Io(io) = e.kind() {
                if io.kind() == std::io::ErrorKind::NotFound {
                    return ReadOutcome::Missing;
                }
            }
            return ReadOutcome::Skipped(Diagnostic::warn(
                Stage::Stats,
                None,
                format!("cannot open {display}: {e}"),
            ));
        }
    };

    let headers: Vec<String> = match reader.headers() {
        Ok(h) => h.iter().map(|c| c.trim().to_string()).collect(),
        Err(e) => {
            return ReadOutcome::Skipped(Diagnostic::warn(
                Stage::Stats,
                None,
                format!("cannot read header of {display}: {e}"),
            ))
        }
    };
    if headers.iter().all(String::is_empty) {
        return ReadOutcome::Skipped(Diagnostic::warn(
            Stage::Stats,
            None,
            format!("{display} is empty; skipped"),
        ));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                return ReadOutcome::Skipped(Diagnostic::warn(
                    Stage::Stats,
                    None,
                    format!("malformed table {display}: {e}"),
                ))
            }
        };
        let row: StatsRow = headers
            .iter()
            .zip(record.iter())
            .filter(|(name, _)| !name.is_empty())
            .filter_map(|(name, cell)| non_null(cell).map(|v| (name.clone(), v.to_string())))
            .collect();
        rows.push(row);
    }
    if rows.is_empty() {
        return ReadOutcome::Skipped(Diagnostic::warn(
            Stage::Stats,
            None,
            format!("{display} has a header but no rows; skipped"),
        ));
    }
    ReadOutcome::Rows(headers, rows)
}

/// Aggregate stats for the named folders below `root`, in the given order.
pub fn aggregate_folders(root: &Path, folders: &[String]) -> StatsOutcome {
    let mut table = StatsTable::default();
    let mut warnings = Vec::new();
    let mut found = false;

    for folder in folders {
        let path = root.join(folder).join(STATS_FILE);
        match read_table(&path) {
            ReadOutcome::Missing => debug!(folder = %folder, "no stats table"),
            ReadOutcome::Skipped(w) => warnings.push(w),
            ReadOutcome::Rows(headers, rows) => {
                found = true;
                for h in headers.iter().filter(|h| !h.is_empty()) {
                    table.add_column(h);
                }
                table.rows.extend(rows.into_iter().map(|mut row| {
                    row.insert(columns::FOLDER.to_string(), folder.clone());
                    row
                }));
            }
        }
    }

    if !found {
        return StatsOutcome::NoData { warnings };
    }
    table.add_column(columns::FOLDER);
    StatsOutcome::Table { table, warnings }
}

/// Aggregate stats for every sub-directory of `root`, in lexicographic order.
pub fn aggregate_all(root: &Path) -> std::io::Result<StatsOutcome> {
    let mut folders = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            folders.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    folders.sort();
    Ok(aggregate_folders(root, &folders))
}
