//! Evaluated binder design.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Column names shared by the stats tables and the ledger.
pub mod columns {
    pub const RANK: &str = "Rank";
    pub const DESIGN: &str = "Design";
    pub const LENGTH: &str = "Length";
    pub const SCORE: &str = "ipae_score";
    pub const SEQUENCE: &str = "Sequence";
    pub const TARGET_SEQUENCE: &str = "TargetSequence";
    pub const TARGET_LENGTH: &str = "TargetSequenceLength";
    pub const FOLDER: &str = "Folder";
}

/// Text values read as "no value" in any input table.
const NULL_MARKERS: &[&str] = &["", "NA", "NaN", "nan", "None", "<NA>", "null"];

/// Returns the trimmed cell, or `None` for a null marker.
pub fn non_null(cell: &str) -> Option<&str> {
    let trimmed = cell.trim();
    if NULL_MARKERS.contains(&trimmed) {
        None
    } else {
        Some(trimmed)
    }
}

/// One evaluated candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Design {
    /// Unique across the ledger; derived from the source model's file stem.
    pub design_id: String,

    /// Work unit the design came from.
    pub folder: String,

    pub binder_sequence: Option<String>,

    pub target_sequence: Option<String>,

    /// Remaining per-design metrics, keyed by column name. Absent = null.
    pub stats: BTreeMap<String, String>,

    /// Interface pAE from the structure prediction; lower is better.
    pub interface_score: Option<f64>,

    /// 1-based position among scored designs.
    pub rank: Option<usize>,
}

impl Design {
    pub fn new(design_id: impl Into<String>, folder: impl Into<String>) -> Self {
        Self {
            design_id: design_id.into(),
            folder: folder.into(),
            binder_sequence: None,
            target_sequence: None,
            stats: BTreeMap::new(),
            interface_score: None,
            rank: None,
        }
    }

    pub fn binder_length(&self) -> usize {
        self.binder_sequence.as_deref().map_or(0, str::len)
    }

    pub fn target_length(&self) -> usize {
        self.target_sequence.as_deref().map_or(0, str::len)
    }

    pub fn stat(&self, column: &str) -> Option<&str> {
        self.stats.get(column).map(String::as_str)
    }
}
