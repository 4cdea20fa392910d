//! Design catalog: stats rows joined with extracted sequences.
//!
//! The default join key is the binder sequence text, so stats rows that
//! share a binder sequence collapse into the first such row. Joining on the
//! design id keeps distinct designs apart and uses the sequence only as a
//! cross-check.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{columns, Design, Diagnostic, EvalError, Result, Stage};
use crate::sequence::SequenceRecord;
use crate::stats::{StatsRow, StatsTable};

/// Column used to match stats rows with structure-derived sequences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKey {
    #[default]
    BinderSequence,
    DesignId,
}

/// Stats columns owned by the pipeline rather than carried as metrics.
const DERIVED: &[&str] = &[
    columns::RANK,
    columns::DESIGN,
    columns::SCORE,
    columns::SEQUENCE,
    columns::TARGET_SEQUENCE,
    columns::TARGET_LENGTH,
    columns::FOLDER,
];

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub designs: Vec<Design>,
    /// Stats columns that were present in the input table.
    pub columns: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

fn metrics(row: &StatsRow) -> std::collections::BTreeMap<String, String> {
    row.iter()
        .filter(|(k, _)| !DERIVED.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Build one design per usable stats row.
///
/// Fails only when no row carries a design id at all.
pub fn build_catalog(
    unit: &str,
    stats: &StatsTable,
    sequences: &[SequenceRecord],
    join: JoinKey,
) -> Result<Catalog> {
    if !stats.rows.iter().any(|r| r.contains_key(columns::DESIGN)) {
        return Err(EvalError::Schema {
            unit: unit.to_string(),
            reason: format!("no row has a {} value", columns::DESIGN),
        });
    }

    let mut by_binder: HashMap<&str, &SequenceRecord> = HashMap::new();
    let mut by_model: HashMap<&str, &SequenceRecord> = HashMap::new();
    for record in sequences {
        if let Some(binder) = record.binder.as_deref() {
            by_binder.entry(binder).or_insert(record);
        }
        by_model.entry(record.design_model.as_str()).or_insert(record);
    }

    let mut catalog = Catalog {
        columns: stats.columns.clone(),
        ..Catalog::default()
    };
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut seen_binders: HashMap<String, String> = HashMap::new();
    let mut unmatched = 0usize;

    for row in &stats.rows {
        let Some(design_id) = row.get(columns::DESIGN) else {
            catalog.diagnostics.push(Diagnostic::warn(
                Stage::Catalog,
                None,
                format!("stats row without {} dropped", columns::DESIGN),
            ));
            continue;
        };
        if !seen_ids.insert(design_id.clone()) {
            catalog.diagnostics.push(Diagnostic::warn(
                Stage::Catalog,
                Some(design_id),
                "duplicate design id; keeping first occurrence",
            ));
            continue;
        }

        let stats_binder = row.get(columns::SEQUENCE).cloned();
        let mut design = Design::new(
            design_id.clone(),
            row.get(columns::FOLDER).map_or(unit, String::as_str),
        );
        design.stats = metrics(row);

        let matched = match join {
            JoinKey::BinderSequence => {
                if let Some(binder) = stats_binder.as_deref() {
                    if let Some(first) = seen_binders.get(binder) {
                        catalog.diagnostics.push(Diagnostic::warn(
                            Stage::Catalog,
                            Some(design_id),
                            format!("binder sequence identical to {first}; collapsed into it"),
                        ));
                        continue;
                    }
                    seen_binders.insert(binder.to_string(), design_id.clone());
                }
                design.binder_sequence = stats_binder.clone();
                stats_binder.as_deref().and_then(|b| by_binder.get(b)).copied()
            }
            JoinKey::DesignId => {
                let record = by_model.get(design_id.as_str()).copied();
                if let (Some(ours), Some(theirs)) = (
                    stats_binder.as_deref(),
                    record.and_then(|r| r.binder.as_deref()),
                ) {
                    if ours != theirs {
                        catalog.diagnostics.push(Diagnostic::warn(
                            Stage::Catalog,
                            Some(design_id),
                            "stats binder sequence differs from accepted model; keeping stats value",
                        ));
                    }
                }
                design.binder_sequence =
                    stats_binder.clone().or_else(|| record.and_then(|r| r.binder.clone()));
                record
            }
        };

        match matched {
            Some(record) => design.target_sequence = record.target.clone(),
            None => unmatched += 1,
        }
        catalog.designs.push(design);
    }

    debug!(
        unit = %unit,
        designs = catalog.designs.len(),
        unmatched,
        join = ?join,
        "catalog built"
    );
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> StatsRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn table(rows: Vec<StatsRow>) -> StatsTable {
        StatsTable {
            columns: vec!["Design".into(), "Sequence".into(), "Length".into(), "Folder".into()],
            rows,
        }
    }

    fn record(model: &str, target: &str, binder: &str) -> SequenceRecord {
        SequenceRecord {
            design_model: model.into(),
            source: format!("Accepted/{model}.pdb").into(),
            target: Some(target.into()),
            binder: Some(binder.into()),
        }
    }

    #[test]
    fn test_joins_target_by_binder_sequence() {
        let stats = table(vec![
            row(&[("Design", "d1"), ("Sequence", "MKV"), ("Length", "3"), ("Folder", "u")]),
            row(&[("Design", "d2"), ("Sequence", "GGS"), ("Folder", "u")]),
        ]);
        let seqs = vec![record("other_name", "ACDE", "MKV")];
        let catalog = build_catalog("u", &stats, &seqs, JoinKey::BinderSequence).unwrap();

        assert_eq!(catalog.designs.len(), 2);
        let d1 = &catalog.designs[0];
        assert_eq!(d1.target_sequence.as_deref(), Some("ACDE"));
        assert_eq!(d1.target_length(), 4);
        assert_eq!(d1.stat("Length"), Some("3"));
        assert!(d1.stat("Sequence").is_none());
        let d2 = &catalog.designs[1];
        assert_eq!(d2.binder_sequence.as_deref(), Some("GGS"));
        assert_eq!(d2.target_sequence, None);
        assert_eq!(d2.target_length(), 0);
    }

    #[test]
    fn test_identical_binder_sequences_collapse_distinct_never_do() {
        let stats = table(vec![
            row(&[("Design", "d1"), ("Sequence", "MKV")]),
            row(&[("Design", "d2"), ("Sequence", "MKV")]),
            row(&[("Design", "d3"), ("Sequence", "MKI")]),
        ]);
        let catalog = build_catalog("u", &stats, &[], JoinKey::BinderSequence).unwrap();
        let ids: Vec<_> = catalog.designs.iter().map(|d| d.design_id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d3"]);
        assert_eq!(catalog.diagnostics.len(), 1);
        assert!(catalog.diagnostics[0].message.contains("d1"));
    }

    #[test]
    fn test_design_id_join_keeps_shared_sequences_apart() {
        let stats = table(vec![
            row(&[("Design", "d1"), ("Sequence", "MKV")]),
            row(&[("Design", "d2"), ("Sequence", "MKV")]),
        ]);
        let seqs = vec![record("d1", "AAAA", "MKV"), record("d2", "CCCC", "MKV")];
        let catalog = build_catalog("u", &stats, &seqs, JoinKey::DesignId).unwrap();
        assert_eq!(catalog.designs.len(), 2);
        assert_eq!(catalog.designs[0].target_sequence.as_deref(), Some("AAAA"));
        assert_eq!(catalog.designs[1].target_sequence.as_deref(), Some("CCCC"));
        assert!(catalog.diagnostics.is_empty());
    }

    #[test]
    fn test_design_id_join_reports_sequence_mismatch() {
        let stats = table(vec![row(&[("Design", "d1"), ("Sequence", "MKV")])]);
        let seqs = vec![record("d1", "AAAA", "MKI")];
        let catalog = build_catalog("u", &stats, &seqs, JoinKey::DesignId).unwrap();
        assert_eq!(catalog.designs[0].binder_sequence.as_deref(), Some("MKV"));
        assert_eq!(catalog.diagnostics.len(), 1);
    }

    #[test]
    fn test_duplicate_design_ids_are_reported_first_wins() {
        let stats = table(vec![
            row(&[("Design", "d1"), ("Sequence", "MKV"), ("Folder", "a")]),
            row(&[("Design", "d1"), ("Sequence", "GGS"), ("Folder", "b")]),
        ]);
        let catalog = build_catalog("u", &stats, &[], JoinKey::BinderSequence).unwrap();
        assert_eq!(catalog.designs.len(), 1);
        assert_eq!(catalog.designs[0].folder, "a");
        assert_eq!(catalog.diagnostics[0].design_id.as_deref(), Some("d1"));
    }

    #[test]
    fn test_table_without_design_ids_is_schema_error() {
        let stats = table(vec![row(&[("Sequence", "MKV")])]);
        let err = build_catalog("u", &stats, &[], JoinKey::BinderSequence).unwrap_err();
        assert!(matches!(err, EvalError::Schema { .. }));
    }
}
