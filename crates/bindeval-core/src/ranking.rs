//! Ranking merger: scores joined onto the catalog, sorted and ranked.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::catalog::Catalog;
use crate::domain::{columns, Design, Diagnostic, Stage};

/// Fixed ledger column set, in output order.
pub const LEDGER_COLUMNS: &[&str] = &[
    "Rank",
    "Design",
    "Length",
    "ipae_score",
    "Average_i_pTM",
    "Target_Hotspot",
    "Sequence",
    "TargetSequence",
    "TargetSequenceLength",
    "Average_pAE",
    "Average_i_pAE",
    "Average_pTM",
    "Average_pLDDT",
    "Average_i_pLDDT",
    "Average_ss_pLDDT",
    "Average_Target_RMSD",
    "Average_Hotspot_RMSD",
    "Average_Binder_pLDDT",
    "Average_Binder_pTM",
    "Average_Binder_pAE",
    "Average_Binder_RMSD",
    "DesignTime",
    "Notes",
    "TargetSettings",
    "Folder",
];

/// Columns the pipeline fills itself; never reported as missing.
const PIPELINE_COLUMNS: &[&str] = &[
    columns::RANK,
    columns::DESIGN,
    columns::SCORE,
    columns::TARGET_SEQUENCE,
    columns::TARGET_LENGTH,
    columns::FOLDER,
];

#[derive(Debug, Clone, Default)]
pub struct Ranked {
    pub designs: Vec<Design>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Ascending by score; unscored designs after all scored ones.
fn by_score(a: &Design, b: &Design) -> Ordering {
    match (a.interface_score, b.interface_score) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Stable-sort `designs` by score and assign 1-based ranks to scored rows.
///
/// Returns `false` without touching the order when no design has a score.
pub fn sort_and_rank(designs: &mut [Design]) -> bool {
    if designs.iter().all(|d| d.interface_score.is_none()) {
        for design in designs.iter_mut() {
            design.rank = None;
        }
        return false;
    }
    designs.sort_by(by_score);
    let mut next = 1usize;
    for design in designs.iter_mut() {
        design.rank = design.interface_score.map(|_| {
            let rank = next;
            next += 1;
            rank
        });
    }
    true
}

/// Left-join `scores` onto the catalog by design id, then sort and rank.
///
/// A design absent from `scores`, or mapped to `None` or NaN, stays unscored.
pub fn rank_designs(catalog: Catalog, scores: &HashMap<String, Option<f64>>) -> Ranked {
    let mut diagnostics = Vec::new();

    let missing: Vec<&str> = LEDGER_COLUMNS
        .iter()
        .copied()
        .filter(|c| !PIPELINE_COLUMNS.contains(c))
        .filter(|c| !catalog.columns.iter().any(|have| have == c))
        .collect();
    if !missing.is_empty() {
        diagnostics.push(Diagnostic::warn(
            Stage::Ranking,
            None,
            format!("columns absent from stats, filled with null: {}", missing.join(", ")),
        ));
    }

    let mut designs = catalog.designs;
    for design in &mut designs {
        design.interface_score = scores
            .get(&design.design_id)
            .copied()
            .flatten()
            .filter(|s| !s.is_nan());
    }

    if !sort_and_rank(&mut designs) && !designs.is_empty() {
        diagnostics.push(Diagnostic::warn(
            Stage::Ranking,
            None,
            "no design has an interface score; keeping catalog order",
        ));
    }

    Ranked {
        designs,
        diagnostics,
    }
}
