//! Integration tests for the synchronous unit stages: stats aggregation,
//! accepted-model sequence extraction, catalog join, ranking and the ledger.

use std::collections::HashMap;
use std::path::Path;

use bindeval_core::{
    aggregate_folders, build_catalog, extract_accepted, rank_designs, JoinKey, Ledger,
    PdbSequenceExtractor, StatsOutcome, LEDGER_COLUMNS,
};

fn atom(serial: usize, name: &str, res: &str, chain: char, seq: usize, x: f64) -> String {
    format!(
        "ATOM  {serial:>5} {name:<4} {res:>3} {chain}{seq:>4}    {x:>8.3}{:>8.3}{:>8.3}  1.00  0.00\n",
        0.0, 0.0
    )
}

/// Two-chain complex with bonded backbones.
fn complex_pdb(target: &[&str], binder: &[&str]) -> String {
    let mut out = String::new();
    let mut serial = 1;
    for (chain, residues) in [('A', target), ('B', binder)] {
        let mut x = 0.0;
        for (i, res) in residues.iter().enumerate() {
            for (name, dx) in [("N", 0.0), ("CA", 1.45), ("C", 2.5)] {
                out.push_str(&atom(serial, name, res, chain, i + 1, x + dx));
                serial += 1;
            }
            x += 3.83;
        }
    }
    out.push_str("END\n");
    out
}

fn write(path: &Path, body: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

fn seed_unit(root: &Path) {
    write(
        &root.join("2501_a/final_design_stats.csv"),
        "Design,Length,Sequence,Average_i_pTM,Notes\n\
         d1,3,MKV,0.81,\n\
         d2,3,GGS,0.65,retry\n\
         d3,3,MKV,0.80,\n",
    );
    write(
        &root.join("2501_a/Accepted/d1.pdb"),
        &complex_pdb(&["ALA", "CYS", "ASP", "GLU"], &["MET", "LYS", "VAL"]),
    );
    write(
        &root.join("2501_a/Accepted/d2.pdb"),
        &complex_pdb(&["ALA", "CYS", "ASP", "GLU"], &["GLY", "GLY", "SER"]),
    );
}

/// Stats + sequences + catalog + ranking flow into a ledger with the fixed layout.
#[test]
fn test_unit_tables_flow_into_ranked_ledger() {
    let dir = tempfile::tempdir().unwrap();
    seed_unit(dir.path());

    let StatsOutcome::Table { table, warnings } =
        aggregate_folders(dir.path(), &["2501_a".to_string()])
    else {
        panic!("expected stats table");
    };
    assert!(warnings.is_empty());

    let scan = extract_accepted(&dir.path().join("2501_a"), &PdbSequenceExtractor).unwrap();
    assert_eq!(scan.records.len(), 2);

    let catalog = build_catalog("2501_a", &table, &scan.records, JoinKey::BinderSequence).unwrap();
    // d3 shares d1's binder sequence and collapses into it
    assert_eq!(catalog.designs.len(), 2);
    assert!(catalog
        .designs
        .iter()
        .all(|d| d.target_sequence.as_deref() == Some("ACDE")));

    let scores = HashMap::from([("d1".to_string(), Some(7.5)), ("d2".to_string(), Some(3.25))]);
    let ranked = rank_designs(catalog, &scores);

    let mut ledger = Ledger::new();
    ledger.merge_unit("2501_a", ranked.designs);
    let text = String::from_utf8(ledger.to_csv_bytes().unwrap()).unwrap();
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines[0], LEDGER_COLUMNS.join(","));
    assert!(lines[1].starts_with("1,d2,3,3.25,0.65,,GGS,ACDE,4,"));
    assert!(lines[1].ends_with(",retry,,2501_a"));
    assert!(lines[2].starts_with("2,d1,3,7.5,0.81,,MKV,ACDE,4,"));
    assert_eq!(lines.len(), 3);
}

/// Joining on design id keeps designs that share a binder sequence apart.
#[test]
fn test_design_id_join_keeps_every_stats_row() {
    let dir = tempfile::tempdir().unwrap();
    seed_unit(dir.path());

    let StatsOutcome::Table { table, .. } = aggregate_folders(dir.path(), &["2501_a".to_string()])
    else {
        panic!("expected stats table");
    };
    let scan = extract_accepted(&dir.path().join("2501_a"), &PdbSequenceExtractor).unwrap();
    let catalog = build_catalog("2501_a", &table, &scan.records, JoinKey::DesignId).unwrap();

    let ids: Vec<_> = catalog.designs.iter().map(|d| d.design_id.as_str()).collect();
    assert_eq!(ids, vec!["d1", "d2", "d3"]);
    // no accepted model for d3, so no target
    assert_eq!(catalog.designs[2].target_sequence, None);
    assert_eq!(catalog.designs[2].target_length(), 0);
}

/// A ledger written by one run is the processed set of the next.
#[test]
fn test_saved_ledger_reports_processed_units() {
    let dir = tempfile::tempdir().unwrap();
    seed_unit(dir.path());
    let StatsOutcome::Table { table, .. } = aggregate_folders(dir.path(), &["2501_a".to_string()])
    else {
        panic!("expected stats table");
    };
    let catalog = build_catalog("2501_a", &table, &[], JoinKey::BinderSequence).unwrap();
    let ranked = rank_designs(catalog, &HashMap::new());

    let path = dir.path().join("final_results.csv");
    let mut ledger = Ledger::new();
    ledger.merge_unit("2501_a", ranked.designs);
    ledger.save(&path).unwrap();

    let reloaded = Ledger::load(&path).unwrap();
    assert_eq!(reloaded, ledger);
    assert!(reloaded.processed_units().contains("2501_a"));
}
