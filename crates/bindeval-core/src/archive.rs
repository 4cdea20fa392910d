//! Moving old work units below an archive prefix on the remote.
//!
//! Folders are dated by a leading `YYMM`; everything at or before the
//! cutoff is moved. Undated folders and the archive prefix itself stay put.

use bindeval_state::RemoteStore;
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{Diagnostic, EvalError, Result, Stage};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFolder {
    pub folder: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchivePlan {
    pub archive_prefix: String,
    pub to_move: Vec<String>,
    pub skipped: Vec<SkippedFolder>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ArchiveReport {
    pub folders_moved: usize,
    pub objects_moved: usize,
    pub diagnostics: Vec<Diagnostic>,
}

fn parse_yymm(s: &str) -> Option<u16> {
    let head = s.get(..4)?;
    if !head.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    head.parse().ok()
}

/// Decide which top-level `folders` to archive.
pub fn plan_archive(folders: &[String], cutoff: &str, archive_prefix: &str) -> Result<ArchivePlan> {
    let cutoff_value = match parse_yymm(cutoff) {
        Some(v) if cutoff.len() == 4 => v,
        _ => return Err(EvalError::InvalidCutoff(cutoff.to_string())),
    };
    let archive_prefix = archive_prefix.trim_matches('/').to_string();
    let mut plan = ArchivePlan {
        archive_prefix: archive_prefix.clone(),
        ..ArchivePlan::default()
    };

    for folder in folders {
        if *folder == archive_prefix {
            plan.skipped.push(SkippedFolder {
                folder: folder.clone(),
                reason: "is the archive prefix".to_string(),
            });
            continue;
        }
        match parse_yymm(folder) {
            None => plan.skipped.push(SkippedFolder {
                folder: folder.clone(),
                reason: "no YYMM date prefix".to_string(),
            }),
            Some(date) if date <= cutoff_value => plan.to_move.push(folder.clone()),
            Some(_) => plan.skipped.push(SkippedFolder {
                folder: folder.clone(),
                reason: format!("newer than cutoff {cutoff}"),
            }),
        }
    }
    Ok(plan)
}

/// Move every planned folder, continuing past per-folder failures.
pub async fn execute_archive(remote: &dyn RemoteStore, plan: &ArchivePlan) -> ArchiveReport {
    let mut report = ArchiveReport::default();
    for folder in &plan.to_move {
        match remote.move_folder(folder, &plan.archive_prefix).await {
            Ok(objects) => {
                info!(folder = %folder, objects, archive = %plan.archive_prefix, "folder archived");
                report.folders_moved += 1;
                report.objects_moved += objects;
            }
            Err(e) => {
                warn!(folder = %folder, error = %e, "archiving folder failed");
                report.diagnostics.push(Diagnostic {
                    stage: Stage::Archive,
                    design_id: None,
                    message: format!("{folder}: {e}"),
                });
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use bindeval_state::fakes::MemoryRemoteStore;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plans_folders_at_or_before_cutoff() {
        let folders = names(&["2411_a", "2502_b", "2503_c", "scratch", "snake-venom-binder"]);
        let plan = plan_archive(&folders, "2502", "snake-venom-binder/").unwrap();
        assert_eq!(plan.to_move, names(&["2411_a", "2502_b"]));
        assert_eq!(plan.skipped.len(), 3);
        assert_eq!(plan.skipped[0].folder, "2503_c");
        assert_eq!(plan.skipped[1].folder, "scratch");
        assert_eq!(plan.skipped[2].folder, "snake-venom-binder");
        assert_eq!(plan.skipped[2].reason, "is the archive prefix");
    }

    #[test]
    fn test_rejects_malformed_cutoff() {
        assert!(plan_archive(&[], "25-02", "archive").is_err());
        assert!(plan_archive(&[], "250", "archive").is_err());
        assert!(plan_archive(&[], "25021", "archive").is_err());
    }

    #[tokio::test]
    async fn test_execute_moves_and_reports_failures() {
        let remote = MemoryRemoteStore::new();
        remote.put_object("2411_a/x.csv", "x");
        remote.put_object("2411_a/Accepted/y.pdb", "y");
        let plan = ArchivePlan {
            archive_prefix: "archive".into(),
            to_move: names(&["2411_a"]),
            skipped: vec![],
        };
        let report = execute_archive(&remote, &plan).await;
        assert_eq!(report.folders_moved, 1);
        assert_eq!(report.objects_moved, 2);
        assert!(report.diagnostics.is_empty());
        assert!(remote.keys().iter().all(|k| k.starts_with("archive/2411_a/")));
    }
}
