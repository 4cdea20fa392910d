//! Interface pAE extraction from prediction result archives.

use std::io::Read;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::error::ScoreError;

/// Field holding the pairwise interface pAE matrix summary.
pub const SCORE_FIELD: &str = "ipae";

/// Key of the value read from `SCORE_FIELD`.
pub const SCORE_KEY: &str = "0";

fn numeric(value: &Value) -> Result<f64, ScoreError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| ScoreError::NonNumeric(value.to_string()))
}

/// Score carried by one parsed json document, if it has a non-null `ipae`.
fn score_in(doc: &Value) -> Option<Result<f64, ScoreError>> {
    let ipae = doc.get(SCORE_FIELD).filter(|v| !v.is_null())?;
    Some(match ipae.get(SCORE_KEY) {
        Some(value) => numeric(value),
        None => Err(ScoreError::NonNumeric(ipae.to_string())),
    })
}

/// Read the interface score from a `.result.zip` archive.
///
/// Members ending in `.json` are scanned in archive order; the first one
/// with a non-null `ipae` decides the result.
pub fn extract_interface_score(archive: &Path) -> Result<f64, ScoreError> {
    let file = match std::fs::File::open(archive) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ScoreError::ArchiveMissing(archive.to_path_buf()))
        }
        Err(e) => return Err(ScoreError::BadArchive(e.to_string())),
    };
    let mut zip = zip::ZipArchive::new(std::io::BufReader::new(file))?;

    let mut malformed = None;
    for i in 0..zip.len() {
        let mut member = zip.by_index(i)?;
        if member.is_dir() || !member.name().ends_with(".json") {
            continue;
        }
        let name = member.name().to_string();
        let mut text = String::new();
        if let Err(e) = member.read_to_string(&mut text) {
            malformed.get_or_insert(ScoreError::Malformed {
                member: name,
                reason: e.to_string(),
            });
            continue;
        }
        let doc: Value = match serde_json::from_str(&text) {
            Ok(doc) => doc,
            Err(e) => {
                malformed.get_or_insert(ScoreError::Malformed {
                    member: name,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if let Some(result) = score_in(&doc) {
            debug!(member = %name, archive = %archive.display(), "ipae found");
            return result;
        }
    }
    Err(malformed.unwrap_or(ScoreError::NoScore))
}
