//! Non-fatal findings collected while processing units and designs.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Pipeline stage a diagnostic was raised in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Stats,
    Sequence,
    Catalog,
    Job,
    Score,
    Ranking,
    Ledger,
    Export,
    Archive,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Stats => "stats",
            Stage::Sequence => "sequence",
            Stage::Catalog => "catalog",
            Stage::Job => "job",
            Stage::Score => "score",
            Stage::Ranking => "ranking",
            Stage::Ledger => "ledger",
            Stage::Export => "export",
            Stage::Archive => "archive",
        }
    }
}

/// A warning attached to a unit or a single design.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Diagnostic {
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design_id: Option<String>,
    pub message: String,
}

impl Diagnostic {
    /// Build a diagnostic and log it at `warn!`.
    pub fn warn(stage: Stage, design_id: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(
            stage = stage.as_str(),
            design_id = design_id.unwrap_or("-"),
            "{message}"
        );
        Self {
            stage,
            design_id: design_id.map(str::to_string),
            message,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.design_id {
            Some(id) => write!(f, "[{}] {}: {}", self.stage.as_str(), id, self.message),
            None => write!(f, "[{}] {}", self.stage.as_str(), self.message),
        }
    }
}
