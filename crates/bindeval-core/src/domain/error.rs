//! Domain-level error taxonomy for bindeval.
//!
//! Only failures that end a unit (or the whole run, for configuration
//! problems) are errors. Per-design problems are `Diagnostic`s instead.

use std::path::PathBuf;

use bindeval_state::StorageError;

use super::work_unit::UnitState;

/// bindeval domain errors.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// Ledger exists but cannot be used; fatal before any unit runs.
    #[error("unusable ledger {}: {reason}", path.display())]
    LedgerFormat { path: PathBuf, reason: String },

    /// A unit's stats cannot be shaped into the fixed ledger schema.
    #[error("schema error in unit {unit}: {reason}")]
    Schema { unit: String, reason: String },

    #[error("invalid work unit transition for {unit}: {from:?} -> {to:?}")]
    InvalidTransition {
        unit: String,
        from: UnitState,
        to: UnitState,
    },

    #[error("invalid archive cutoff {0:?}: expected four digits YYMM")]
    InvalidCutoff(String),

    #[error("structure parse error: {0}")]
    Structure(String),

    #[error("export error: {0}")]
    Export(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for bindeval domain operations.
pub type Result<T> = std::result::Result<T, EvalError>;
