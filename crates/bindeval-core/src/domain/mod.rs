//! Domain models for bindeval.
//!
//! Canonical definitions for the core entities:
//! - `Design`: One evaluated binder candidate
//! - `WorkUnit`: A remote batch of designs and its lifecycle
//! - `Diagnostic`: Non-fatal finding tied to a stage and optionally a design

pub mod design;
pub mod diagnostic;
pub mod error;
pub mod work_unit;

// Re-export main types and errors
pub use design::{columns, non_null, Design};
pub use diagnostic::{Diagnostic, Stage};
pub use error::{EvalError, Result};
pub use work_unit::{UnitState, WorkUnit};
