//! Work unit lifecycle.

use serde::{Deserialize, Serialize};

use super::error::{EvalError, Result};

/// Lifecycle state of a work unit.
///
/// `Discovered → Fetched → Evaluated → Recorded`. A unit that fails stays
/// where it stopped and is picked up from scratch on the next run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    Discovered,
    Fetched,
    Evaluated,
    Recorded,
}

/// One remote batch folder of designs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkUnit {
    pub unit_id: String,
    pub state: UnitState,
}

impl WorkUnit {
    pub fn discovered(unit_id: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            state: UnitState::Discovered,
        }
    }

    /// Move to the next lifecycle state. Skipping or going back is an error.
    pub fn advance(&mut self, to: UnitState) -> Result<()> {
        let expected = match self.state {
            UnitState::Discovered => Some(UnitState::Fetched),
            UnitState::Fetched => Some(UnitState::Evaluated),
            UnitState::Evaluated => Some(UnitState::Recorded),
            UnitState::Recorded => None,
        };
        if expected != Some(to) {
            return Err(EvalError::InvalidTransition {
                unit: self.unit_id.clone(),
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    pub fn is_recorded(&self) -> bool {
        self.state == UnitState::Recorded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_lifecycle() {
        let mut unit = WorkUnit::discovered("2501_a");
        unit.advance(UnitState::Fetched).unwrap();
        unit.advance(UnitState::Evaluated).unwrap();
        unit.advance(UnitState::Recorded).unwrap();
        assert!(unit.is_recorded());
    }

    #[test]
    fn test_cannot_skip_or_leave_recorded() {
        let mut unit = WorkUnit::discovered("2501_a");
        assert!(unit.advance(UnitState::Evaluated).is_err());
        assert_eq!(unit.state, UnitState::Discovered);

        unit.advance(UnitState::Fetched).unwrap();
        unit.advance(UnitState::Evaluated).unwrap();
        unit.advance(UnitState::Recorded).unwrap();
        assert!(unit.advance(UnitState::Recorded).is_err());
    }
}
