//! Work tracker: which remote units still need processing.
//!
//! The processed set is explicit state owned by the caller, seeded from the
//! ledger, so independent pipelines never share it.

use std::collections::BTreeSet;

use bindeval_state::RemoteStore;
use tracing::info;

use crate::domain::Result;
use crate::ledger::Ledger;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkTracker {
    processed: BTreeSet<String>,
}

impl WorkTracker {
    pub fn new(processed: BTreeSet<String>) -> Self {
        Self { processed }
    }

    pub fn from_ledger(ledger: &Ledger) -> Self {
        Self::new(ledger.processed_units())
    }

    pub fn processed(&self) -> &BTreeSet<String> {
        &self.processed
    }

    pub fn is_processed(&self, unit: &str) -> bool {
        self.processed.contains(unit)
    }

    /// Units in `available` not yet processed, plus every `forced` unit,
    /// in lexicographic order without duplicates.
    pub fn discover_new_units(&self, available: &[String], forced: &[String]) -> Vec<String> {
        let new: BTreeSet<&String> = available
            .iter()
            .filter(|u| !u.is_empty() && !self.processed.contains(*u))
            .chain(forced.iter().filter(|u| !u.is_empty()))
            .collect();
        new.into_iter().cloned().collect()
    }

    /// List `prefix` on the remote and diff against the processed set.
    pub async fn discover(
        &self,
        remote: &dyn RemoteStore,
        prefix: &str,
        forced: &[String],
    ) -> Result<Vec<String>> {
        let available = remote.list_folders(prefix).await?;
        let new = self.discover_new_units(&available, forced);
        info!(
            available = available.len(),
            processed = self.processed.len(),
            new = new.len(),
            "work units discovered"
        );
        Ok(new)
    }

    /// Record `unit` as done. Call only once its ledger rows are durable.
    pub fn mark_processed(&mut self, unit: &str) {
        self.processed.insert(unit.to_string());
    }
}
