//! Recovery unit
//!
//! A [`RecoveryUnit`] collects the [`Change`]s made during one unit of work
//! and finalizes every one of them exactly once:
//!
//! - `commit_unit_of_work` commits them in registration order
//! - `abort_unit_of_work` rolls them back most-recent-first
//! - dropping a unit with pending changes aborts it
//!
//! Finalization drains the pending list before running any change, so a
//! change can never be finalized twice, even if another one fails.

use crate::change::Change;
use pmstore_core::PmseResult;
use tracing::{debug, error, warn};

/// Counts from one finalization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinalizeStats {
    /// Changes finalized successfully
    pub applied: usize,
    /// Changes whose finalizer returned an error
    pub failed: usize,
}

/// Transaction-side owner of change objects
#[derive(Debug, Default)]
pub struct RecoveryUnit {
    changes: Vec<Change>,
}

impl RecoveryUnit {
    /// Create an empty unit
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a change made during this unit of work
    pub fn register_change(&mut self, change: Change) {
        self.changes.push(change);
    }

    /// Number of changes awaiting finalization
    pub fn pending(&self) -> usize {
        self.changes.len()
    }

    /// Commit every pending change in registration order
    ///
    /// All changes are committed even if one fails; the first error is
    /// returned.
    pub fn commit_unit_of_work(&mut self) -> PmseResult<FinalizeStats> {
        let changes = std::mem::take(&mut self.changes);
        let result = finalize(changes.into_iter(), Change::commit, "commit");
        if let Ok(stats) = &result {
            debug!(target: "pmstore::engine", applied = stats.applied, "Unit of work committed");
        }
        result
    }

    /// Roll back every pending change, most recent first
    ///
    /// All changes are rolled back even if one fails; the first error is
    /// returned.
    pub fn abort_unit_of_work(&mut self) -> PmseResult<FinalizeStats> {
        let changes = std::mem::take(&mut self.changes);
        let result = finalize(changes.into_iter().rev(), Change::rollback, "rollback");
        if let Ok(stats) = &result {
            debug!(target: "pmstore::engine", applied = stats.applied, "Unit of work aborted");
        }
        result
    }
}

impl Drop for RecoveryUnit {
    fn drop(&mut self) {
        if self.changes.is_empty() {
            return;
        }
        warn!(
            target: "pmstore::engine",
            pending = self.changes.len(),
            "Recovery unit dropped with pending changes, rolling back"
        );
        if let Err(e) = self.abort_unit_of_work() {
            error!(target: "pmstore::engine", error = %e, "Rollback on drop failed");
        }
    }
}

fn finalize<I, F>(changes: I, mut apply: F, action: &str) -> PmseResult<FinalizeStats>
where
    I: Iterator<Item = Change>,
    F: FnMut(Change) -> PmseResult<()>,
{
    let mut stats = FinalizeStats::default();
    let mut first_error = None;
    for change in changes {
        let loc = change.loc();
        match apply(change) {
            Ok(()) => stats.applied += 1,
            Err(e) => {
                warn!(target: "pmstore::engine", action, id = %loc, error = %e, "Change finalization failed");
                stats.failed += 1;
                first_error.get_or_insert(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(stats),
    }
}
