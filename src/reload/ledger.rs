//! Per-service reload ledger.
//!
//! Every changed service is recorded as pending with the registry version
//! that carried the change. An apply settles the pending services it covers:
//! applied on success, failed otherwise. A failed service stays in the next
//! apply and is settled again by it.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

/// Where a service's latest change stands with respect to the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ReloadState {
    /// Changed in the registry, not yet in force.
    Pending,
    /// In force after a verified apply.
    Applied,
    /// The last apply covering the change failed.
    Failed(String),
}

#[derive(Debug, Clone)]
struct LedgerEntry {
    version: u64,
    state: ReloadState,
}

/// Reload state of every service changed since startup.
#[derive(Debug, Default)]
pub struct ReloadLedger {
    entries: Mutex<BTreeMap<String, LedgerEntry>>,
}

impl ReloadLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `names` as changed at registry `version`.
    pub fn mark_pending<'a>(&self, names: impl IntoIterator<Item = &'a str>, version: u64) {
        let mut entries = self.lock();
        for name in names {
            entries.insert(
                name.to_string(),
                LedgerEntry {
                    version,
                    state: ReloadState::Pending,
                },
            );
        }
    }

    /// Mark every unsettled change up to `version` as applied.
    pub fn settle_applied(&self, version: u64) {
        self.settle(version, ReloadState::Applied);
    }

    /// Mark every unsettled change up to `version` as failed with `error`.
    pub fn settle_failed(&self, version: u64, error: &str) {
        self.settle(version, ReloadState::Failed(error.to_string()));
    }

    pub fn state(&self, name: &str) -> Option<ReloadState> {
        self.lock().get(name).map(|entry| entry.state.clone())
    }

    /// Number of changes not yet in force.
    pub fn pending(&self) -> usize {
        self.lock()
            .values()
            .filter(|entry| entry.state == ReloadState::Pending)
            .count()
    }

    fn settle(&self, version: u64, state: ReloadState) {
        let mut entries = self.lock();
        for entry in entries.values_mut() {
            if entry.state != ReloadState::Applied && entry.version <= version {
                entry.state = state.clone();
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, LedgerEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_settles_only_covered_versions() {
        let ledger = ReloadLedger::new();
        ledger.mark_pending(["a"], 1);
        ledger.mark_pending(["b"], 2);

        ledger.settle_applied(1);

        assert_eq!(ledger.state("a"), Some(ReloadState::Applied));
        assert_eq!(ledger.state("b"), Some(ReloadState::Pending));
        assert_eq!(ledger.pending(), 1);
        assert_eq!(ledger.state("c"), None);
    }

    #[test]
    fn test_failed_change_is_retried_by_next_apply() {
        let ledger = ReloadLedger::new();
        ledger.mark_pending(["a"], 1);

        ledger.settle_failed(1, "reload failed");
        assert_eq!(ledger.state("a"), Some(ReloadState::Failed("reload failed".into())));

        ledger.settle_applied(2);
        assert_eq!(ledger.state("a"), Some(ReloadState::Applied));
    }

    #[test]
    fn test_failure_does_not_override_applied() {
        let ledger = ReloadLedger::new();
        ledger.mark_pending(["a"], 1);
        ledger.settle_applied(1);

        ledger.settle_failed(1, "late failure");
        assert_eq!(ledger.state("a"), Some(ReloadState::Applied));
    }

    #[test]
    fn test_new_change_reopens_service() {
        let ledger = ReloadLedger::new();
        ledger.mark_pending(["a"], 1);
        ledger.settle_applied(1);

        ledger.mark_pending(["a"], 3);
        assert_eq!(ledger.state("a"), Some(ReloadState::Pending));
    }
}
