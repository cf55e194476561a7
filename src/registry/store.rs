//! In-memory service registry.
//!
//! # Responsibilities
//! - Own the name → entry mapping
//! - Serialize all mutations behind one lock
//! - Hand out point-in-time, name-ordered snapshots for rendering
//! - Track a version and a dirty flag for the apply path

use std::collections::BTreeMap;
use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::observability::metrics;
use crate::registry::persist::{PersistError, StateFile};
use crate::registry::types::{RegistryError, ServiceEntry};

/// A point-in-time copy of the registry, sorted by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Registry version the snapshot was taken at.
    pub version: u64,
    pub entries: Vec<ServiceEntry>,
}

/// Summary of the registry for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RegistryStats {
    pub services: usize,
    pub version: u64,
    pub dirty: bool,
}

#[derive(Debug, Default)]
struct RegistryState {
    entries: BTreeMap<String, ServiceEntry>,
    version: u64,
    dirty: bool,
}

/// Mutex-guarded registry of declared services.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    state: Mutex<RegistryState>,
    state_file: Option<StateFile>,
    /// Version last written to `state_file`. Held while writing, so saves
    /// never overtake each other.
    saved: Mutex<u64>,
}

impl ServiceRegistry {
    /// Create an empty, non-persistent registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry backed by `state_file`, restoring what it holds.
    ///
    /// Restored entries are marked dirty: they have not been applied by this
    /// process yet.
    pub fn restore(state_file: StateFile) -> io::Result<Self> {
        let mut state = RegistryState::default();
        for entry in state_file.load()? {
            match entry.validate() {
                Ok(()) => {
                    state.entries.insert(entry.name.clone(), entry);
                }
                Err(e) => {
                    tracing::warn!(path = %state_file.path().display(), error = %e, "Skipping invalid saved service");
                }
            }
        }
        if !state.entries.is_empty() {
            state.version = 1;
            state.dirty = true;
        }

        tracing::info!(
            path = %state_file.path().display(),
            services = state.entries.len(),
            "Registry restored"
        );
        metrics::record_registry_size(state.entries.len());

        Ok(Self {
            saved: Mutex::new(state.version),
            state: Mutex::new(state),
            state_file: Some(state_file),
        })
    }

    /// Insert or replace one entry.
    pub fn upsert(&self, entry: ServiceEntry) -> Result<(), RegistryError> {
        self.upsert_batch(vec![entry])
            .pop()
            .unwrap_or(Ok(()))
    }

    /// Insert or replace several entries under one lock acquisition.
    ///
    /// Invalid entries are reported in place and leave the registry untouched;
    /// the valid ones are committed together. Returns one result per input.
    pub fn upsert_batch(&self, entries: Vec<ServiceEntry>) -> Vec<Result<(), RegistryError>> {
        let mut state = self.lock();
        let mut changed = false;

        let results = entries
            .into_iter()
            .map(|entry| -> Result<(), RegistryError> {
                entry.validate()?;
                if state.entries.get(&entry.name) != Some(&entry) {
                    tracing::debug!(service = %entry.name, port = entry.port, domain = %entry.domain, "Service upserted");
                    state.entries.insert(entry.name.clone(), entry);
                    changed = true;
                }
                Ok(())
            })
            .collect();

        if changed {
            self.commit(&mut state);
        }
        results
    }

    /// Delete one entry, returning it.
    pub fn remove(&self, name: &str) -> Result<ServiceEntry, RegistryError> {
        self.remove_batch(&[name.to_string()])
            .pop()
            .unwrap_or_else(|| Err(RegistryError::NotFound(name.to_string())))
    }

    /// Delete several entries under one lock acquisition.
    ///
    /// Missing names are reported individually and do not stop the others.
    pub fn remove_batch(&self, names: &[String]) -> Vec<Result<ServiceEntry, RegistryError>> {
        let mut state = self.lock();
        let mut changed = false;

        let results = names
            .iter()
            .map(|name| match state.entries.remove(name) {
                Some(entry) => {
                    tracing::debug!(service = %name, "Service removed");
                    changed = true;
                    Ok(entry)
                }
                None => Err(RegistryError::NotFound(name.clone())),
            })
            .collect();

        if changed {
            self.commit(&mut state);
        }
        results
    }

    /// Copy the current entries in name order.
    pub fn snapshot(&self) -> Snapshot {
        let state = self.lock();
        Snapshot {
            version: state.version,
            entries: state.entries.values().cloned().collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<ServiceEntry> {
        self.lock().entries.get(name).cloned()
    }

    pub fn stats(&self) -> RegistryStats {
        let state = self.lock();
        RegistryStats {
            services: state.entries.len(),
            version: state.version,
            dirty: state.dirty,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    /// Clear the dirty flag if nothing changed since `version` was applied.
    pub fn mark_clean(&self, version: u64) {
        let mut state = self.lock();
        if state.version == version {
            state.dirty = false;
        }
    }

    /// Whether mutations are saved to a state file.
    pub fn is_persistent(&self) -> bool {
        self.state_file.is_some()
    }

    /// Write the registry to its state file if it changed since the last save.
    ///
    /// Blocking file I/O, done outside the registry lock. Returns whether
    /// anything was written; a registry without a state file never writes.
    pub fn persist(&self) -> Result<bool, PersistError> {
        let Some(file) = &self.state_file else {
            return Ok(false);
        };
        let snapshot = self.snapshot();

        let mut saved = self.saved.lock().unwrap_or_else(PoisonError::into_inner);
        if snapshot.version <= *saved {
            return Ok(false);
        }
        let entries: Vec<&ServiceEntry> = snapshot.entries.iter().collect();
        file.save(&entries).map_err(|source| PersistError {
            path: file.path().to_path_buf(),
            source,
        })?;
        *saved = snapshot.version;

        tracing::debug!(path = %file.path().display(), version = snapshot.version, "Registry saved");
        Ok(true)
    }

    fn commit(&self, state: &mut RegistryState) {
        state.version += 1;
        state.dirty = true;
        metrics::record_registry_size(state.entries.len());
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // Every mutation completes before the guard is released, so a
        // poisoned state is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_is_idempotent() {
        let registry = ServiceRegistry::new();
        registry.upsert(ServiceEntry::new("x", 80, "a")).unwrap();
        registry.upsert(ServiceEntry::new("x", 8080, "b")).unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.entries, vec![ServiceEntry::new("x", 8080, "b")]);
    }

    #[test]
    fn test_identical_upsert_does_not_bump_version() {
        let registry = ServiceRegistry::new();
        registry.upsert(ServiceEntry::new("x", 80, "a")).unwrap();
        let version = registry.stats().version;

        registry.upsert(ServiceEntry::new("x", 80, "a")).unwrap();
        assert_eq!(registry.stats().version, version);
    }

    #[test]
    fn test_invalid_entry_leaves_registry_untouched() {
        let registry = ServiceRegistry::new();
        let err = registry.upsert(ServiceEntry::new("", 80, "a")).unwrap_err();

        assert!(matches!(err, RegistryError::Validation { .. }));
        assert_eq!(registry.stats(), RegistryStats { services: 0, version: 0, dirty: false });
    }

    #[test]
    fn test_batch_commits_valid_entries_only() {
        let registry = ServiceRegistry::new();
        let results = registry.upsert_batch(vec![
            ServiceEntry::new("good", 80, ".good.com"),
            ServiceEntry::new("bad", 0, ".bad.com"),
        ]);

        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(registry.get("good").is_some());
        assert!(registry.get("bad").is_none());
        assert_eq!(registry.stats().version, 1);
    }

    #[test]
    fn test_remove_reports_missing_names_individually() {
        let registry = ServiceRegistry::new();
        registry.upsert(ServiceEntry::new("exists", 80, "a")).unwrap();

        let results = registry.remove_batch(&["exists".to_string(), "missing".to_string()]);

        assert!(results[0].is_ok());
        assert_eq!(results[1], Err(RegistryError::NotFound("missing".into())));
        assert!(registry.get("exists").is_none());
    }

    #[test]
    fn test_snapshot_is_sorted_by_name() {
        let registry = ServiceRegistry::new();
        for name in ["charlie", "alpha", "bravo"] {
            registry.upsert(ServiceEntry::new(name, 80, name)).unwrap();
        }

        let names: Vec<_> = registry
            .snapshot()
            .entries
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["alpha", "bravo", "charlie"]);
    }

    #[test]
    fn test_mark_clean_ignores_stale_versions() {
        let registry = ServiceRegistry::new();
        registry.upsert(ServiceEntry::new("a", 80, "a")).unwrap();
        let applied = registry.snapshot().version;
        registry.upsert(ServiceEntry::new("b", 81, "b")).unwrap();

        registry.mark_clean(applied);
        assert!(registry.is_dirty());

        registry.mark_clean(registry.snapshot().version);
        assert!(!registry.is_dirty());
    }

    #[test]
    fn test_restore_marks_registry_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");

        let registry = ServiceRegistry::restore(StateFile::new(&path)).unwrap();
        registry.upsert(ServiceEntry::new("myapp", 7777, ".example.com")).unwrap();
        assert!(registry.persist().unwrap());
        drop(registry);

        let restored = ServiceRegistry::restore(StateFile::new(&path)).unwrap();
        assert_eq!(restored.get("myapp").unwrap().port, 7777);
        assert!(restored.is_dirty());
    }

    #[test]
    fn test_persist_writes_only_new_versions() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ServiceRegistry::restore(StateFile::new(dir.path().join("registry.json"))).unwrap();

        assert!(!registry.persist().unwrap());
        registry.upsert(ServiceEntry::new("a", 80, "a")).unwrap();
        assert!(registry.persist().unwrap());
        assert!(!registry.persist().unwrap());
        assert!(!ServiceRegistry::new().persist().unwrap());
    }

    #[test]
    fn test_persist_failure_is_returned_and_retried() {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().join("state");
        std::fs::create_dir(&state_dir).unwrap();
        let registry = ServiceRegistry::restore(StateFile::new(state_dir.join("registry.json"))).unwrap();
        std::fs::remove_dir(&state_dir).unwrap();

        registry.upsert(ServiceEntry::new("a", 80, "a")).unwrap();
        let err = registry.persist().unwrap_err();
        assert!(err.to_string().starts_with("failed to save registry to "), "{}", err);
        assert!(registry.get("a").is_some());

        std::fs::create_dir(&state_dir).unwrap();
        assert!(registry.persist().unwrap());
    }
}
