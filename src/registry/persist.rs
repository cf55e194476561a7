//! Registry persistence.
//!
//! The registry is saved as a JSON array of entries after every mutation and
//! restored at startup, so a restart does not forget declared services.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::registry::types::ServiceEntry;
use crate::reload::atomic::write_atomically;

/// Saving the registry failed; the in-memory registry is unaffected.
#[derive(Debug, Error)]
#[error("failed to save registry to {}: {source}", .path.display())]
pub struct PersistError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// JSON file holding the registry between restarts.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load saved entries. A missing file is an empty registry.
    pub fn load(&self) -> io::Result<Vec<ServiceEntry>> {
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let entries: Vec<ServiceEntry> = serde_json::from_slice(&content)?;
        Ok(entries)
    }

    /// Replace the saved entries atomically.
    pub fn save(&self, entries: &[&ServiceEntry]) -> io::Result<()> {
        let body = serde_json::to_vec_pretty(entries)?;
        write_atomically(&self.path, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let file = StateFile::new(dir.path().join("registry.json"));

        assert!(file.load().unwrap().is_empty());

        let a = ServiceEntry::new("a", 8001, ".a.example.com");
        let b = ServiceEntry::new("b", 8002, "/b").with_host("10.0.0.2");
        file.save(&[&a, &b]).unwrap();

        assert_eq!(file.load().unwrap(), vec![a, b]);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = StateFile::new(&path).load().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
