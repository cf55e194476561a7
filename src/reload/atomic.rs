//! Atomic file replacement.
//!
//! A file is staged into a temporary sibling of its destination and only
//! renamed over the destination on `commit`. Dropping a `StagedFile` without
//! committing removes the temporary and leaves the destination untouched.

use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// Content written next to its destination, not yet visible there.
#[derive(Debug)]
pub struct StagedFile {
    temp: NamedTempFile,
}

impl StagedFile {
    /// Path of the staged temporary (useful for validating it in place).
    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Rename the staged file over `destination`.
    pub fn commit(self, destination: &Path) -> io::Result<()> {
        self.temp.persist(destination).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Write `contents` to a fresh temporary in `destination`'s directory.
///
/// The rename in [`StagedFile::commit`] is atomic because both files share a
/// filesystem.
pub fn stage(destination: &Path, contents: &[u8]) -> io::Result<StagedFile> {
    let dir = match destination.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let prefix = format!(
        ".{}.",
        destination
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("staged")
    );

    let mut temp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;

    Ok(StagedFile { temp })
}

/// Stage and immediately commit `contents` to `destination`.
pub fn write_atomically(destination: &Path, contents: &[u8]) -> io::Result<()> {
    stage(destination, contents)?.commit(destination)
}
