//! Scratch directory emptied between passes

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Scratch directory errors
#[derive(Debug, Error)]
pub enum ScratchError {
    /// The directory itself could not be listed
    #[error("cannot read scratch directory {}: {source}", path.display())]
    Read {
        /// Scratch directory
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// A directory whose contents benchmarks may leave behind
#[derive(Debug, Clone)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Use an existing directory
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ScratchError> {
        let path = path.into();
        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => Ok(Self { path }),
            Ok(_) => Err(ScratchError::Read {
                source: std::io::Error::other("not a directory"),
                path,
            }),
            Err(source) => Err(ScratchError::Read { path, source }),
        }
    }

    /// Directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove every entry. Entries that cannot be removed are logged and
    /// skipped; returns the number removed.
    pub fn clear(&self) -> Result<usize, ScratchError> {
        let entries = std::fs::read_dir(&self.path).map_err(|source| ScratchError::Read {
            path: self.path.clone(),
            source,
        })?;

        let mut removed = 0;
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry in {}: {}", self.path.display(), e);
                    continue;
                }
            };
            let path = entry.path();
            let result = match entry.file_type() {
                Ok(ft) if ft.is_dir() => std::fs::remove_dir_all(&path),
                _ => std::fs::remove_file(&path),
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("Could not remove {}: {}", path.display(), e),
            }
        }
        tracing::debug!("Cleared {} entries from {}", removed, self.path.display());
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn clears_files_and_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.out"), b"x").unwrap();
        std::fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
        std::fs::write(dir.path().join("nested/deeper/b"), b"y").unwrap();

        let scratch = ScratchDir::open(dir.path()).unwrap();
        assert_eq!(scratch.clear().unwrap(), 2);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(dir.path().exists());
    }

    #[test]
    fn rejects_missing_or_file_paths() {
        let dir = TempDir::new().unwrap();
        assert!(ScratchDir::open(dir.path().join("missing")).is_err());
        let file = dir.path().join("file");
        std::fs::write(&file, b"").unwrap();
        assert!(ScratchDir::open(&file).is_err());
    }
}
