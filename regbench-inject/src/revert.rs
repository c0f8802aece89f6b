//! Undoing injected regressions

use indexmap::IndexMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use thiserror::Error;

/// Errors restoring the pristine source tree
#[derive(Debug, Error)]
pub enum RevertError {
    /// The version-control tool could not be started
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The version-control tool reported failure
    #[error("revert failed ({status}): {output}")]
    Failed {
        /// Exit status
        status: ExitStatus,
        /// Combined output
        output: String,
    },

    /// The working tree had modifications before the experiment started
    #[error("working tree has uncommitted changes:\n{output}")]
    Dirty {
        /// Modified paths as reported by the version-control tool
        output: String,
    },

    /// Reading or restoring a file failed
    #[error("{}: {source}", path.display())]
    Io {
        /// File being snapshotted or restored
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Restores modified source files to their pristine state
pub trait Revert {
    /// Called once before any file is modified
    fn preflight(&self) -> Result<(), RevertError> {
        Ok(())
    }

    /// Called before `path` is modified
    fn track(&mut self, _path: &Path) -> Result<(), RevertError> {
        Ok(())
    }

    /// Discard all modifications since the last revert
    fn revert(&mut self) -> Result<(), RevertError>;
}

impl<R: Revert + ?Sized> Revert for Box<R> {
    fn preflight(&self) -> Result<(), RevertError> {
        (**self).preflight()
    }

    fn track(&mut self, path: &Path) -> Result<(), RevertError> {
        (**self).track(path)
    }

    fn revert(&mut self) -> Result<(), RevertError> {
        (**self).revert()
    }
}

/// Reverts through `git reset --hard` in the project root
#[derive(Debug, Clone)]
pub struct GitReverter {
    root: PathBuf,
    program: OsString,
}

impl GitReverter {
    /// Revert the git repository containing `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_program(root, "git")
    }

    /// Use a specific git binary
    pub fn with_program(root: impl Into<PathBuf>, program: impl Into<OsString>) -> Self {
        Self {
            root: root.into(),
            program: program.into(),
        }
    }

    /// Fail with [`RevertError::Dirty`] if tracked files have uncommitted changes.
    ///
    /// `git reset --hard` would silently discard them.
    pub fn ensure_clean(&self) -> Result<(), RevertError> {
        let output = self.git(&["status", "--porcelain", "--untracked-files=no"])?;
        if output.trim().is_empty() {
            Ok(())
        } else {
            Err(RevertError::Dirty { output })
        }
    }

    fn git(&self, args: &[&str]) -> Result<String, RevertError> {
        tracing::debug!(
            "Running {} {} in {}",
            self.program.to_string_lossy(),
            args.join(" "),
            self.root.display()
        );
        let output = Command::new(&self.program)
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(|source| RevertError::Spawn {
                program: self.program.to_string_lossy().into_owned(),
                source,
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        if output.status.success() {
            Ok(text)
        } else {
            Err(RevertError::Failed {
                status: output.status,
                output: text,
            })
        }
    }
}

impl Revert for GitReverter {
    fn preflight(&self) -> Result<(), RevertError> {
        self.ensure_clean()
    }

    fn revert(&mut self) -> Result<(), RevertError> {
        self.git(&["reset", "--hard"]).map(|_| ())
    }
}

/// Keeps the original bytes of every modified file and writes them back
#[derive(Debug, Default)]
pub struct SnapshotReverter {
    files: IndexMap<PathBuf, Vec<u8>>,
}

impl SnapshotReverter {
    /// Create an empty snapshot store
    pub fn new() -> Self {
        Self::default()
    }

    /// Files that will be restored by the next revert
    pub fn tracked(&self) -> impl Iterator<Item = &Path> {
        self.files.keys().map(PathBuf::as_path)
    }
}

impl Revert for SnapshotReverter {
    fn track(&mut self, path: &Path) -> Result<(), RevertError> {
        // First snapshot wins: later ones would capture already-modified bytes.
        if self.files.contains_key(path) {
            return Ok(());
        }
        let bytes = std::fs::read(path).map_err(|source| RevertError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.files.insert(path.to_path_buf(), bytes);
        Ok(())
    }

    fn revert(&mut self) -> Result<(), RevertError> {
        while let Some((path, bytes)) = self.files.pop() {
            if let Err(source) = std::fs::write(&path, &bytes) {
                self.files.insert(path.clone(), bytes);
                return Err(RevertError::Io { path, source });
            }
        }
        Ok(())
    }
}
