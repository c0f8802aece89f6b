//! Benchmark Discovery
//!
//! Walks a Go project and collects every benchmark function whose name
//! matches a pattern. Only `_test.go` files are parsed, and vendored or
//! hidden directories are never entered.
//!
//! A file that cannot be read or is not Go at all is reported in
//! [`DiscoveryReport::failures`] and skipped; the walk continues.

use crate::function::{BenchmarkFunction, Catalogue, FunctionId};
use crate::syntax::{GoFile, SyntaxError};
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Name prefix of Go benchmark functions
pub const BENCHMARK_PREFIX: &str = "Benchmark";
/// Suffix of Go test files
pub const TEST_FILE_SUFFIX: &str = "_test.go";
/// Pattern matching every benchmark
pub const DEFAULT_PATTERN: &str = "^.*$";
/// Dependency directories that are never scanned
pub const SKIPPED_DIRS: &[&str] = &["vendor", "_vendor", "_workspace", "Godeps"];

/// Errors that abort discovery
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The name pattern is not a valid regex
    #[error("invalid benchmark pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// The project root itself cannot be read
    #[error("cannot walk project root {path}: {source}")]
    Walk {
        /// Project root
        path: PathBuf,
        /// Underlying walk error
        #[source]
        source: walkdir::Error,
    },
}

/// Why a single file was left out of the catalogue
#[derive(Debug, Error)]
pub enum FileError {
    /// The file or directory could not be read
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not Go source
    #[error("not a Go source file: {0}")]
    Syntax(#[from] SyntaxError),
}

/// A file excluded from the catalogue
#[derive(Debug)]
pub struct FileFailure {
    /// Path of the file or directory
    pub path: PathBuf,
    /// What went wrong
    pub error: FileError,
}

/// Outcome of a discovery walk
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Discovered benchmarks
    pub catalogue: Catalogue,
    /// Files that could not be processed
    pub failures: Vec<FileFailure>,
}

/// Benchmark discovery over one project tree
#[derive(Debug, Clone)]
pub struct Discovery {
    root: PathBuf,
    pattern: Regex,
}

impl Discovery {
    /// Create a discovery for `root` keeping benchmarks whose name matches `pattern`
    pub fn new(root: impl Into<PathBuf>, pattern: &str) -> Result<Self, DiscoveryError> {
        Ok(Self {
            root: root.into(),
            pattern: Regex::new(pattern)?,
        })
    }

    /// Project root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the project and build the catalogue
    pub fn discover(&self) -> Result<DiscoveryReport, DiscoveryError> {
        let mut report = DiscoveryReport::default();

        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_skipped(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => {
                    return Err(DiscoveryError::Walk {
                        path: self.root.clone(),
                        source: err,
                    });
                }
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    tracing::warn!("Skipping {}: {}", path.display(), err);
                    report.failures.push(FileFailure {
                        path,
                        error: FileError::Io(err.into()),
                    });
                    continue;
                }
            };

            if !entry.file_type().is_file() || !is_test_file(entry.file_name().to_str()) {
                continue;
            }

            let path = entry.path();
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let pkg = package_path(&self.root, path.parent().unwrap_or(&self.root));

            match self.scan_file(path, &pkg, &file_name) {
                Ok(benchmarks) if benchmarks.is_empty() => {}
                Ok(benchmarks) => {
                    if report
                        .catalogue
                        .insert_file(pkg.clone(), file_name.clone(), benchmarks)
                        .is_some()
                    {
                        tracing::warn!(
                            "File {} in package '{}' already catalogued; overwriting",
                            file_name,
                            pkg
                        );
                    }
                }
                Err(error) => {
                    tracing::warn!("Skipping {}: {}", path.display(), error);
                    report.failures.push(FileFailure {
                        path: path.to_path_buf(),
                        error,
                    });
                }
            }
        }

        tracing::debug!(
            "Discovered {} benchmarks in {} packages under {}",
            report.catalogue.len(),
            report.catalogue.package_count(),
            self.root.display()
        );
        Ok(report)
    }

    fn scan_file(
        &self,
        path: &Path,
        pkg: &str,
        file_name: &str,
    ) -> Result<Vec<BenchmarkFunction>, FileError> {
        let source = std::fs::read_to_string(path)?;
        let file = GoFile::parse(source)?;
        if file.has_errors() {
            tracing::warn!(
                "{} contains syntax errors; collecting benchmarks on a best-effort basis",
                path.display()
            );
        }
        Ok(self.benchmarks_in(&file, pkg, file_name))
    }

    /// Benchmark functions declared in a parsed file
    pub fn benchmarks_in(&self, file: &GoFile, pkg: &str, file_name: &str) -> Vec<BenchmarkFunction> {
        file.functions()
            .into_iter()
            .filter(|f| f.receiver.is_none())
            .filter(|f| f.name.starts_with(BENCHMARK_PREFIX) && self.pattern.is_match(&f.name))
            .map(|f| BenchmarkFunction {
                id: FunctionId::new(pkg, file_name, f.name, ""),
                start_line: f.start_line,
                end_line: f.end_line,
            })
            .collect()
    }
}

fn is_skipped(entry: &DirEntry) -> bool {
    let Some(name) = entry.file_name().to_str() else {
        return true;
    };
    if entry.file_type().is_dir() {
        name.starts_with('.') || SKIPPED_DIRS.contains(&name)
    } else {
        name.starts_with('.') || name.starts_with('_')
    }
}

fn is_test_file(name: Option<&str>) -> bool {
    name.is_some_and(|n| n.ends_with(TEST_FILE_SUFFIX))
}

/// Package path of `dir` relative to `root`: `""` for the root, otherwise `/a/b`
pub fn package_path(root: &Path, dir: &Path) -> String {
    let Ok(relative) = dir.strip_prefix(root) else {
        return String::new();
    };
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .fold(String::new(), |mut pkg, part| {
            pkg.push('/');
            pkg.push_str(part);
            pkg
        })
}
