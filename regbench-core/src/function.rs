//! Benchmark identities and the discovered catalogue

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// Identity of a Go function or method.
///
/// Parameters and return types are not part of the identity: Go has no
/// overloading, so package, file, name and receiver are sufficient.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId {
    /// Package path relative to the project root (`""` for the root package, otherwise `/a/b`)
    pub pkg: String,
    /// File name inside the package directory
    pub file: String,
    /// Function or method name
    pub name: String,
    /// Receiver type name (`T` or `*T`), empty for plain functions
    #[serde(default)]
    pub receiver: String,
}

impl FunctionId {
    /// Create a function identity
    pub fn new(
        pkg: impl Into<String>,
        file: impl Into<String>,
        name: impl Into<String>,
        receiver: impl Into<String>,
    ) -> Self {
        Self {
            pkg: pkg.into(),
            file: file.into(),
            name: name.into(),
            receiver: receiver.into(),
        }
    }

    /// Whether this identity names a method
    pub fn is_method(&self) -> bool {
        !self.receiver.is_empty()
    }

    /// Qualified path used in logs, penalty keys and output rows.
    ///
    /// `pkg/file::Name` for functions, `pkg/file::(Recv).Name` for methods.
    pub fn qualified(&self) -> String {
        self.to_string()
    }

    /// Absolute path of the source file containing this function
    pub fn source_path(&self, project: &Path) -> PathBuf {
        package_dir(project, &self.pkg).join(&self.file)
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.receiver.is_empty() {
            write!(f, "{}/{}::{}", self.pkg, self.file, self.name)
        } else {
            write!(
                f,
                "{}/{}::({}).{}",
                self.pkg, self.file, self.receiver, self.name
            )
        }
    }
}

/// Directory of a package inside the project.
///
/// Package paths carry a leading `/`, which must not turn the join into an
/// absolute path.
pub fn package_dir(project: &Path, pkg: &str) -> PathBuf {
    let relative = pkg.trim_start_matches('/');
    if relative.is_empty() {
        project.to_path_buf()
    } else {
        project.join(relative)
    }
}

/// A discovered benchmark function.
///
/// Equality and hashing only consider the identity; the line span is
/// informational.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkFunction {
    /// Identity of the benchmark
    #[serde(flatten)]
    pub id: FunctionId,
    /// First source line (1-based)
    pub start_line: usize,
    /// Last source line (1-based)
    pub end_line: usize,
}

impl BenchmarkFunction {
    /// Benchmark function name, as passed to `go test -bench`
    pub fn name(&self) -> &str {
        &self.id.name
    }

    /// Package path of the benchmark
    pub fn pkg(&self) -> &str {
        &self.id.pkg
    }
}

impl PartialEq for BenchmarkFunction {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for BenchmarkFunction {}

impl Hash for BenchmarkFunction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// A function to slow down, together with the fractional slowdown to inject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTarget {
    /// Function whose body receives the delay
    pub function: FunctionId,
    /// Delay as a fraction of the function's own elapsed time (1.0 doubles it)
    pub violation: f64,
}

impl RegressionTarget {
    /// Create a regression target
    pub fn new(function: FunctionId, violation: f64) -> Self {
        Self {
            function,
            violation,
        }
    }
}

impl fmt::Display for RegressionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.function.fmt(f)
    }
}

/// Benchmarks of one package, keyed by file name in discovery order
pub type FileMap = IndexMap<String, Vec<BenchmarkFunction>>;

/// All discovered benchmarks: package path → file name → benchmarks.
///
/// Insertion order defines the default execution order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Catalogue {
    packages: IndexMap<String, FileMap>,
}

impl Catalogue {
    /// Create an empty catalogue
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the benchmarks of a file.
    ///
    /// Returns the previous entry when the same package already contained a
    /// file with this name; the new benchmarks replace it.
    pub fn insert_file(
        &mut self,
        pkg: impl Into<String>,
        file: impl Into<String>,
        benchmarks: Vec<BenchmarkFunction>,
    ) -> Option<Vec<BenchmarkFunction>> {
        self.packages
            .entry(pkg.into())
            .or_default()
            .insert(file.into(), benchmarks)
    }

    /// Benchmarks of a single file
    pub fn file(&self, pkg: &str, file: &str) -> Option<&[BenchmarkFunction]> {
        self.packages
            .get(pkg)
            .and_then(|files| files.get(file))
            .map(Vec::as_slice)
    }

    /// Packages in catalogue order
    pub fn packages(&self) -> impl Iterator<Item = (&str, &FileMap)> {
        self.packages.iter().map(|(pkg, files)| (pkg.as_str(), files))
    }

    /// Every benchmark in catalogue order
    pub fn iter(&self) -> impl Iterator<Item = &BenchmarkFunction> {
        self.packages
            .values()
            .flat_map(|files| files.values())
            .flatten()
    }

    /// Total number of benchmarks
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Whether no benchmark was discovered
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Number of packages containing benchmarks
    pub fn package_count(&self) -> usize {
        self.packages.len()
    }
}

/// One observed benchmark sample, as printed by `go test -bench`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MeasurementRecord {
    /// Invocations of the benchmark body (`b.N`)
    pub invocations: u64,
    /// Time per invocation in nanoseconds
    pub runtime: f64,
    /// Bytes allocated per invocation (memory mode only)
    pub memory: Option<u64>,
    /// Allocations per invocation (memory mode only)
    pub allocations: Option<u64>,
}
