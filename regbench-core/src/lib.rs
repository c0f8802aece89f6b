#![warn(missing_docs)]
//! regbench Core - Catalogue and Parsing
//!
//! This crate provides the data model shared by every regbench component:
//! - `Catalogue` of benchmark functions discovered in a Go project
//! - `ResultParser` for `go test -bench` output
//! - `GoFile`, a syntax-only view of Go source backed by tree-sitter
//! - Go duration parsing and formatting for configuration and flags

mod discovery;
mod duration;
mod function;
mod parser;
mod syntax;

pub use discovery::{
    BENCHMARK_PREFIX, DEFAULT_PATTERN, Discovery, DiscoveryError, DiscoveryReport, FileError,
    FileFailure, SKIPPED_DIRS, TEST_FILE_SUFFIX, package_path,
};
pub use duration::{DurationError, format_go_duration, parse_duration};
pub use function::{
    BenchmarkFunction, Catalogue, FileMap, FunctionId, MeasurementRecord, RegressionTarget,
    package_dir,
};
pub use parser::{ALLOCS_UNIT, BYTES_UNIT, ParseError, ParseMode, RUNTIME_UNIT, ResultParser};
pub use syntax::{BodySpan, FuncDecl, GoFile, ImportSpec, SyntaxError};
