#![warn(missing_docs)]
//! # regbench
//!
//! Differential performance-regression benchmarking harness for Go projects.
//!
//! regbench measures a project's `go test` benchmarks under a pristine
//! baseline and under deliberately injected slowdowns:
//! - **Discovery**: syntax-only scan of `_test.go` files for `Benchmark*` functions
//! - **Result Parsing**: whitespace-token grammar over `go test -bench` output, with a distinct "not parsable" fault
//! - **Scheduling**: one subprocess per benchmark, duration sampling, RunUntil sweeps, permanent penalization
//! - **Regression Injection**: byte-stable rewrite of a target function to sleep in proportion to its own runtime
//! - **Experiment Loop**: baseline plus one pass per target, repeated across runs, reverted after every pass
//!
//! ## Quick Start
//!
//! ```text
//! regbench init > regbench.toml   # edit project and [[regression.targets]]
//! regbench list
//! regbench run -o results.csv
//! ```
//!
//! ## Library use
//!
//! ```ignore
//! use regbench::prelude::*;
//!
//! let report = Discovery::new("/work/widget", DEFAULT_PATTERN)?.discover()?;
//! let runner = Runner::new(
//!     RunConfig::default(),
//!     report.catalogue,
//!     GoTool::new("/work/widget", None),
//!     RecordWriter::new(std::io::stdout(), false),
//! );
//! let plan = ExperimentPlan { runs: 2, ..ExperimentPlan::default() };
//! let injector = Injector::new("/work/widget", GitReverter::new("/work/widget"));
//! Experiment::new(plan, runner, injector).run()?;
//! ```

// Re-export core types
pub use regbench_core::{
    BenchmarkFunction, Catalogue, DEFAULT_PATTERN, Discovery, DiscoveryError, DiscoveryReport,
    FunctionId, MeasurementRecord, ParseError, ParseMode, RegressionTarget, ResultParser,
    format_go_duration, parse_duration,
};

// Re-export injection types
pub use regbench_inject::{
    GitReverter, InjectError, InjectOutcome, Injector, Revert, RevertError, SnapshotReverter,
    inject_source,
};

// Re-export the record sink
pub use regbench_report::{RecordKey, RecordWriter, SinkError};

// Re-export scheduling and the experiment loop
pub use regbench_cli::{
    BASELINE_LABEL, Deadline, Experiment, ExperimentError, ExperimentPlan, ExperimentSummary,
    GoTool, Invocation, InvocationOutput, Invoke, InvokeError, PassId, PassSummary,
    PenaltyReason, PenaltySet, ProfileMode, RegbenchConfig, RunConfig, Runner, SchedulerError,
    randomized_order, run,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BenchmarkFunction, Catalogue, DEFAULT_PATTERN, Discovery, Experiment, ExperimentPlan,
        FunctionId, GitReverter, GoTool, Injector, MeasurementRecord, RecordWriter,
        RegressionTarget, ResultParser, RunConfig, Runner, SnapshotReverter,
    };
}
