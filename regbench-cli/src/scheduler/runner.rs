//! Benchmark Runner
//!
//! Executes one pass over the catalogue, strictly one subprocess at a time.
//!
//! ## Per-invocation pipeline
//!
//! ```text
//!  penalized? ──yes──► skip (0 executions)
//!      │no
//!      ▼
//!  go test -bench=^Name$ ... ──spawn/dir error──► fatal
//!      │
//!      ▼
//!  exit != 0 && timeout marker ──► penalize (Timeout)
//!      │
//!      ▼
//!  ResultParser ──NotParsable──► penalize (Unparsable)
//!      │          ──Io─────────► fatal
//!      ▼
//!  exit != 0 && no records ──► penalize (Crashed)
//!      │
//!      ▼
//!  RecordWriter::append + flush per record
//! ```

use super::penalty::{PenaltyReason, PenaltySet};
use super::profile::{ProfileKey, ProfileMode, profile_path};
use crate::cancel::{CancelTimer, CancellationToken, Deadline};
use crate::gotool::{Invocation, InvokeError, Invoke};
use indexmap::IndexMap;
use indicatif::{ProgressBar, ProgressStyle};
use regbench_core::{BenchmarkFunction, Catalogue, FunctionId, ParseError, ParseMode, ResultParser};
use regbench_report::{RecordKey, RecordWriter, SinkError};
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors that abort a pass
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The Go tool could not be started in the package directory
    #[error(transparent)]
    Invoke(#[from] InvokeError),

    /// Benchmark output could not be read
    #[error("failed to read benchmark output: {0}")]
    Parse(ParseError),

    /// Records could not be persisted
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// The overall experiment deadline passed
    #[error("experiment deadline exceeded after {executed} executions in the current pass")]
    DeadlineExceeded {
        /// Successful invocations in the interrupted pass
        executed: usize,
    },
}

/// Immutable scheduler configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Warmup iterations, added to the repeat count
    pub warmup_iterations: u32,
    /// Measurement iterations, added to the repeat count
    pub measurement_iterations: u32,
    /// `-benchtime` per iteration
    pub bench_time: Duration,
    /// `-timeout` per invocation
    pub bench_timeout: Duration,
    /// Re-invoke each benchmark until this much time has passed
    pub bench_duration: Option<Duration>,
    /// Loop over the catalogue until this much time has passed
    pub run_duration: Option<Duration>,
    /// Request memory statistics
    pub bench_mem: bool,
    /// Profiles to write
    pub profile: ProfileMode,
    /// Directory receiving profile files
    pub profile_dir: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            warmup_iterations: 0,
            measurement_iterations: 1,
            bench_time: Duration::from_secs(1),
            bench_timeout: Duration::from_secs(600),
            bench_duration: None,
            run_duration: None,
            bench_mem: false,
            profile: ProfileMode::None,
            profile_dir: None,
        }
    }
}

impl RunConfig {
    /// Combined `-count` value, at least 1
    pub fn repeat_count(&self) -> u32 {
        self.warmup_iterations
            .saturating_add(self.measurement_iterations)
            .max(1)
    }

    /// Parser mode matching the requested statistics
    pub fn parse_mode(&self) -> ParseMode {
        if self.bench_mem {
            ParseMode::Memory
        } else {
            ParseMode::Runtime
        }
    }
}

/// Identifies a pass in the output
#[derive(Debug, Clone, Copy)]
pub struct PassId<'a> {
    /// Run index
    pub run: usize,
    /// Pass index within the run (0 = baseline)
    pub pass: usize,
    /// Test label
    pub label: &'a str,
}

/// Result of a completed pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Successful benchmark invocations
    pub executed: usize,
    /// Benchmarks penalized during this pass
    pub penalized: usize,
    /// Wall-clock time of the pass
    pub elapsed: Duration,
}

#[derive(Default)]
struct PassState {
    executed: usize,
    penalized: usize,
    invocations: IndexMap<FunctionId, usize>,
}

impl PassState {
    fn next_invocation(&mut self, id: &FunctionId) -> usize {
        let counter = self.invocations.entry(id.clone()).or_insert(0);
        let index = *counter;
        *counter += 1;
        index
    }
}

/// Sequential benchmark scheduler
pub struct Runner<I, W: Write> {
    config: RunConfig,
    catalogue: Catalogue,
    invoker: I,
    sink: RecordWriter<W>,
    penalties: PenaltySet,
    parser: ResultParser,
    progress: bool,
}

impl<I: Invoke, W: Write> Runner<I, W> {
    /// Create a runner with an empty penalty set
    pub fn new(config: RunConfig, catalogue: Catalogue, invoker: I, sink: RecordWriter<W>) -> Self {
        let parser = ResultParser::new(config.parse_mode());
        Self {
            config,
            catalogue,
            invoker,
            sink,
            penalties: PenaltySet::new(),
            parser,
            progress: false,
        }
    }

    /// Show a progress bar on stderr while a pass runs
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Scheduler configuration
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Benchmarks scheduled by every pass
    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    /// Benchmark invoker
    pub fn invoker(&self) -> &I {
        &self.invoker
    }

    /// Benchmarks excluded so far
    pub fn penalties(&self) -> &PenaltySet {
        &self.penalties
    }

    /// Record sink
    pub fn sink(&self) -> &RecordWriter<W> {
        &self.sink
    }

    /// Flush and return the sink's writer
    pub fn into_sink(self) -> Result<W, SinkError> {
        self.sink.into_inner()
    }

    /// Run one pass over the catalogue.
    ///
    /// Without a run duration every benchmark is visited once. With one,
    /// the catalogue is swept repeatedly until the duration elapses; the
    /// check happens after each benchmark.
    pub fn run_pass(
        &mut self,
        pass: &PassId<'_>,
        deadline: &Deadline,
    ) -> Result<PassSummary, SchedulerError> {
        let start = Instant::now();
        let benchmarks: Vec<BenchmarkFunction> = self.catalogue.iter().cloned().collect();
        let mut state = PassState::default();

        tracing::info!(
            "Run {} pass {} [{}]: {} benchmarks",
            pass.run,
            pass.pass,
            pass.label,
            benchmarks.len()
        );

        match self.config.run_duration {
            None => {
                let pb = self.progress_bar(Some(benchmarks.len() as u64));
                for bench in &benchmarks {
                    pb.set_message(bench.id.qualified());
                    self.run_benchmark(pass, bench, &mut state, deadline)?;
                    pb.inc(1);
                }
                pb.finish_and_clear();
            }
            Some(duration) => {
                let token = CancellationToken::new();
                let _timer = CancelTimer::start(duration, token.clone());
                let pb = self.progress_bar(None);
                'sweep: loop {
                    if benchmarks.iter().all(|b| self.penalties.contains(&b.id)) {
                        tracing::warn!("Every benchmark is penalized; ending pass early");
                        break;
                    }
                    for bench in &benchmarks {
                        pb.set_message(bench.id.qualified());
                        self.run_benchmark(pass, bench, &mut state, deadline)?;
                        pb.tick();
                        if token.is_cancelled() {
                            break 'sweep;
                        }
                    }
                }
                pb.finish_and_clear();
            }
        }

        let summary = PassSummary {
            executed: state.executed,
            penalized: state.penalized,
            elapsed: start.elapsed(),
        };
        tracing::info!(
            "Run {} pass {} [{}]: {} executed, {} penalized in {:.1?}",
            pass.run,
            pass.pass,
            pass.label,
            summary.executed,
            summary.penalized,
            summary.elapsed
        );
        Ok(summary)
    }

    /// One benchmark: a single invocation, or repeated invocations until the bench duration elapses
    fn run_benchmark(
        &mut self,
        pass: &PassId<'_>,
        bench: &BenchmarkFunction,
        state: &mut PassState,
        deadline: &Deadline,
    ) -> Result<(), SchedulerError> {
        match self.config.bench_duration {
            None => {
                state.executed += self.invoke_once(pass, bench, state)?;
                check_deadline(deadline, state)?;
            }
            Some(duration) => {
                let start = Instant::now();
                while start.elapsed() < duration {
                    let executed = self.invoke_once(pass, bench, state)?;
                    state.executed += executed;
                    check_deadline(deadline, state)?;
                    if executed == 0 {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns the number of successful executions (0 or 1)
    fn invoke_once(
        &mut self,
        pass: &PassId<'_>,
        bench: &BenchmarkFunction,
        state: &mut PassState,
    ) -> Result<usize, SchedulerError> {
        let id = &bench.id;
        if self.penalties.contains(id) {
            tracing::debug!("Skipping penalized benchmark {}", id);
            return Ok(0);
        }

        let invocation_index = state.next_invocation(id);
        let key = ProfileKey {
            run: pass.run,
            pass: pass.pass,
            invocation: invocation_index,
            label: pass.label,
            package: &id.pkg,
            benchmark: &id.name,
        };
        let profile_dir = self.config.profile_dir.as_deref();
        let profile = |enabled: bool, kind: &str| {
            profile_dir
                .filter(|_| enabled)
                .map(|dir| profile_path(dir, &key, kind))
        };
        let invocation = Invocation {
            package: &id.pkg,
            benchmark: &id.name,
            count: self.config.repeat_count(),
            bench_time: self.config.bench_time,
            timeout: self.config.bench_timeout,
            bench_mem: self.config.bench_mem,
            cpu_profile: profile(self.config.profile.cpu(), "cpu"),
            mem_profile: profile(self.config.profile.mem(), "mem"),
        };

        let result = self.invoker.invoke(&invocation)?;

        if !result.success() {
            if result.timed_out() {
                self.penalize(id, PenaltyReason::Timeout, state);
                return Ok(0);
            }
            tracing::warn!(
                "{} exited with status {}:\n{}",
                id,
                result
                    .code
                    .map_or_else(|| "signal".to_string(), |c| c.to_string()),
                result.output.trim_end()
            );
        }

        let records = match self.parser.parse(&result.output) {
            Ok(records) => records,
            Err(err) if err.is_not_parsable() => {
                tracing::warn!("{}: {}", id, err);
                self.penalize(id, PenaltyReason::Unparsable, state);
                return Ok(0);
            }
            Err(err) => return Err(SchedulerError::Parse(err)),
        };

        if records.is_empty() {
            if !result.success() {
                self.penalize(id, PenaltyReason::Crashed, state);
                return Ok(0);
            }
            tracing::warn!("{} produced no measurements", id);
        }

        let qualified = id.qualified();
        let record_key = RecordKey {
            run: pass.run,
            pass: pass.pass,
            invocation: invocation_index,
            label: pass.label,
            benchmark: &qualified,
        };
        for record in &records {
            self.sink.append(&record_key, record)?;
        }
        Ok(1)
    }

    fn penalize(&mut self, id: &FunctionId, reason: PenaltyReason, state: &mut PassState) {
        if self.penalties.penalize(id, reason) {
            state.penalized += 1;
            tracing::warn!("Penalizing {} ({}); it will not run again", id, reason);
        }
    }

    fn progress_bar(&self, len: Option<u64>) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        match len {
            Some(len) => {
                let pb = ProgressBar::new(len);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template(
                            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                        )
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("#>-"),
                );
                pb
            }
            None => {
                let pb = ProgressBar::new_spinner();
                pb.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.green} [{elapsed_precise}] {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                pb
            }
        }
    }
}

fn check_deadline(deadline: &Deadline, state: &PassState) -> Result<(), SchedulerError> {
    if deadline.is_expired() {
        return Err(SchedulerError::DeadlineExceeded {
            executed: state.executed,
        });
    }
    Ok(())
}
