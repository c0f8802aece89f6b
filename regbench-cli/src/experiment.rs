//! Experiment Loop
//!
//! Sequences runs, and within each run the baseline pass followed by one
//! regression pass per target:
//!
//! ```text
//!  run r:  pass 0 "Baseline"      run_pass
//!          pass 1 target[0]       inject → run_pass → reset
//!          pass 2 target[1]       inject → run_pass → reset
//!          ...
//! ```
//!
//! Injector and reverter failures abort the experiment. An expired
//! experiment deadline ends it early with a truncated, successful summary.

use crate::cancel::Deadline;
use crate::config::ConfigError;
use crate::scheduler::{PassId, PassSummary, Runner, SchedulerError};
use crate::gotool::Invoke;
use crate::scratch::{ScratchDir, ScratchError};
use chrono::{DateTime, Local};
use rand::Rng;
use rand::seq::SliceRandom;
use regbench_core::RegressionTarget;
use regbench_inject::{InjectError, Injector, Revert, RevertError};
use serde::Serialize;
use std::io::Write;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Test label of the baseline pass
pub const BASELINE_LABEL: &str = "Baseline";

/// Errors that abort an experiment
#[derive(Debug, Error)]
pub enum ExperimentError {
    /// Preflight found an invalid setup
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A regression could not be injected
    #[error(transparent)]
    Inject(#[from] InjectError),

    /// The source tree could not be restored
    #[error("source tree could not be reverted: {0}")]
    Revert(#[from] RevertError),

    /// The scheduler failed
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// The scratch directory could not be emptied
    #[error(transparent)]
    Scratch(#[from] ScratchError),
}

/// What to run
#[derive(Debug, Clone, Default)]
pub struct ExperimentPlan {
    /// Number of runs; 0 counts as 1
    pub runs: usize,
    /// One regression pass per target, in this order unless randomized
    pub targets: Vec<RegressionTarget>,
    /// Shuffle the targets anew in every run
    pub randomize: bool,
    /// Overall deadline
    pub timeout: Option<Duration>,
}

/// Outcome of a finished experiment
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentSummary {
    /// Successful benchmark invocations across all passes
    pub executed: usize,
    /// Passes that ran to completion
    pub passes_completed: usize,
    /// Runs that ran to completion
    pub runs_completed: usize,
    /// Benchmarks excluded by the end of the experiment
    pub penalized: usize,
    /// Whether the deadline ended the experiment early
    pub truncated: bool,
    /// Local start time
    pub started_at: DateTime<Local>,
    /// Wall-clock time
    pub elapsed: Duration,
}

enum PassOutcome {
    Completed(PassSummary),
    Truncated(usize),
}

/// Baseline and regression passes over one catalogue
pub struct Experiment<I, W: Write, R> {
    plan: ExperimentPlan,
    runner: Runner<I, W>,
    injector: Injector<R>,
    scratch: Option<ScratchDir>,
}

impl<I: Invoke, W: Write, R: Revert> Experiment<I, W, R> {
    /// Create an experiment
    pub fn new(plan: ExperimentPlan, runner: Runner<I, W>, injector: Injector<R>) -> Self {
        Self {
            plan,
            runner,
            injector,
            scratch: None,
        }
    }

    /// Empty `scratch` after every pass
    pub fn with_scratch(mut self, scratch: ScratchDir) -> Self {
        self.scratch = Some(scratch);
        self
    }

    /// Experiment plan
    pub fn plan(&self) -> &ExperimentPlan {
        &self.plan
    }

    /// Benchmark scheduler
    pub fn runner(&self) -> &Runner<I, W> {
        &self.runner
    }

    /// Source rewriter
    pub fn injector(&self) -> &Injector<R> {
        &self.injector
    }

    /// Release the scheduler, e.g. to flush its sink
    pub fn into_runner(self) -> Runner<I, W> {
        self.runner
    }

    /// Check that every target file exists and the source tree can be reverted
    pub fn preflight(&self) -> Result<(), ExperimentError> {
        for target in &self.plan.targets {
            let path = target.function.source_path(self.injector.project());
            if !path.is_file() {
                return Err(ConfigError::MissingTarget { path }.into());
            }
        }
        if !self.plan.targets.is_empty() {
            self.injector.reverter().preflight()?;
        }
        Ok(())
    }

    /// Run the experiment with a thread-local random order source
    pub fn run(&mut self) -> Result<ExperimentSummary, ExperimentError> {
        self.run_with_rng(&mut rand::thread_rng())
    }

    /// Run the experiment, shuffling targets with `rng` when randomized
    pub fn run_with_rng<G: Rng + ?Sized>(
        &mut self,
        rng: &mut G,
    ) -> Result<ExperimentSummary, ExperimentError> {
        self.preflight()?;

        let started_at = Local::now();
        let start = Instant::now();
        let deadline = Deadline::from_limit(self.plan.timeout);
        let runs = self.plan.runs.max(1);
        let mut summary = ExperimentSummary {
            executed: 0,
            passes_completed: 0,
            runs_completed: 0,
            penalized: 0,
            truncated: false,
            started_at,
            elapsed: Duration::ZERO,
        };

        tracing::info!(
            "Starting experiment: {} runs, {} benchmarks, {} regression targets",
            runs,
            self.runner.catalogue().len(),
            self.plan.targets.len()
        );

        'runs: for run in 0..runs {
            let targets = if self.plan.randomize {
                randomized_order(&self.plan.targets, rng)
            } else {
                self.plan.targets.clone()
            };

            let passes = std::iter::once(None).chain(targets.iter().map(Some));
            for (pass, target) in passes.enumerate() {
                if deadline.is_expired() {
                    summary.truncated = true;
                    break 'runs;
                }
                match self.pass(run, pass, target, &deadline)? {
                    PassOutcome::Completed(pass_summary) => {
                        summary.executed += pass_summary.executed;
                        summary.passes_completed += 1;
                    }
                    PassOutcome::Truncated(executed) => {
                        summary.executed += executed;
                        summary.truncated = true;
                        break 'runs;
                    }
                }
            }
            summary.runs_completed += 1;
        }

        summary.penalized = self.runner.penalties().len();
        summary.elapsed = start.elapsed();
        if summary.truncated {
            tracing::warn!(
                "Experiment deadline of {:?} exceeded; stopping early with partial results",
                deadline.limit().unwrap_or_default()
            );
        }
        tracing::info!(
            "Experiment finished: {} executions, {}/{} runs, {} passes, {} penalized in {:.1?}",
            summary.executed,
            summary.runs_completed,
            runs,
            summary.passes_completed,
            summary.penalized,
            summary.elapsed
        );
        Ok(summary)
    }

    fn pass(
        &mut self,
        run: usize,
        pass: usize,
        target: Option<&RegressionTarget>,
        deadline: &Deadline,
    ) -> Result<PassOutcome, ExperimentError> {
        let label = target.map_or_else(|| BASELINE_LABEL.to_string(), ToString::to_string);
        let measured = self.measure(run, pass, target, &label, deadline);

        let cleared = match &self.scratch {
            Some(scratch) => scratch.clear().map(|_| ()),
            None => Ok(()),
        };

        if target.is_some() {
            if let Err(e) = self.injector.reset() {
                tracing::error!("Failed to revert after pass {} [{}]: {}", pass, label, e);
                return Err(e.into());
            }
        }

        let summary = match measured {
            Ok(summary) => summary,
            Err(ExperimentError::Scheduler(SchedulerError::DeadlineExceeded { executed })) => {
                if let Err(e) = cleared {
                    tracing::warn!("Scratch directory not emptied after pass {} [{}]: {}", pass, label, e);
                }
                return Ok(PassOutcome::Truncated(executed));
            }
            Err(e) => {
                tracing::error!("Run {} pass {} [{}] failed: {}", run, pass, label, e);
                return Err(e);
            }
        };
        cleared?;
        Ok(PassOutcome::Completed(summary))
    }

    fn measure(
        &mut self,
        run: usize,
        pass: usize,
        target: Option<&RegressionTarget>,
        label: &str,
        deadline: &Deadline,
    ) -> Result<PassSummary, ExperimentError> {
        if let Some(target) = target {
            self.injector.inject(target)?;
        }
        let id = PassId { run, pass, label };
        Ok(self.runner.run_pass(&id, deadline)?)
    }
}

/// Uniform random permutation of `items`; duplicates are kept and the identity order is possible
pub fn randomized_order<T: Clone, G: Rng + ?Sized>(items: &[T], rng: &mut G) -> Vec<T> {
    let mut order = items.to_vec();
    order.shuffle(rng);
    order
}
