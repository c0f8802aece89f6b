#![warn(missing_docs)]
//! regbench CLI Library
//!
//! Everything between a `regbench.toml` and a CSV of measurements:
//! - **Configuration**: `regbench.toml` discovery, validation and CLI overrides
//! - **Go tool**: one `go test -bench` subprocess per benchmark, run in its package directory
//! - **Scheduler**: fixed-repeat and duration-sampling invocation, RunOnce/RunUntil sweeps, penalization
//! - **Experiment Loop**: baseline and regression passes across runs, with revert after every injection
//!
//! The `regbench` binary is a thin wrapper around [`run`].

mod cancel;
mod config;
mod experiment;
mod gotool;
mod scheduler;
mod scratch;

pub use cancel::{CancelTimer, CancellationToken, Deadline};
pub use config::{
    CONFIG_FILE, ConfigError, ExperimentConfig, RegbenchConfig, RegressionConfig, RevertMode,
    RunnerConfig, TargetConfig,
};
pub use experiment::{
    BASELINE_LABEL, Experiment, ExperimentError, ExperimentPlan, ExperimentSummary,
    randomized_order,
};
pub use gotool::{
    GoTool, Invocation, InvocationOutput, Invoke, InvokeError, TIMEOUT_MARKERS, go_path,
};
pub use scheduler::{
    PassId, PassSummary, PenaltyReason, PenaltySet, ProfileKey, ProfileMode, RunConfig, Runner,
    SchedulerError, profile_path,
};
pub use scratch::{ScratchDir, ScratchError};

use anyhow::Context;
use clap::{Parser, Subcommand};
use regbench_core::{Catalogue, Discovery, ParseMode, ResultParser};
use regbench_inject::{GitReverter, InjectOutcome, Injector, Revert, SnapshotReverter};
use regbench_report::RecordWriter;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// regbench CLI arguments
#[derive(Parser, Debug)]
#[command(name = "regbench")]
#[command(
    author,
    version,
    about = "regbench - differential performance-regression benchmarking for Go projects"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (default: regbench.toml in the current or a parent directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the experiment and write one CSV row per measurement
    Run {
        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of runs
        #[arg(long)]
        runs: Option<usize>,

        /// Shuffle the regression passes in every run
        #[arg(long)]
        randomize: bool,

        /// Record B/op and allocs/op
        #[arg(long)]
        bench_mem: bool,

        /// Do not write the header row
        #[arg(long)]
        no_header: bool,
    },
    /// List all discovered benchmarks
    List,
    /// Parse saved `go test -bench` output and print the records as JSON lines
    Parse {
        /// File containing the output
        #[arg(name = "FILE")]
        file: PathBuf,

        /// Expect `-benchmem` output
        #[arg(long)]
        mem: bool,
    },
    /// Inject one configured regression target without running anything
    Inject {
        /// Position of the target in `[[regression.targets]]`
        #[arg(name = "INDEX")]
        index: usize,
    },
    /// Discard source modifications with `git reset --hard`
    Reset,
    /// Print a default regbench.toml
    Init,
}

/// Parse command line arguments and run regbench
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run regbench with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    init_logging(cli.verbose);

    match cli.command {
        Commands::Init => {
            print!("{}", RegbenchConfig::default_toml());
            Ok(())
        }
        Commands::Parse { ref file, mem } => parse_output(file, mem),
        Commands::List => {
            let config = load_config(cli.config.as_deref())?;
            list_benchmarks(&config)
        }
        Commands::Run {
            ref output,
            runs,
            randomize,
            bench_mem,
            no_header,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(runs) = runs {
                config.runner.runs = runs;
            }
            if randomize {
                config.regression.randomize = true;
            }
            if bench_mem {
                config.runner.bench_mem = true;
            }
            run_experiment(&config, output.as_deref(), !no_header)
        }
        Commands::Inject { index } => {
            let config = load_config(cli.config.as_deref())?;
            inject_target(&config, index)
        }
        Commands::Reset => {
            let config = load_config(cli.config.as_deref())?;
            GitReverter::new(config.project_root()).revert()?;
            tracing::info!("Reverted {}", config.project);
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "regbench=debug" } else { "regbench=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A subscriber may already be installed when embedded.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<RegbenchConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => RegbenchConfig::discover().with_context(|| {
            format!("no {CONFIG_FILE} found; create one with `regbench init > {CONFIG_FILE}`")
        })?,
    };
    let config = RegbenchConfig::load(&path)?;
    tracing::debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

fn discover(config: &RegbenchConfig) -> anyhow::Result<Catalogue> {
    let discovery = Discovery::new(config.project_root(), &config.runner.bench_regex)?;
    let report = discovery.discover()?;
    if !report.failures.is_empty() {
        tracing::warn!(
            "{} files could not be parsed and were skipped",
            report.failures.len()
        );
    }
    Ok(report.catalogue)
}

fn list_benchmarks(config: &RegbenchConfig) -> anyhow::Result<()> {
    let catalogue = discover(config)?;
    println!("regbench catalogue: {}", config.project);

    for (pkg, files) in catalogue.packages() {
        let pkg = if pkg.is_empty() { "(root)" } else { pkg };
        println!("├── package: {}", pkg);
        for (file, benches) in files {
            println!("│   ├── {}", file);
            for bench in benches {
                println!(
                    "│   │   ├── {} ({}-{})",
                    bench.name(),
                    bench.start_line,
                    bench.end_line
                );
            }
        }
    }

    println!(
        "{} benchmarks found in {} packages.",
        catalogue.len(),
        catalogue.package_count()
    );
    Ok(())
}

fn parse_output(file: &Path, mem: bool) -> anyhow::Result<()> {
    let mode = if mem { ParseMode::Memory } else { ParseMode::Runtime };
    let reader =
        std::fs::File::open(file).with_context(|| format!("failed to open {}", file.display()))?;
    let records = ResultParser::new(mode).parse_reader(reader)?;

    let mut stdout = std::io::stdout().lock();
    for record in &records {
        writeln!(stdout, "{}", serde_json::to_string(record)?)?;
    }
    tracing::info!("{} records", records.len());
    Ok(())
}

fn run_experiment(
    config: &RegbenchConfig,
    output: Option<&Path>,
    header: bool,
) -> anyhow::Result<()> {
    config.validate()?;
    let root = config.project_root();

    let catalogue = discover(config)?;
    if catalogue.is_empty() {
        tracing::warn!(
            "No benchmarks match {:?} under {}",
            config.runner.bench_regex,
            root.display()
        );
    }

    let run_config = config.run_config()?;
    let writer: Box<dyn Write> = match output {
        Some(path) => Box::new(
            std::fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout()),
    };
    let mut sink = RecordWriter::new(writer, run_config.bench_mem);
    if header {
        sink.write_header()?;
    }

    let tool = GoTool::new(&root, config.go_root().as_deref());
    let runner = Runner::new(run_config, catalogue, tool, sink)
        .with_progress(std::io::stderr().is_terminal());

    let reverter: Box<dyn Revert> = match config.regression.revert {
        RevertMode::Git => Box::new(GitReverter::new(&root)),
        RevertMode::Snapshot => Box::new(SnapshotReverter::new()),
    };
    let plan = ExperimentPlan {
        runs: config.runs(),
        targets: config.regression_targets(),
        randomize: config.regression.randomize,
        timeout: config.experiment_timeout()?,
    };

    let mut experiment = Experiment::new(plan, runner, Injector::new(&root, reverter));
    if let Some(dir) = config.scratch_dir() {
        experiment = experiment.with_scratch(ScratchDir::open(dir)?);
    }

    let summary = experiment.run()?;

    let runner = experiment.into_runner();
    for (id, reason) in runner.penalties().iter() {
        tracing::info!("Penalized: {} ({})", id, reason);
    }
    runner.into_sink()?.flush()?;

    if let Some(path) = output {
        tracing::info!(
            "Wrote {} executions to {}{}",
            summary.executed,
            path.display(),
            if summary.truncated { " (truncated)" } else { "" }
        );
    }
    Ok(())
}

fn inject_target(config: &RegbenchConfig, index: usize) -> anyhow::Result<()> {
    config.validate()?;
    let targets = config.regression_targets();
    let target = targets.get(index).with_context(|| {
        format!(
            "no regression target at index {index} ({} configured)",
            targets.len()
        )
    })?;

    let root = config.project_root();
    let mut injector = Injector::new(&root, GitReverter::new(&root));
    match injector.inject(target)? {
        InjectOutcome::Injected { line } => println!(
            "Injected {:.6}x regression into {} at line {}",
            target.violation, target, line
        ),
        InjectOutcome::NotFound => println!("{} not found; file unchanged", target),
        InjectOutcome::NoBody => println!("{} has no body; file unchanged", target),
    }
    Ok(())
}
