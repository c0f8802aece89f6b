//! Configuration loading from regbench.toml
//!
//! regbench is configured through a `regbench.toml` file. When no path is
//! given on the command line, the file is discovered by walking up from the
//! current directory.

use crate::scheduler::{ProfileMode, RunConfig};
use regbench_core::{DEFAULT_PATTERN, DurationError, FunctionId, RegressionTarget, parse_duration};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File name searched for by [`RegbenchConfig::discover`]
pub const CONFIG_FILE: &str = "regbench.toml";

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// Configuration file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema
    #[error("failed to parse {}: {source}", path.display())]
    Toml {
        /// Configuration file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: toml::de::Error,
    },

    /// A duration field could not be parsed
    #[error("invalid duration for `{field}`: {source}")]
    Duration {
        /// Field name
        field: &'static str,
        /// Underlying error
        #[source]
        source: DurationError,
    },

    /// The profile directory is missing or unusable
    #[error("profile directory {}: {reason}", path.display())]
    ProfileDir {
        /// Configured directory
        path: PathBuf,
        /// What is wrong with it
        reason: String,
    },

    /// A regression target's source file does not exist
    #[error("regression target file {} does not exist", path.display())]
    MissingTarget {
        /// Expected source file
        path: PathBuf,
    },

    /// Any other invalid value
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// regbench configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegbenchConfig {
    /// Root of the Go project under test
    #[serde(default)]
    pub project: String,
    /// GOROOT override; empty uses `go` from PATH
    #[serde(default)]
    pub go_root: String,
    /// Directory emptied after every pass; empty disables it
    #[serde(default)]
    pub scratch_dir: String,
    /// Scheduler configuration
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Experiment-wide settings
    #[serde(default)]
    pub experiment: ExperimentConfig,
    /// Regression injection
    #[serde(default)]
    pub regression: RegressionConfig,
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Only benchmarks whose name matches this pattern are discovered
    #[serde(default = "default_bench_regex")]
    pub bench_regex: String,
    /// Warmup iterations per invocation
    #[serde(default)]
    pub warmup_iterations: u32,
    /// Measurement iterations per invocation
    #[serde(default = "default_measurement_iterations")]
    pub measurement_iterations: u32,
    /// `-benchtime` per iteration
    #[serde(default = "default_bench_time")]
    pub bench_time: String,
    /// `-timeout` per invocation
    #[serde(default = "default_bench_timeout")]
    pub bench_timeout: String,
    /// Re-invoke each benchmark for this long; empty disables duration sampling
    #[serde(default)]
    pub bench_duration: String,
    /// Loop over the catalogue for this long per pass; empty runs it once
    #[serde(default)]
    pub run_duration: String,
    /// Number of runs
    #[serde(default = "default_runs")]
    pub runs: usize,
    /// Request memory statistics (`-benchmem`)
    #[serde(default)]
    pub bench_mem: bool,
    /// Profiles to write: "none", "cpu", "mem" or "all"
    #[serde(default)]
    pub profile: ProfileMode,
    /// Directory receiving profile files
    #[serde(default)]
    pub profile_dir: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            bench_regex: default_bench_regex(),
            warmup_iterations: 0,
            measurement_iterations: default_measurement_iterations(),
            bench_time: default_bench_time(),
            bench_timeout: default_bench_timeout(),
            bench_duration: String::new(),
            run_duration: String::new(),
            runs: default_runs(),
            bench_mem: false,
            profile: ProfileMode::None,
            profile_dir: String::new(),
        }
    }
}

fn default_bench_regex() -> String {
    DEFAULT_PATTERN.to_string()
}
fn default_measurement_iterations() -> u32 {
    1
}
fn default_bench_time() -> String {
    "1s".to_string()
}
fn default_bench_timeout() -> String {
    "10m".to_string()
}
fn default_runs() -> usize {
    1
}

/// Experiment-wide settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExperimentConfig {
    /// Overall deadline; empty means none
    #[serde(default)]
    pub timeout: String,
}

/// How the source tree is restored after each regression pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RevertMode {
    /// `git reset --hard` in the project root
    #[default]
    Git,
    /// In-memory copies of every modified file
    Snapshot,
}

/// Regression injection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionConfig {
    /// Default violation factor (1.0 doubles the function's runtime)
    #[serde(default = "default_violation")]
    pub violation: f64,
    /// Shuffle the target order in every run
    #[serde(default)]
    pub randomize: bool,
    /// Revert mechanism
    #[serde(default)]
    pub revert: RevertMode,
    /// Functions to slow down, one regression pass each
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            violation: default_violation(),
            randomize: false,
            revert: RevertMode::Git,
            targets: Vec::new(),
        }
    }
}

fn default_violation() -> f64 {
    1.0
}

/// One regression target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Package path relative to the project root ("" for the root package)
    #[serde(default)]
    pub pkg: String,
    /// Source file name
    pub file: String,
    /// Function name
    pub name: String,
    /// Receiver type (`T` or `*T`); empty for plain functions
    #[serde(default)]
    pub receiver: String,
    /// Per-target violation factor
    #[serde(default)]
    pub violation: Option<f64>,
}

impl TargetConfig {
    /// Function identity of the target
    pub fn function(&self) -> FunctionId {
        FunctionId::new(&self.pkg, &self.file, &self.name, &self.receiver)
    }
}

impl RegbenchConfig {
    /// Load configuration from a TOML file.
    ///
    /// A relative `project` is resolved against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;

        if !config.project.is_empty() && Path::new(&config.project).is_relative() {
            if let Some(base) = path.parent() {
                config.project = base.join(&config.project).to_string_lossy().into_owned();
            }
        }
        Ok(config)
    }

    /// Find `regbench.toml` by walking up from the current directory
    pub fn discover() -> Option<PathBuf> {
        let dir = std::env::current_dir().ok()?;
        Self::discover_from(&dir)
    }

    /// Find `regbench.toml` by walking up from `start`
    pub fn discover_from(start: &Path) -> Option<PathBuf> {
        let mut dir = start.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.is_file() {
                return Some(config_path);
            }
            if !dir.pop() {
                return None;
            }
        }
    }

    /// Check every value; the experiment must not start on an invalid configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project.is_empty() {
            return Err(ConfigError::Invalid("`project` is required".to_string()));
        }
        if !self.project_root().is_dir() {
            return Err(ConfigError::Invalid(format!(
                "project {} is not a directory",
                self.project
            )));
        }

        regex::Regex::new(&self.runner.bench_regex).map_err(|e| {
            ConfigError::Invalid(format!("`bench_regex` {:?}: {e}", self.runner.bench_regex))
        })?;

        let profile_dir = self.profile_dir();
        match (self.runner.profile.enabled(), &profile_dir) {
            (true, None) => {
                return Err(ConfigError::ProfileDir {
                    path: PathBuf::new(),
                    reason: format!("required by profile mode {:?}", self.runner.profile),
                });
            }
            (_, Some(dir)) if !dir.is_dir() => {
                return Err(ConfigError::ProfileDir {
                    path: dir.clone(),
                    reason: "not an existing directory".to_string(),
                });
            }
            _ => {}
        }

        if let Some(dir) = self.scratch_dir() {
            if !dir.is_dir() {
                return Err(ConfigError::Invalid(format!(
                    "scratch directory {} is not an existing directory",
                    dir.display()
                )));
            }
        }

        if let Some(root) = self.go_root() {
            if !root.is_dir() {
                return Err(ConfigError::Invalid(format!(
                    "go_root {} is not a directory",
                    root.display()
                )));
            }
        }

        self.run_config()?;
        self.experiment_timeout()?;

        for target in &self.regression.targets {
            if target.name.is_empty() || target.file.is_empty() {
                return Err(ConfigError::Invalid(
                    "regression targets need a `file` and a `name`".to_string(),
                ));
            }
            let violation = target.violation.unwrap_or(self.regression.violation);
            if !violation.is_finite() || violation < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "violation factor {violation} of {} must be a non-negative number",
                    target.function()
                )));
            }
            let path = target.function().source_path(&self.project_root());
            if !path.is_file() {
                return Err(ConfigError::MissingTarget { path });
            }
        }
        Ok(())
    }

    /// Project root
    pub fn project_root(&self) -> PathBuf {
        PathBuf::from(&self.project)
    }

    /// GOROOT override
    pub fn go_root(&self) -> Option<PathBuf> {
        non_empty(&self.go_root)
    }

    /// Scratch directory
    pub fn scratch_dir(&self) -> Option<PathBuf> {
        non_empty(&self.scratch_dir)
    }

    /// Profile directory
    pub fn profile_dir(&self) -> Option<PathBuf> {
        non_empty(&self.runner.profile_dir)
    }

    /// Number of runs; 0 counts as 1
    pub fn runs(&self) -> usize {
        self.runner.runs.max(1)
    }

    /// Overall experiment deadline
    pub fn experiment_timeout(&self) -> Result<Option<Duration>, ConfigError> {
        optional_duration("experiment.timeout", &self.experiment.timeout)
    }

    /// Scheduler configuration with every duration parsed
    pub fn run_config(&self) -> Result<RunConfig, ConfigError> {
        let runner = &self.runner;
        Ok(RunConfig {
            warmup_iterations: runner.warmup_iterations,
            measurement_iterations: runner.measurement_iterations,
            bench_time: duration("runner.bench_time", &runner.bench_time)?,
            bench_timeout: duration("runner.bench_timeout", &runner.bench_timeout)?,
            bench_duration: optional_duration("runner.bench_duration", &runner.bench_duration)?,
            run_duration: optional_duration("runner.run_duration", &runner.run_duration)?,
            bench_mem: runner.bench_mem,
            profile: runner.profile,
            profile_dir: self.profile_dir().filter(|_| runner.profile.enabled()),
        })
    }

    /// Regression targets in configuration order
    pub fn regression_targets(&self) -> Vec<RegressionTarget> {
        self.regression
            .targets
            .iter()
            .map(|t| {
                RegressionTarget::new(t.function(), t.violation.unwrap_or(self.regression.violation))
            })
            .collect()
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# regbench configuration

# Root of the Go project under test (relative paths are resolved against this file)
project = "."
# GOROOT override; empty uses `go` from PATH
go_root = ""
# Directory emptied after every pass (uncomment to enable)
# scratch_dir = "/tmp/regbench-scratch"

[runner]
# Only benchmarks matching this pattern are run
bench_regex = "^.*$"
# Iterations per invocation: -count = warmup + measurement
warmup_iterations = 0
measurement_iterations = 1
# go test -benchtime
bench_time = "1s"
# go test -timeout; a benchmark hitting it is never run again
bench_timeout = "10m"
# Re-invoke each benchmark for this long (uncomment to enable)
# bench_duration = "30s"
# Sweep the whole catalogue for this long per pass (uncomment to enable)
# run_duration = "10m"
# Repetitions of baseline plus every regression pass
runs = 1
# Record B/op and allocs/op
bench_mem = false
# Profiles: none, cpu, mem or all
profile = "none"
# Directory receiving .pprof files (required when profiling)
# profile_dir = "profiles"

[experiment]
# Overall deadline; the experiment stops cleanly once it passes (uncomment to enable)
# timeout = "12h"

[regression]
# Injected delay as a fraction of the function's own elapsed time
violation = 1.0
# Shuffle the regression passes in every run
randomize = false
# Restore sources with "git" (reset --hard) or "snapshot" (in-memory copies)
revert = "git"

# One regression pass per target
# [[regression.targets]]
# pkg = "/internal/codec"
# file = "codec.go"
# name = "Encode"
# receiver = "*Encoder"
"#
        .to_string()
    }
}

fn non_empty(value: &str) -> Option<PathBuf> {
    let value = value.trim();
    (!value.is_empty()).then(|| PathBuf::from(value))
}

fn duration(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).map_err(|source| ConfigError::Duration { field, source })
}

/// Empty and zero durations both mean "not configured"
fn optional_duration(field: &'static str, value: &str) -> Result<Option<Duration>, ConfigError> {
    if value.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(duration(field, value)?).filter(|d| !d.is_zero()))
}
