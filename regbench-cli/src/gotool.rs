//! `go test` invocation
//!
//! One [`Invocation`] runs one benchmark of one package. The subprocess is
//! started in the package directory; the harness never changes its own
//! working directory.

use regbench_core::{format_go_duration, package_dir};
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use thiserror::Error;

/// Output markers printed when `go test -timeout` kills a test binary
pub const TIMEOUT_MARKERS: &[&str] = &["panic: test timed out after", "ran too long"];

/// Errors starting the Go tool. Both are fatal to a run.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The Go binary could not be executed
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The package directory is not usable as a working directory
    #[error("cannot use {} as working directory: {source}", path.display())]
    WorkingDir {
        /// Package directory
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// One `go test -bench` call for a single benchmark
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation<'a> {
    /// Package path relative to the project root
    pub package: &'a str,
    /// Benchmark function name
    pub benchmark: &'a str,
    /// `-count`: warmup plus measurement iterations
    pub count: u32,
    /// `-benchtime`
    pub bench_time: Duration,
    /// `-timeout`
    pub timeout: Duration,
    /// `-benchmem`
    pub bench_mem: bool,
    /// `-cpuprofile` destination
    pub cpu_profile: Option<PathBuf>,
    /// `-memprofile` destination
    pub mem_profile: Option<PathBuf>,
}

impl Invocation<'_> {
    /// Arguments following the Go binary
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "test".to_string(),
            "-run=^$".to_string(),
            format!("-bench=^{}$", self.benchmark),
            format!("-count={}", self.count.max(1)),
            format!("-benchtime={}", format_go_duration(self.bench_time)),
            format!("-timeout={}", format_go_duration(self.timeout)),
        ];
        if self.bench_mem {
            args.push("-benchmem".to_string());
        }
        if let Some(path) = &self.cpu_profile {
            args.push(format!("-cpuprofile={}", path.display()));
        }
        if let Some(path) = &self.mem_profile {
            args.push(format!("-memprofile={}", path.display()));
        }
        args
    }
}

/// Captured result of an invocation
#[derive(Debug, Clone, Default)]
pub struct InvocationOutput {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    /// stdout followed by stderr
    pub output: String,
}

impl InvocationOutput {
    /// Output of a process that exited with `code`
    pub fn new(code: Option<i32>, output: impl Into<String>) -> Self {
        Self {
            code,
            output: output.into(),
        }
    }

    /// Whether the process exited with status 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Whether the output shows the test binary was killed by `-timeout`
    pub fn timed_out(&self) -> bool {
        TIMEOUT_MARKERS.iter().any(|m| self.output.contains(m))
    }
}

/// Runs benchmark invocations
pub trait Invoke {
    /// Run one invocation to completion
    fn invoke(&mut self, invocation: &Invocation<'_>) -> Result<InvocationOutput, InvokeError>;
}

impl<T: Invoke + ?Sized> Invoke for Box<T> {
    fn invoke(&mut self, invocation: &Invocation<'_>) -> Result<InvocationOutput, InvokeError> {
        (**self).invoke(invocation)
    }
}

/// The `go` command line tool
#[derive(Debug, Clone)]
pub struct GoTool {
    project: PathBuf,
    program: OsString,
    env: Vec<(OsString, OsString)>,
}

impl GoTool {
    /// Go tool for `project`, using `<go_root>/bin/go` when a Go root is given
    pub fn new(project: impl Into<PathBuf>, go_root: Option<&Path>) -> Self {
        let project = project.into();
        let program = go_root
            .map(|root| root.join("bin").join("go").into_os_string())
            .unwrap_or_else(|| OsString::from("go"));
        let env = environment(&project, go_root);
        Self {
            project,
            program,
            env,
        }
    }

    /// Use a different binary in place of `go`
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    /// Project root
    pub fn project(&self) -> &Path {
        &self.project
    }

    /// Variables overridden in the subprocess environment
    pub fn environment(&self) -> &[(OsString, OsString)] {
        &self.env
    }
}

impl Invoke for GoTool {
    fn invoke(&mut self, invocation: &Invocation<'_>) -> Result<InvocationOutput, InvokeError> {
        let dir = package_dir(&self.project, invocation.package);
        match std::fs::metadata(&dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(InvokeError::WorkingDir {
                    path: dir,
                    source: std::io::Error::other("not a directory"),
                });
            }
            Err(source) => return Err(InvokeError::WorkingDir { path: dir, source }),
        }

        let args = invocation.args();
        tracing::debug!(
            "Running {} {} in {}",
            self.program.to_string_lossy(),
            args.join(" "),
            dir.display()
        );

        let output = Command::new(&self.program)
            .args(&args)
            .current_dir(&dir)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .output()
            .map_err(|source| InvokeError::Spawn {
                program: self.program.to_string_lossy().into_owned(),
                source,
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(InvocationOutput {
            code: output.status.code(),
            output: text,
        })
    }
}

/// GOPATH for a project living under `<gopath>/src/...`
pub fn go_path(project: &Path) -> Option<PathBuf> {
    let mut prefix = PathBuf::new();
    for component in project.components() {
        if component == Component::Normal("src".as_ref()) {
            return Some(prefix);
        }
        prefix.push(component);
    }
    None
}

fn environment(project: &Path, go_root: Option<&Path>) -> Vec<(OsString, OsString)> {
    let mut env = Vec::new();
    if let Some(path) = go_path(project) {
        env.push(("GOPATH".into(), path.into_os_string()));
    }
    if let Some(root) = go_root {
        env.push(("GOROOT".into(), root.as_os_str().to_owned()));
        let mut paths = vec![root.join("bin")];
        if let Some(existing) = std::env::var_os("PATH") {
            paths.extend(std::env::split_paths(&existing));
        }
        if let Ok(joined) = std::env::join_paths(paths) {
            env.push(("PATH".into(), joined));
        }
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation() -> Invocation<'static> {
        Invocation {
            package: "/codec",
            benchmark: "BenchmarkEncode",
            count: 3,
            bench_time: Duration::from_secs(1),
            timeout: Duration::from_secs(600),
            bench_mem: false,
            cpu_profile: None,
            mem_profile: None,
        }
    }

    #[test]
    fn builds_go_test_arguments() {
        assert_eq!(
            invocation().args(),
            [
                "test",
                "-run=^$",
                "-bench=^BenchmarkEncode$",
                "-count=3",
                "-benchtime=1s",
                "-timeout=10m0s"
            ]
        );
    }

    #[test]
    fn optional_flags() {
        let inv = Invocation {
            count: 0,
            bench_mem: true,
            cpu_profile: Some(PathBuf::from("/prof/a_cpu.pprof")),
            mem_profile: Some(PathBuf::from("/prof/a_mem.pprof")),
            ..invocation()
        };
        let args = inv.args();
        assert!(args.contains(&"-count=1".to_string()));
        assert!(args.ends_with(&[
            "-benchmem".to_string(),
            "-cpuprofile=/prof/a_cpu.pprof".to_string(),
            "-memprofile=/prof/a_mem.pprof".to_string(),
        ]));
    }

    #[test]
    fn detects_timeouts() {
        assert!(InvocationOutput::new(Some(2), "panic: test timed out after 10m0s\n").timed_out());
        assert!(InvocationOutput::new(None, "*** Test killed: ran too long (10m1s).\n").timed_out());
        assert!(!InvocationOutput::new(Some(1), "--- FAIL: BenchmarkX\n").timed_out());
        assert!(InvocationOutput::new(Some(0), "").success());
        assert!(!InvocationOutput::new(None, "").success());
    }

    #[test]
    fn gopath_is_prefix_before_src() {
        assert_eq!(
            go_path(Path::new("/home/me/go/src/github.com/acme/widget")),
            Some(PathBuf::from("/home/me/go"))
        );
        assert_eq!(go_path(Path::new("/work/widget")), None);
    }

    #[test]
    fn go_root_selects_binary_and_environment() {
        let tool = GoTool::new("/home/me/go/src/acme", Some(Path::new("/opt/go")));
        let keys: Vec<_> = tool.environment().iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, ["GOPATH", "GOROOT", "PATH"]);
        assert_eq!(tool.program, OsString::from("/opt/go/bin/go"));
    }

    #[test]
    fn missing_package_directory_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut tool = GoTool::new(dir.path(), None);
        let inv = Invocation {
            package: "/does/not/exist",
            ..invocation()
        };
        assert!(matches!(
            tool.invoke(&inv),
            Err(InvokeError::WorkingDir { .. })
        ));
    }

    #[test]
    fn missing_binary_is_spawn_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut tool = GoTool::new(dir.path(), None).with_program("/nonexistent/bin/go");
        let inv = Invocation {
            package: "",
            ..invocation()
        };
        assert!(matches!(tool.invoke(&inv), Err(InvokeError::Spawn { .. })));
    }
}
