//! Profile output naming

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which profiles `go test` should write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileMode {
    /// No profiling
    #[default]
    None,
    /// CPU profile only
    Cpu,
    /// Memory profile only
    Mem,
    /// CPU and memory profiles
    #[serde(alias = "both")]
    All,
}

impl ProfileMode {
    /// Whether a CPU profile is requested
    pub fn cpu(self) -> bool {
        matches!(self, ProfileMode::Cpu | ProfileMode::All)
    }

    /// Whether a memory profile is requested
    pub fn mem(self) -> bool {
        matches!(self, ProfileMode::Mem | ProfileMode::All)
    }

    /// Whether any profile is requested
    pub fn enabled(self) -> bool {
        self != ProfileMode::None
    }
}

/// Coordinates of one invocation, used to name its profile files
#[derive(Debug, Clone, Copy)]
pub struct ProfileKey<'a> {
    /// Run index
    pub run: usize,
    /// Pass index
    pub pass: usize,
    /// Invocation index
    pub invocation: usize,
    /// Test label
    pub label: &'a str,
    /// Package path
    pub package: &'a str,
    /// Benchmark name
    pub benchmark: &'a str,
}

/// Path of a profile file: `<run>_<pass>_<invocation>_<label>_<pkg>_<bench>_<kind>.pprof`
pub fn profile_path(dir: &Path, key: &ProfileKey<'_>, kind: &str) -> PathBuf {
    let name = format!(
        "{}_{}_{}_{}_{}_{}_{}",
        key.run,
        key.pass,
        key.invocation,
        sanitize(key.label),
        sanitize(key.package.trim_start_matches('/')),
        sanitize(key.benchmark),
        kind
    );
    dir.join(format!("{name}.pprof"))
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes() {
        assert!(ProfileMode::All.cpu() && ProfileMode::All.mem());
        assert!(ProfileMode::Cpu.cpu() && !ProfileMode::Cpu.mem());
        assert!(!ProfileMode::None.enabled());
    }

    #[test]
    fn mode_from_config_text() {
        #[derive(Deserialize)]
        struct Wrapper {
            profile: ProfileMode,
        }
        let parse = |s: &str| toml::from_str::<Wrapper>(&format!("profile = \"{s}\"")).unwrap().profile;
        assert_eq!(parse("cpu"), ProfileMode::Cpu);
        assert_eq!(parse("both"), ProfileMode::All);
        assert_eq!(parse("none"), ProfileMode::None);
    }

    #[test]
    fn deterministic_file_names() {
        let key = ProfileKey {
            run: 1,
            pass: 3,
            invocation: 0,
            label: "/codec/codec.go::(*Encoder).Flush",
            package: "/codec/v2",
            benchmark: "BenchmarkEncode",
        };
        assert_eq!(
            profile_path(Path::new("/prof"), &key, "cpu"),
            PathBuf::from("/prof/1_3_0__codec_codec.go____Encoder_.Flush_codec_v2_BenchmarkEncode_cpu.pprof")
        );
    }
}
