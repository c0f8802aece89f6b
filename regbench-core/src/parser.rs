//! go test -bench Output Parser
//!
//! Turns the combined output of one `go test -bench` invocation into
//! measurement records. The grammar is token based: a measurement is
//! recognised by its unit tokens, and the numbers sit immediately before
//! them.
//!
//! ```text
//! BenchmarkFoo-8   100   520 ns/op   64 B/op   2 allocs/op
//!                  ^^^   ^^^          ^^        ^
//!          invocations  runtime     memory   allocations
//! ```
//!
//! In runtime mode a record is complete at `ns/op`. In memory mode it is
//! complete at `allocs/op`, so `-benchmem` output yields exactly one record
//! per benchmark line.

use crate::function::MeasurementRecord;
use std::fmt::Display;
use std::io::Read;
use std::str::FromStr;
use thiserror::Error;

/// Runtime unit printed by the Go testing package
pub const RUNTIME_UNIT: &str = "ns/op";
/// Memory unit printed with `-benchmem`
pub const BYTES_UNIT: &str = "B/op";
/// Allocation unit printed with `-benchmem`
pub const ALLOCS_UNIT: &str = "allocs/op";

/// Errors produced while parsing benchmark output
#[derive(Debug, Error)]
pub enum ParseError {
    /// The output does not follow the expected schema. The benchmark is at
    /// fault, not the harness.
    #[error("benchmark output not parsable at token {index} ({token:?}): {message}")]
    NotParsable {
        /// Offending token
        token: String,
        /// Token position in the whitespace-split output
        index: usize,
        /// What was expected
        message: String,
    },

    /// Reading saved output failed
    #[error("could not read benchmark output: {0}")]
    Io(#[from] std::io::Error),
}

impl ParseError {
    /// Whether the error is attributable to the benchmark's output
    pub fn is_not_parsable(&self) -> bool {
        matches!(self, ParseError::NotParsable { .. })
    }
}

/// Which unit terminates a measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// `ns/op` completes a record
    #[default]
    Runtime,
    /// `allocs/op` completes a record; `B/op` and `allocs/op` are captured
    Memory,
}

/// Stateless parser for `go test -bench` output
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultParser {
    mode: ParseMode,
}

impl ResultParser {
    /// Create a parser for the given mode
    pub fn new(mode: ParseMode) -> Self {
        Self { mode }
    }

    /// Parser for plain `go test -bench` output
    pub fn runtime() -> Self {
        Self::new(ParseMode::Runtime)
    }

    /// Parser for `go test -bench -benchmem` output
    pub fn memory() -> Self {
        Self::new(ParseMode::Memory)
    }

    /// Active mode
    pub fn mode(&self) -> ParseMode {
        self.mode
    }

    /// Parse the full output of one invocation
    pub fn parse(&self, output: &str) -> Result<Vec<MeasurementRecord>, ParseError> {
        let tokens: Vec<&str> = output.split_whitespace().collect();
        let mut records = Vec::new();
        let mut current = MeasurementRecord::default();

        for (index, token) in tokens.iter().enumerate() {
            match *token {
                RUNTIME_UNIT => {
                    current.runtime = number_before(&tokens, index, 1, "runtime")?;
                    current.invocations = number_before(&tokens, index, 2, "invocation count")?;
                    if self.mode == ParseMode::Runtime {
                        records.push(std::mem::take(&mut current));
                    }
                }
                BYTES_UNIT if self.mode == ParseMode::Memory => {
                    current.memory = Some(number_before(&tokens, index, 1, "memory")?);
                }
                ALLOCS_UNIT if self.mode == ParseMode::Memory => {
                    current.allocations =
                        Some(number_before(&tokens, index, 1, "allocation count")?);
                    records.push(std::mem::take(&mut current));
                }
                _ => {}
            }
        }

        Ok(records)
    }

    /// Parse output saved to a file or any other reader
    pub fn parse_reader<R: Read>(
        &self,
        mut reader: R,
    ) -> Result<Vec<MeasurementRecord>, ParseError> {
        let mut output = String::new();
        reader.read_to_string(&mut output)?;
        self.parse(&output)
    }
}

/// Parse the token `offset` positions before the unit at `unit`.
fn number_before<T>(tokens: &[&str], unit: usize, offset: usize, what: &str) -> Result<T, ParseError>
where
    T: FromStr,
    T::Err: Display,
{
    let Some(index) = unit.checked_sub(offset) else {
        return Err(ParseError::NotParsable {
            token: tokens[unit].to_string(),
            index: unit,
            message: format!("missing {what} before unit"),
        });
    };
    tokens[index]
        .parse()
        .map_err(|e: T::Err| ParseError::NotParsable {
            token: tokens[index].to_string(),
            index,
            message: format!("invalid {what}: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const GO_TEST_OUTPUT: &str = "goos: linux
goarch: amd64
pkg: github.com/acme/widget/codec
cpu: AMD Ryzen 9 5950X 16-Core Processor
BenchmarkEncode-32    \t 1000000\t      1052 ns/op
BenchmarkEncode-32    \t 1000000\t      1049 ns/op
BenchmarkDecode-32    \t  500000\t      2210.5 ns/op
PASS
ok  \tgithub.com/acme/widget/codec\t4.512s
";

    const GO_TEST_MEM_OUTPUT: &str = "pkg: github.com/acme/widget/codec
BenchmarkEncode-32   1000000   1052 ns/op   320 B/op   4 allocs/op
BenchmarkDecode-32    500000   2210 ns/op     0 B/op   0 allocs/op
PASS
";

    #[test]
    fn runtime_line() {
        let records = ResultParser::runtime()
            .parse("BenchmarkFoo-8 1000000 152 ns/op")
            .unwrap();
        assert_eq!(
            records,
            vec![MeasurementRecord {
                invocations: 1_000_000,
                runtime: 152.0,
                memory: None,
                allocations: None,
            }]
        );
    }

    #[test]
    fn memory_line() {
        let records = ResultParser::memory()
            .parse("BenchmarkFoo-8 100 520 ns/op 64 B/op 2 allocs/op")
            .unwrap();
        assert_eq!(
            records,
            vec![MeasurementRecord {
                invocations: 100,
                runtime: 520.0,
                memory: Some(64),
                allocations: Some(2),
            }]
        );
    }

    #[test]
    fn full_runtime_output() {
        let records = ResultParser::runtime().parse(GO_TEST_OUTPUT).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].invocations, 500_000);
        assert!((records[2].runtime - 2210.5).abs() < f64::EPSILON);
    }

    #[test]
    fn full_memory_output() {
        let records = ResultParser::memory().parse(GO_TEST_MEM_OUTPUT).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].memory, Some(320));
        assert_eq!(records[0].allocations, Some(4));
        assert_eq!(records[1].memory, Some(0));
    }

    #[test]
    fn memory_mode_waits_for_allocations() {
        // Without -benchmem there is no allocs/op token, so nothing completes.
        let records = ResultParser::memory().parse(GO_TEST_OUTPUT).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn runtime_mode_ignores_memory_columns() {
        let records = ResultParser::runtime().parse(GO_TEST_MEM_OUTPUT).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.memory.is_none()));
    }

    #[test]
    fn output_without_results() {
        let out = "--- FAIL: BenchmarkFoo\n    foo_test.go:12: boom\nFAIL\n";
        assert!(ResultParser::runtime().parse(out).unwrap().is_empty());
    }

    #[test]
    fn invalid_runtime_is_not_parsable() {
        let err = ResultParser::runtime()
            .parse("BenchmarkFoo-8 100 fast ns/op")
            .unwrap_err();
        assert!(err.is_not_parsable());
        match err {
            ParseError::NotParsable { token, index, .. } => {
                assert_eq!(token, "fast");
                assert_eq!(index, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_invocation_count_is_not_parsable() {
        let err = ResultParser::runtime()
            .parse("BenchmarkFoo-8 many 12 ns/op")
            .unwrap_err();
        assert!(err.is_not_parsable());
    }

    #[test]
    fn unit_at_start_is_not_parsable() {
        let err = ResultParser::runtime().parse("ns/op").unwrap_err();
        assert!(err.is_not_parsable());
        let err = ResultParser::runtime().parse("12 ns/op").unwrap_err();
        assert!(err.is_not_parsable());
    }

    #[test]
    fn reader_io_error_is_not_a_benchmark_fault() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("disk gone"))
            }
        }
        let err = ResultParser::runtime().parse_reader(Broken).unwrap_err();
        assert!(!err.is_not_parsable());
    }

    #[test]
    fn reader_parses_saved_output() {
        let records = ResultParser::runtime()
            .parse_reader(GO_TEST_OUTPUT.as_bytes())
            .unwrap();
        assert_eq!(records.len(), 3);
    }

    fn bench_line() -> impl Strategy<Value = (u64, u32, String)> {
        (1u64..10_000_000, 1u32..1_000_000, "[A-Z][a-z]{0,8}")
    }

    proptest! {
        #[test]
        fn one_record_per_runtime_unit(lines in proptest::collection::vec(bench_line(), 0..20)) {
            let mut output = String::from("goos: linux\n");
            for (n, rt, name) in &lines {
                output.push_str(&format!("Benchmark{name}-8\t{n}\t{rt} ns/op\n"));
            }
            output.push_str("PASS\n");

            let parser = ResultParser::runtime();
            let records = parser.parse(&output).unwrap();
            prop_assert_eq!(records.len(), lines.len());
            for (record, (n, rt, _)) in records.iter().zip(&lines) {
                prop_assert_eq!(record.invocations, *n);
                prop_assert_eq!(record.runtime, f64::from(*rt));
            }

            // Parsing is side-effect free.
            prop_assert_eq!(parser.parse(&output).unwrap(), records);
        }
    }
}
