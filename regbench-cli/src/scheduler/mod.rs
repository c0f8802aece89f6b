//! Benchmark Scheduler
//!
//! Runs every catalogued benchmark as its own `go test` subprocess, one at
//! a time, and streams the parsed measurements to the record sink.
//!
//! ## Pass structure
//!
//! ```text
//!  RunOnce                          RunUntil (run_duration set)
//!  ───────                          ───────────────────────────
//!  for bench in catalogue:          loop:
//!      run_benchmark(bench)             for bench in catalogue:
//!                                           run_benchmark(bench)
//!                                           cancelled? ──► done
//!                                       all penalized? ──► done
//! ```
//!
//! `run_benchmark` invokes once, or repeatedly until `bench_duration`
//! elapses. Misbehaving benchmarks end up in the [`PenaltySet`] and are
//! never invoked again by the same [`Runner`].

mod penalty;
mod profile;
mod runner;

pub use penalty::{PenaltyReason, PenaltySet};
pub use profile::{ProfileKey, ProfileMode, profile_path};
pub use runner::{PassId, PassSummary, RunConfig, Runner, SchedulerError};
