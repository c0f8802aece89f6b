//! Permanently excluded benchmarks

use indexmap::IndexMap;
use regbench_core::FunctionId;
use std::fmt;

/// Why a benchmark was excluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PenaltyReason {
    /// The invocation hit the `go test` timeout
    Timeout,
    /// The output did not match the result grammar
    Unparsable,
    /// The invocation failed without producing any result
    Crashed,
}

impl fmt::Display for PenaltyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PenaltyReason::Timeout => "timed out",
            PenaltyReason::Unparsable => "unparsable output",
            PenaltyReason::Crashed => "crashed without results",
        })
    }
}

/// Benchmarks excluded from every further invocation.
///
/// Membership only grows; the first reason recorded for a benchmark is kept.
#[derive(Debug, Clone, Default)]
pub struct PenaltySet {
    entries: IndexMap<FunctionId, PenaltyReason>,
}

impl PenaltySet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude a benchmark. Returns `false` if it was already excluded.
    pub fn penalize(&mut self, id: &FunctionId, reason: PenaltyReason) -> bool {
        if self.entries.contains_key(id) {
            return false;
        }
        self.entries.insert(id.clone(), reason);
        true
    }

    /// Whether a benchmark is excluded
    pub fn contains(&self, id: &FunctionId) -> bool {
        self.entries.contains_key(id)
    }

    /// Reason a benchmark was excluded
    pub fn reason(&self, id: &FunctionId) -> Option<PenaltyReason> {
        self.entries.get(id).copied()
    }

    /// Excluded benchmarks in the order they were penalized
    pub fn iter(&self) -> impl Iterator<Item = (&FunctionId, PenaltyReason)> {
        self.entries.iter().map(|(id, reason)| (id, *reason))
    }

    /// Number of excluded benchmarks
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was excluded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
