#![warn(missing_docs)]
//! regbench Inject - Source-Level Regressions
//!
//! Slows down a single Go function by a controlled factor of its own
//! running time, and puts the source tree back afterwards.
//!
//! ## Lifecycle
//!
//! ```text
//! Clean --inject--> Injected --benchmark--> Measured --reset--> Clean
//! ```
//!
//! Nothing is kept in memory between passes except what a [`Revert`]
//! implementation needs to restore files. The injected code is:
//!
//! ```go
//! _regbenchStart := time.Now()
//! defer func() { time.Sleep(time.Duration(float64(time.Since(_regbenchStart).Nanoseconds()) * 1.000000)) }()
//! ```

mod imports;
mod inject;
mod revert;

pub use imports::{TIME_PACKAGE, TimeImport};
pub use inject::{
    InjectError, InjectOutcome, Injection, Injector, RewriteError, START_VARIABLE, inject_source,
    matches,
};
pub use revert::{GitReverter, Revert, RevertError, SnapshotReverter};
