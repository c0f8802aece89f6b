#![warn(missing_docs)]
//! regbench Report - Measurement Output
//!
//! Every measurement is written as one delimited row the moment it is
//! parsed, so partial results survive a crash later in the experiment:
//!
//! ```text
//! <run>-<pass>-<invocation>;<label>;<benchmark>;<runtime>[;<memory>;<allocations>]
//! ```

mod sink;

pub use sink::{DELIMITER, RecordKey, RecordWriter, SinkError, header};
