//! Privacy stripper for JVM hprof heap dumps.
//!
//! The stripper keeps the record layout of a dump byte for byte but zeroes the
//! content of strings, primitive arrays and primitive instance fields that are
//! not needed to make sense of the class hierarchy, threads and stack frames.

pub mod compressed_sink;
pub mod errors;
pub mod keep_set;
pub mod paged_reader;
pub mod parser;
pub mod rewriter;
pub mod strip;
pub mod utils;

#[cfg(test)]
mod test_utils;

pub use compressed_sink::Compression;
pub use errors::{FormatError, HprofStripError};
pub use strip::{StripOptions, StripSummary, default_output_path, strip, strip_with};
