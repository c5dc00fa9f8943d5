//! Error taxonomy for the search core.
//!
//! Recoverable anomalies (a malformed catalog line, a statistically
//! inadmissible model) are handled at the point of occurrence and never
//! surface as errors; everything here is either a configuration problem or
//! resource exhaustion that the caller must see.

use std::path::PathBuf;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Region bounds or bin counts that cannot produce a usable grid.
    #[error("invalid region: {0}")]
    InvalidRegion(String),

    /// A coordinate outside the configured bounds reached the grid.
    /// Callers filter observations before indexing, so this is a
    /// programming error and is propagated, not recovered.
    #[error("coordinate ({lon}, {lat}) lies outside the region bounds")]
    OutOfRegion { lon: f64, lat: f64 },

    /// A catalog line that could not be parsed. The loader logs and skips
    /// these; the variant exists so the line parser can report what went
    /// wrong.
    #[error("malformed catalog line {line}: {reason}")]
    Parse { line: u64, reason: String },

    /// A genome or expectation vector whose length does not match the grid.
    #[error("vector length {got} does not match the grid's {expected} cells")]
    GenomeLength { expected: usize, got: usize },

    /// The result log could not be locked within the retry budget.
    #[error("could not acquire exclusive lock on {path} after {attempts} attempts")]
    LockTimeout { path: PathBuf, attempts: u32 },

    #[error("invalid configuration: {0}")]
    Config(String),
}
