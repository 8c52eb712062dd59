//! Error types for filter construction, storage, and convolution.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by `rf-dsp`.
///
/// Startup-time errors (`FilterFileMissing`, `FilterListSyntax`,
/// `DatabaseSyntax`, `FilterBadSampleRate`, `StageIdentifierMissing`) are
/// meant to propagate via `?` out of the loader and abort the process — a
/// broken deployment, not a runtime condition. `FilterShapeMismatch` is a
/// programming error caught at filter-install time. None of these are ever
/// raised from inside `Convolver::process`.
#[derive(Debug, Error)]
pub enum DspError {
    #[error("filter file missing: {0}")]
    FilterFileMissing(PathBuf),

    #[error("filter sample rate {found} does not match engine sample rate {expected}")]
    FilterBadSampleRate { expected: u32, found: u32 },

    #[error("missing or unrecognized stage identifier: {0:?}")]
    StageIdentifierMissing(String),

    #[error(
        "filter shape mismatch: convolver expects P={expected_p} B={expected_b}, got P={got_p} B={got_b}"
    )]
    FilterShapeMismatch {
        expected_p: usize,
        expected_b: usize,
        got_p: usize,
        got_b: usize,
    },

    #[error("no headphone filter loaded")]
    NoHeadphoneFilter,

    #[error("malformed filter list at line {line}: {reason}")]
    FilterListSyntax { line: usize, reason: String },

    #[error("malformed filter database: {0}")]
    DatabaseSyntax(String),

    #[error("convolver received {got} filters, expected {expected}")]
    WrongFilterCount { expected: usize, got: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type DspResult<T> = Result<T, DspError>;
