//! Top-level error type shared by crates that don't need a more specific one.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug)]
pub enum RfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("buffer underrun")]
    BufferUnderrun,
}

/// Result type alias.
pub type RfResult<T> = Result<T, RfError>;
