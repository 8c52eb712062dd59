//! Error types for pose handling.

pub use crate::pose::PoseError;

/// Result type for pose operations.
pub type PoseResult<T> = Result<T, PoseError>;
