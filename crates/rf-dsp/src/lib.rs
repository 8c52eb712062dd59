//! Partitioned frequency-domain convolution engine.
//!
//! `Filter` is a single impulse response stored partitioned in the
//! frequency domain. `FilterStorage` preloads every (stage, pose) filter at
//! startup and serves them by key, falling back to silence for unmapped
//! poses. `InputBuffer` stages a source's time-domain samples into the
//! overlap-save spectrum the convolver needs each block. `Convolver` is the
//! multiply-accumulate core: a frequency-domain delay line driven by a
//! logically rotating base index, with double-buffered filter sets so a
//! filter swap crosses over one block instead of clicking.

pub mod convolver;
pub mod error;
pub mod filter;
pub mod filter_storage;
pub mod input_buffer;
mod windows;

pub use convolver::Convolver;
pub use error::{DspError, DspResult};
pub use filter::{FadeKind, Filter};
pub use filter_storage::{
    BinaryFileRecordSource, FilterRecord, FilterRecordSource, FilterStorage, Stage,
    StageFilterSizes,
};
pub use input_buffer::{InputBuffer, InverseScratch};
