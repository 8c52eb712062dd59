//! rf-core: Shared types, traits, and utilities for the auralization engine
//!
//! This crate provides the foundational types used across the binaural
//! rendering crates: the sample type, block/rate descriptors, and the
//! top-level error enum.

mod error;
mod sample;

pub use error::*;
pub use sample::*;

/// Supported device sample rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u32)]
pub enum SampleRate {
    Hz44100 = 44100,
    Hz48000 = 48000,
    Hz88200 = 88200,
    Hz96000 = 96000,
    Hz176400 = 176400,
    Hz192000 = 192000,
}

impl SampleRate {
    #[inline]
    pub fn as_f64(self) -> f64 {
        self as u32 as f64
    }

    #[inline]
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            44100 => Some(Self::Hz44100),
            48000 => Some(Self::Hz48000),
            88200 => Some(Self::Hz88200),
            96000 => Some(Self::Hz96000),
            176400 => Some(Self::Hz176400),
            192000 => Some(Self::Hz192000),
            _ => None,
        }
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        Self::Hz48000
    }
}

/// Block (partition) size, in samples. Must evenly divide every configured
/// IR length; the engine's overlap-save window is always `2 * BufferSize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u32)]
pub enum BufferSize {
    Samples64 = 64,
    Samples128 = 128,
    Samples256 = 256,
    Samples512 = 512,
    Samples1024 = 1024,
    Samples2048 = 2048,
}

impl BufferSize {
    #[inline]
    pub fn as_usize(self) -> usize {
        self as u32 as usize
    }

    pub fn from_usize(value: usize) -> Option<Self> {
        match value {
            64 => Some(Self::Samples64),
            128 => Some(Self::Samples128),
            256 => Some(Self::Samples256),
            512 => Some(Self::Samples512),
            1024 => Some(Self::Samples1024),
            2048 => Some(Self::Samples2048),
            _ => None,
        }
    }

    /// Nominal latency in milliseconds at a given sample rate.
    #[inline]
    pub fn latency_ms(self, sample_rate: SampleRate) -> f64 {
        (self.as_usize() as f64 / sample_rate.as_f64()) * 1000.0
    }
}

impl Default for BufferSize {
    fn default() -> Self {
        Self::Samples256
    }
}
