//! Error types for sound handling, playback, control dispatch, and the
//! audio-engine callback.

use thiserror::Error;

/// Errors raised by `rf-audio`.
///
/// Startup-time errors (bad config pairs are merely logged and ignored per
/// §7, never fatal here) and pose-storage errors propagate via `rf_dsp`.
/// Everything in this enum that can occur on the audio thread
/// (`QueueUnderrun`, `ClipDetected`, `ControlMessageMalformed`) is logged and
/// substituted with a safe default by the caller; it is never propagated out
/// of the callback.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("sound file missing or undecodable: {0}")]
    SoundFileMissing(String),

    #[error("player queue underrun for {0:?}")]
    QueueUnderrun(String),

    #[error("clip detected, peak |{0}| > 1.0")]
    ClipDetected(f32),

    #[error("malformed control message: {0}")]
    ControlMessageMalformed(String),

    #[error("no player named {0:?}")]
    UnknownPlayer(String),

    #[error("start_channel {start} out of range for {channels} output channels")]
    ChannelOutOfRange { start: i32, channels: usize },

    #[error(transparent)]
    Dsp(#[from] rf_dsp::DspError),

    #[error("audio driver error: {0}")]
    Driver(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
