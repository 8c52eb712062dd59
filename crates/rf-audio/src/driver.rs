//! Thin `cpal` adapter binding `AudioEngine::process_block` to the audio
//! device's fixed-cadence callback (§6 Audio driver contract). Device
//! enumeration and the platform audio stack itself are the out-of-scope
//! "audio device driver" collaborator (§1); this module only wires its
//! callback to the engine.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, Stream, StreamConfig};
use log::error;

use crate::engine::AudioEngine;
use crate::error::{EngineError, EngineResult};

/// Owns the live output stream; dropping this stops playback.
///
/// `AudioEngine` is shared behind a `Mutex` rather than split across
/// exclusively-owned halves: a control-transport adapter on another thread
/// locks the same handle to reach `receiver_mut()`. The lock is held only
/// for the duration of one block's processing or one command's dispatch, so
/// contention stays in the tens-of-microseconds range §5 asks for, at the
/// cost of being coarser-grained than the fully lock-free pose handoff the
/// rest of this crate otherwise provides (see DESIGN.md).
pub struct AudioDriver {
    _stream: Stream,
}

impl AudioDriver {
    pub fn start(engine: Arc<Mutex<AudioEngine>>, sample_rate: u32, block_size: usize) -> EngineResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| EngineError::Driver("no default output device".into()))?;

        let config = StreamConfig {
            channels: 2,
            sample_rate: SampleRate(sample_rate),
            buffer_size: BufferSize::Fixed(block_size as u32),
        };

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    run_callback(&engine, data);
                },
                |err| error!(target: "driver", "audio stream error: {err}"),
                None,
            )
            .map_err(|e| EngineError::Driver(e.to_string()))?;

        stream.play().map_err(|e| EngineError::Driver(e.to_string()))?;
        Ok(Self { _stream: stream })
    }
}

/// One callback invocation: locks the engine, runs one block, and writes
/// interleaved stereo into `data`. Never panics on a poisoned lock — a
/// panicking audio callback would abort the whole stream — it recovers the
/// guard instead (§7: the audio thread never propagates errors out).
fn run_callback(engine: &Arc<Mutex<AudioEngine>>, data: &mut [f32]) {
    let frames = data.len() / 2;
    let mut engine = match engine.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let (left, right) = engine.process_block();
    for frame in 0..frames.min(left.len()) {
        data[frame * 2] = left[frame];
        data[frame * 2 + 1] = right[frame];
    }
}
