//! Sound handling, playback, control dispatch, and the real-time audio
//! callback.
//!
//! `SoundHandler` owns named `Player`s and mixes their blocks into the
//! engine's output bus. `Receiver` decodes control messages into pose
//! updates and player commands. `AudioEngine` is the per-block callback: it
//! pulls a block from the Sound Handler, installs any filters the Receiver
//! marked dirty, runs the DS/ER/LR/SD/HP convolvers, and emits the final
//! stereo block. `AudioDriver` is the thin `cpal` adapter that calls it.

pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod player;
pub mod pose_slots;
pub mod receiver;
pub mod sound_handler;

pub use config::{EngineConfig, FilterSizes, FilterSource, OutputNormalization};
pub use driver::AudioDriver;
pub use engine::AudioEngine;
pub use error::{EngineError, EngineResult};
pub use player::{AudioSource, InMemorySource, LoopState, Player, PlayState, WavFileSource};
pub use pose_slots::{FullPoseSlots, PoseSlots, SourcePoseSlots};
pub use receiver::{FilterStage, PoseSlice, Receiver, ReceiverCommand};
pub use sound_handler::SoundHandler;
