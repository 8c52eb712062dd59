//! Networked control endpoint (transport out of scope; see `handle`).
//!
//! Per §9 Design Notes, command decoding is an enum produced once from a
//! decoded `(address, args)` pair, not a runtime string→closure map;
//! dispatch is a single `match`. The socket/transport that produces that
//! pair is the out-of-scope collaborator (§1); this crate exposes
//! `Receiver::handle(ReceiverCommand)` as the seam a transport adapter
//! calls into.

use std::sync::Arc;

use log::warn;

use crate::config::EngineConfig;
use crate::player::{AudioSource, LoopState, PlayState};
use crate::pose_slots::{FullPoseSlots, SourcePoseSlots};
use crate::sound_handler::SoundHandler;

/// Which of the 15-wide row's slices a `FILTER_DS/ER/LR` message updates
/// (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseSlice {
    Full,
    Orientation,
    Position,
    SourceOrientation,
    SourcePosition,
    Custom,
}

impl PoseSlice {
    /// `(offset, width)` into the 15-wide row.
    fn offset_width(self) -> (usize, usize) {
        match self {
            PoseSlice::Full => (0, 15),
            PoseSlice::Orientation => (0, 3),
            PoseSlice::Position => (3, 3),
            PoseSlice::SourceOrientation => (6, 3),
            PoseSlice::SourcePosition => (9, 3),
            PoseSlice::Custom => (12, 3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStage {
    Ds,
    Er,
    Lr,
}

/// Decoded control message (§4.5, §6). A transport adapter parses the raw
/// `(address, args)` pair into one of these once, at the socket boundary.
pub enum ReceiverCommand {
    /// `FILTER_<stage>[_slice]`: merge `values` into `channel`'s row.
    Filter {
        stage: FilterStage,
        slice: PoseSlice,
        channel: usize,
        values: Vec<i32>,
    },
    /// `FILTER_SD`: merge into the 9-wide source-directivity row.
    FilterSd { channel: usize, values: Vec<i32> },
    /// `FILE`: replace the default player's file list.
    File { paths: Vec<String> },
    /// `PLAY`: create a new player.
    Play {
        paths: Vec<String>,
        start_channel: i32,
        loop_state: LoopState,
        name: String,
        volume: f32,
        initial_state: PlayState,
    },
    PlayerControl { name: String, state: PlayState },
    PlayerChannel { name: String, channel: i32 },
    PlayerVolume { name: String, volume: f32 },
    StopAllPlayers,
    PauseAudio(bool),
    PauseConvolution(bool),
    Loudness(f32),
    /// Atomic batch: every subcommand is applied before any other receiver
    /// thread observes the state (§8 scenario 6).
    Multi(Vec<ReceiverCommand>),
}

/// Owns the pending pose matrices/dirty bits for DS/ER/LR/SD and forwards
/// player/config commands. `sound_handler` and `config` are non-owning
/// references — the Audio Engine is the single owner of both (§9 Design
/// Notes, breaking the source's Receiver↔SoundHandler cycle).
pub struct Receiver {
    pub ds: FullPoseSlots,
    pub er: FullPoseSlots,
    pub lr: FullPoseSlots,
    pub sd: SourcePoseSlots,
    sound_handler: Arc<SoundHandler>,
    config: Arc<EngineConfig>,
}

impl Receiver {
    pub fn new(max_channels: usize, sound_handler: Arc<SoundHandler>, config: Arc<EngineConfig>) -> Self {
        Self {
            ds: FullPoseSlots::new(max_channels),
            er: FullPoseSlots::new(max_channels),
            lr: FullPoseSlots::new(max_channels),
            sd: SourcePoseSlots::new(max_channels),
            sound_handler,
            config,
        }
    }

    /// Applies one decoded command. Never propagates an error: a malformed
    /// or out-of-range command is logged and dropped (§7
    /// `ControlMessageMalformed`), so a bad message never corrupts other
    /// players or stages.
    pub fn handle(&mut self, command: ReceiverCommand) {
        match command {
            ReceiverCommand::Filter { stage, slice, channel, values } => {
                let (offset, width) = slice.offset_width();
                if values.len() != width {
                    warn!(target: "receiver", "expected {width} values for {slice:?}, got {}", values.len());
                    return;
                }
                let slots = match stage {
                    FilterStage::Ds => &mut self.ds,
                    FilterStage::Er => &mut self.er,
                    FilterStage::Lr => &mut self.lr,
                };
                if channel >= slots.max_channels() {
                    warn!(target: "receiver", "channel {channel} out of range");
                    return;
                }
                slots.merge_slice(channel, offset, &values);
            }
            ReceiverCommand::FilterSd { channel, values } => {
                if values.len() != 9 {
                    warn!(target: "receiver", "expected 9 values for FILTER_SD, got {}", values.len());
                    return;
                }
                if channel >= self.sd.max_channels() {
                    warn!(target: "receiver", "channel {channel} out of range");
                    return;
                }
                self.sd.merge_slice(channel, 0, &values);
            }
            ReceiverCommand::File { paths } => {
                let sources = open_wav_sources(&paths);
                self.sound_handler.create_player(
                    "default",
                    sources,
                    LoopState::Single,
                    0,
                    1.0,
                    PlayState::Playing,
                );
            }
            ReceiverCommand::Play {
                paths,
                start_channel,
                loop_state,
                name,
                volume,
                initial_state,
            } => {
                let sources = open_wav_sources(&paths);
                self.sound_handler
                    .create_player(name, sources, loop_state, start_channel, volume, initial_state);
            }
            ReceiverCommand::PlayerControl { name, state } => {
                if let Err(e) = self.sound_handler.set_player_state(&name, state) {
                    warn!(target: "receiver", "{e}");
                }
            }
            ReceiverCommand::PlayerChannel { name, channel } => {
                if let Err(e) = self.sound_handler.set_player_start_channel(&name, channel) {
                    warn!(target: "receiver", "{e}");
                }
            }
            ReceiverCommand::PlayerVolume { name, volume } => {
                if let Err(e) = self.sound_handler.set_player_volume(&name, volume) {
                    warn!(target: "receiver", "{e}");
                }
            }
            ReceiverCommand::StopAllPlayers => self.sound_handler.stop_all_players(),
            ReceiverCommand::PauseAudio(pause) => self.config.set_pause_audio_playback(pause),
            ReceiverCommand::PauseConvolution(pause) => self.config.set_pause_convolution(pause),
            ReceiverCommand::Loudness(value) => self.config.set_loudness_factor(value),
            ReceiverCommand::Multi(subcommands) => {
                for sub in subcommands {
                    self.handle(sub);
                }
            }
        }
    }
}

/// Opens each path as a `WavFileSource`, skipping (and logging) any that
/// fail to open — the out-of-scope file-reading collaborator's failure
/// mode, not this crate's concern beyond degrading gracefully (§4.4).
fn open_wav_sources(paths: &[String]) -> Vec<Box<dyn AudioSource>> {
    paths
        .iter()
        .filter_map(|p| match crate::player::WavFileSource::open(std::path::Path::new(p)) {
            Ok(source) => Some(Box::new(source) as Box<dyn AudioSource>),
            Err(e) => {
                warn!(target: "receiver", "skipping unreadable sound file {p:?}: {e}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_receiver() -> Receiver {
        let sound_handler = Arc::new(SoundHandler::new(2, 64));
        let config = Arc::new(EngineConfig::default());
        Receiver::new(4, sound_handler, config)
    }

    #[test]
    fn idempotent_filter_update_raises_dirty_once() {
        let mut receiver = test_receiver();
        receiver.handle(ReceiverCommand::Filter {
            stage: FilterStage::Ds,
            slice: PoseSlice::Full,
            channel: 0,
            values: vec![0; 15],
        });
        assert!(receiver.ds.is_dirty(0));
        let _ = receiver.ds.take_if_dirty(0);

        receiver.handle(ReceiverCommand::Filter {
            stage: FilterStage::Ds,
            slice: PoseSlice::Full,
            channel: 0,
            values: vec![0; 15],
        });
        assert!(!receiver.ds.is_dirty(0), "re-sending the identical pose must not raise dirty again");
    }

    #[test]
    fn wrong_width_filter_message_is_dropped() {
        let mut receiver = test_receiver();
        receiver.handle(ReceiverCommand::Filter {
            stage: FilterStage::Er,
            slice: PoseSlice::Orientation,
            channel: 0,
            values: vec![1, 2],
        });
        assert!(!receiver.er.is_dirty(0));
    }

    #[test]
    fn multi_command_applies_every_subcommand_atomically() {
        let mut receiver = test_receiver();
        receiver.handle(ReceiverCommand::Multi(vec![
            ReceiverCommand::Loudness(0.5),
            ReceiverCommand::PauseAudio(true),
        ]));
        assert_eq!(receiver.config.loudness_factor(), 0.5);
        assert!(receiver.config.pause_audio_playback());
    }

    #[test]
    fn out_of_range_channel_is_dropped_not_panicking() {
        let mut receiver = test_receiver();
        receiver.handle(ReceiverCommand::FilterSd {
            channel: 99,
            values: vec![0; 9],
        });
    }
}
