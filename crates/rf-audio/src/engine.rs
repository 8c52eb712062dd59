//! Audio Engine: the per-block callback wiring the Sound Handler, Receiver,
//! Filter Storage, and the DS/ER/LR/SD/HP convolvers together (§4.6).
//!
//! DS/ER/LR each get one `Convolver` per input channel (`num_channels = 1`):
//! every channel carries its own audio content, so it cannot share a
//! `Convolver`'s single frequency-domain delay line with any other channel.
//! The engine itself sums the per-channel stereo outputs. SD and HP, which
//! per §4.6 operate on the already-summed two-ear signal rather than on a
//! per-channel source, each get two single-channel convolvers (one per ear)
//! fed by [`rf_dsp::Filter::split_ear_channels`], since one `Convolver`
//! cannot drive two independent input histories through one shared FDL.

use std::sync::Arc;

use log::warn;
use rf_dsp::{Convolver, FilterStorage, InputBuffer, Stage};

use crate::config::{EngineConfig, OutputNormalization};
use crate::receiver::Receiver;
use crate::sound_handler::SoundHandler;

fn partitions_for(filter_size: usize, block_size: usize) -> usize {
    if block_size == 0 {
        0
    } else {
        (filter_size + block_size - 1) / block_size
    }
}

/// Owns every per-block stage and runs the full pipeline once per callback.
/// Exclusively driven by the audio thread; `filter_storage` and
/// `sound_handler` are shared with other threads via their own `Arc` clones,
/// and `receiver` is this engine's single owned instance — the Audio Engine
/// is the sole owner of both Receiver and Sound Handler state per §9 Design
/// Notes, breaking the source's Receiver↔SoundHandler cycle. A transport
/// adapter reaches the Receiver through [`AudioEngine::receiver_mut`].
pub struct AudioEngine {
    config: Arc<EngineConfig>,
    filter_storage: Arc<FilterStorage>,
    sound_handler: Arc<SoundHandler>,
    receiver: Receiver,

    channels: usize,
    block_size: usize,

    ds_input: Vec<InputBuffer>,
    er_input: Vec<InputBuffer>,
    lr_input: Vec<InputBuffer>,
    sd_input: [InputBuffer; 2],
    hp_input: [InputBuffer; 2],

    ds_conv: Vec<Convolver>,
    er_conv: Vec<Convolver>,
    lr_conv: Vec<Convolver>,
    sd_conv: [Convolver; 2],
    hp_conv: [Convolver; 2],

    ds_sum_left: Vec<f32>,
    ds_sum_right: Vec<f32>,
    er_sum_left: Vec<f32>,
    er_sum_right: Vec<f32>,
    lr_sum_left: Vec<f32>,
    lr_sum_right: Vec<f32>,
    out_left: Vec<f32>,
    out_right: Vec<f32>,
}

impl AudioEngine {
    pub fn new(config: Arc<EngineConfig>, filter_storage: Arc<FilterStorage>, sound_handler: Arc<SoundHandler>) -> Self {
        let channels = config.max_channels;
        let block_size = config.block_size;
        let receiver = Receiver::new(channels, sound_handler.clone(), config.clone());

        let ds_partitions = partitions_for(config.filter_sizes.ds, block_size).max(1);
        let er_partitions = partitions_for(config.filter_sizes.er, block_size).max(1);
        let lr_partitions = partitions_for(config.filter_sizes.lr, block_size).max(1);
        let sd_partitions = partitions_for(config.filter_sizes.sd, block_size).max(1);
        let hp_partitions = partitions_for(config.filter_sizes.hp, block_size).max(1);

        Self {
            ds_input: (0..channels).map(|_| InputBuffer::new(block_size)).collect(),
            er_input: (0..channels).map(|_| InputBuffer::new(block_size)).collect(),
            lr_input: (0..channels).map(|_| InputBuffer::new(block_size)).collect(),
            sd_input: [InputBuffer::new(block_size), InputBuffer::new(block_size)],
            hp_input: [InputBuffer::new(block_size), InputBuffer::new(block_size)],
            ds_conv: (0..channels).map(|_| Convolver::new(block_size, 1, ds_partitions)).collect(),
            er_conv: (0..channels).map(|_| Convolver::new(block_size, 1, er_partitions)).collect(),
            lr_conv: (0..channels).map(|_| Convolver::new(block_size, 1, lr_partitions)).collect(),
            sd_conv: [
                Convolver::new(block_size, 1, sd_partitions),
                Convolver::new(block_size, 1, sd_partitions),
            ],
            hp_conv: [
                Convolver::new(block_size, 1, hp_partitions),
                Convolver::new(block_size, 1, hp_partitions),
            ],
            ds_sum_left: vec![0.0; block_size],
            ds_sum_right: vec![0.0; block_size],
            er_sum_left: vec![0.0; block_size],
            er_sum_right: vec![0.0; block_size],
            lr_sum_left: vec![0.0; block_size],
            lr_sum_right: vec![0.0; block_size],
            out_left: vec![0.0; block_size],
            out_right: vec![0.0; block_size],
            config,
            filter_storage,
            sound_handler,
            receiver,
            channels,
            block_size,
        }
    }

    /// The seam a control-transport adapter calls `handle` on.
    pub fn receiver_mut(&mut self) -> &mut Receiver {
        &mut self.receiver
    }

    /// Runs one block through the §4.6 pipeline and returns `(left, right)`,
    /// each `block_size` samples.
    pub fn process_block(&mut self) -> (&[f32], &[f32]) {
        let block = if self.config.pause_audio_playback() {
            vec![vec![0.0f32; self.block_size]; self.channels]
        } else {
            self.sound_handler.get_block(1.0)
        };

        if self.config.pause_convolution() {
            self.passthrough(&block);
        } else {
            self.convolve(&block);
        }

        self.apply_loudness();
        self.detect_clip();
        (&self.out_left, &self.out_right)
    }

    fn passthrough(&mut self, block: &[Vec<f32>]) {
        if block.len() == 2 {
            self.out_left.copy_from_slice(&block[0]);
            self.out_right.copy_from_slice(&block[1]);
        } else {
            let n = block.len().max(1) as f32;
            for k in 0..self.block_size {
                let mixed: f32 = block.iter().map(|row| row[k]).sum::<f32>() / n;
                self.out_left[k] = mixed;
                self.out_right[k] = mixed;
            }
        }
    }

    fn convolve(&mut self, block: &[Vec<f32>]) {
        self.refresh_dirty_filters();

        for c in 0..self.channels {
            let spectrum = self.ds_input[c].push_block(&block[c]).to_vec();
            let (l, r) = self.ds_conv[c].process(&spectrum);
            if c == 0 {
                self.ds_sum_left.copy_from_slice(l);
                self.ds_sum_right.copy_from_slice(r);
            } else {
                add_into(&mut self.ds_sum_left, l);
                add_into(&mut self.ds_sum_right, r);
            }

            let spectrum = self.er_input[c].push_block(&block[c]).to_vec();
            let (l, r) = self.er_conv[c].process(&spectrum);
            if c == 0 {
                self.er_sum_left.copy_from_slice(l);
                self.er_sum_right.copy_from_slice(r);
            } else {
                add_into(&mut self.er_sum_left, l);
                add_into(&mut self.er_sum_right, r);
            }

            let spectrum = self.lr_input[c].push_block(&block[c]).to_vec();
            let (l, r) = self.lr_conv[c].process(&spectrum);
            if c == 0 {
                self.lr_sum_left.copy_from_slice(l);
                self.lr_sum_right.copy_from_slice(r);
            } else {
                add_into(&mut self.lr_sum_left, l);
                add_into(&mut self.lr_sum_right, r);
            }
        }

        if self.config.sd_convolver_active {
            let left_spectrum = self.sd_input[0].push_block(&self.ds_sum_left).to_vec();
            let right_spectrum = self.sd_input[1].push_block(&self.ds_sum_right).to_vec();
            let (ll, _) = self.sd_conv[0].process(&left_spectrum);
            self.ds_sum_left.copy_from_slice(ll);
            let (_, rr) = self.sd_conv[1].process(&right_spectrum);
            self.ds_sum_right.copy_from_slice(rr);
        }

        for k in 0..self.block_size {
            self.out_left[k] = self.ds_sum_left[k] + self.er_sum_left[k] + self.lr_sum_left[k];
            self.out_right[k] = self.ds_sum_right[k] + self.er_sum_right[k] + self.lr_sum_right[k];
        }

        if self.config.use_headphone_filter {
            let left_spectrum = self.hp_input[0].push_block(&self.out_left).to_vec();
            let right_spectrum = self.hp_input[1].push_block(&self.out_right).to_vec();
            let (ll, _) = self.hp_conv[0].process(&left_spectrum);
            let left_result: Vec<f32> = ll.to_vec();
            let (_, rr) = self.hp_conv[1].process(&right_spectrum);
            self.out_left.copy_from_slice(&left_result);
            self.out_right.copy_from_slice(rr);
        }
    }

    /// Consumes every dirty pose row and installs the fetched filter on its
    /// channel's convolver (§4.6 step 4b). Unlike the spec's "refetch every
    /// channel's filter if any one channel is dirty" wording, each channel
    /// owns a dedicated single-channel convolver here, so a dirty bit on
    /// channel c only ever touches channel c's convolver.
    fn refresh_dirty_filters(&mut self) {
        for c in 0..self.channels {
            if let Some(row) = self.receiver.ds.take_if_dirty(c) {
                let filter = self.filter_storage.get(Stage::Ds, &row);
                if let Err(e) = self.ds_conv[c].set_all_filters(vec![filter]) {
                    warn!(target: "engine", "DS filter install failed for channel {c}: {e}");
                }
            }
            if let Some(row) = self.receiver.er.take_if_dirty(c) {
                let filter = self.filter_storage.get(Stage::Er, &row);
                if let Err(e) = self.er_conv[c].set_all_filters(vec![filter]) {
                    warn!(target: "engine", "ER filter install failed for channel {c}: {e}");
                }
            }
            if let Some(row) = self.receiver.lr.take_if_dirty(c) {
                let filter = self.filter_storage.get(Stage::Lr, &row);
                if let Err(e) = self.lr_conv[c].set_all_filters(vec![filter]) {
                    warn!(target: "engine", "LR filter install failed for channel {c}: {e}");
                }
            }
        }

        // SD applies once to the post-sum two-ear signal, not per source
        // channel; channel 0's directivity row is the one that drives it
        // (§9 Design Notes data-model/operational-step resolution, see
        // DESIGN.md).
        if let Some(row) = self.receiver.sd.take_if_dirty(0) {
            let filter = self.filter_storage.get(Stage::Sd, &row);
            let (left_only, right_only) = filter.split_ear_channels();
            if let Err(e) = self.sd_conv[0].set_all_filters(vec![Arc::new(left_only)]) {
                warn!(target: "engine", "SD filter install failed (left): {e}");
            }
            if let Err(e) = self.sd_conv[1].set_all_filters(vec![Arc::new(right_only)]) {
                warn!(target: "engine", "SD filter install failed (right): {e}");
            }
        }
    }

    fn apply_loudness(&mut self) {
        let loudness = self.config.loudness_factor();
        let normaliser = match self.config.output_normalization {
            OutputNormalization::Fixed => 1.0,
            OutputNormalization::PerChannel => (self.channels.max(1)) as f32,
        };
        let gain = loudness / normaliser;
        for v in self.out_left.iter_mut() {
            *v *= gain;
        }
        for v in self.out_right.iter_mut() {
            *v *= gain;
        }
    }

    fn detect_clip(&self) {
        let peak = self
            .out_left
            .iter()
            .chain(self.out_right.iter())
            .fold(0.0f32, |acc, &v| acc.max(v.abs()));
        if peak > 1.0 {
            warn!(target: "engine", "clip detected, peak {peak}");
        }
    }

    /// Installs the headphone filter if configured. Called once before the
    /// first `process_block`; HP has no per-channel key, just one filter
    /// applied post-sum (§3, §4.1).
    pub fn install_headphone_filter(&mut self) -> Result<(), rf_dsp::DspError> {
        if !self.config.use_headphone_filter {
            return Ok(());
        }
        let filter = self.filter_storage.get_headphone()?;
        let (left_only, right_only) = filter.split_ear_channels();
        self.hp_conv[0].set_all_filters(vec![Arc::new(left_only)])?;
        self.hp_conv[1].set_all_filters(vec![Arc::new(right_only)])?;
        Ok(())
    }
}

fn add_into(accum: &mut [f32], addend: &[f32]) {
    for (a, b) in accum.iter_mut().zip(addend.iter()) {
        *a += b;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::{InMemorySource, LoopState, PlayState};

    fn test_engine(channels: usize) -> AudioEngine {
        let mut config = EngineConfig::default();
        config.max_channels = channels;
        config.block_size = 8;
        config.filter_sizes.ds = 8;
        config.filter_sizes.er = 8;
        config.filter_sizes.lr = 8;
        config.filter_sizes.sd = 8;
        config.filter_sizes.hp = 8;
        let config = Arc::new(config);
        let filter_storage = Arc::new(FilterStorage::new(config.block_size));
        let sound_handler = Arc::new(SoundHandler::new(config.max_channels, config.block_size));
        AudioEngine::new(config, filter_storage, sound_handler)
    }

    #[test]
    fn silent_setup_yields_silence() {
        let mut engine = test_engine(2);
        let (left, right) = engine.process_block();
        assert!(left.iter().all(|&v| v == 0.0));
        assert!(right.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn pause_audio_playback_yields_silence_even_with_a_playing_source() {
        let mut engine = test_engine(1);
        let source = InMemorySource::mono(vec![1.0; 64]);
        engine
            .sound_handler
            .create_player("p", vec![Box::new(source)], LoopState::Loop, 0, 1.0, PlayState::Playing);
        engine.config.set_pause_audio_playback(true);
        let (left, right) = engine.process_block();
        assert!(left.iter().all(|&v| v == 0.0));
        assert!(right.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn pause_convolution_passes_stereo_block_through_unfiltered() {
        let mut engine = test_engine(2);
        engine.config.set_pause_convolution(true);
        let stereo_src = InMemorySource::new(vec![vec![0.5; 64], vec![-0.5; 64]]);
        engine
            .sound_handler
            .create_player("p", vec![Box::new(stereo_src)], LoopState::Loop, 0, 1.0, PlayState::Playing);
        let (left, right) = engine.process_block();
        assert!(left.iter().all(|&v| (v - 0.5).abs() < 1e-5));
        assert!(right.iter().all(|&v| (v + 0.5).abs() < 1e-5));
    }

    #[test]
    fn pose_miss_leaves_ds_contribution_silent() {
        let mut engine = test_engine(1);
        engine.receiver.ds.merge_slice(0, 0, &[0; 15]);
        let source = InMemorySource::mono(vec![1.0; 64]);
        engine
            .sound_handler
            .create_player("p", vec![Box::new(source)], LoopState::Loop, 0, 1.0, PlayState::Playing);
        let (left, right) = engine.process_block();
        assert!(left.iter().all(|&v| v == 0.0));
        assert!(right.iter().all(|&v| v == 0.0));
    }
}
