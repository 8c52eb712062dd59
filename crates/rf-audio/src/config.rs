//! Typed engine configuration.
//!
//! Parsed once from already-tokenized key/value pairs — the config-file
//! parser itself is the out-of-scope collaborator (§1); this type only knows
//! how to turn tokens into typed fields. The mutable subset
//! (`loudness_factor`, `pause_audio_playback`, `pause_convolution`) lives in
//! atomics so the Receiver and the Audio Engine can share one `Arc` without
//! locking, mirroring the teacher's cache-line atomics-for-hot-fields
//! pattern.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use log::warn;

/// Parses `value` into `*slot`'s type, logging and leaving `*slot` unchanged
/// on failure — `ConfigParse` is never fatal (§7).
fn assign<T: FromStr>(key: &str, value: &str, slot: &mut T) {
    match value.parse::<T>() {
        Ok(v) => *slot = v,
        Err(_) => warn!(target: "config", "bad value {value:?} for key {key:?}"),
    }
}

/// Which divisor `process_block` applies to the summed DS/ER/LR result
/// before `loudnessFactor` (§9 Design Notes, resolved open question).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputNormalization {
    /// Divide only by `loudnessFactor`.
    Fixed,
    /// Divide by `loudnessFactor * max(1, active_channel_count)`.
    PerChannel,
}

impl Default for OutputNormalization {
    fn default() -> Self {
        Self::PerChannel
    }
}

/// Where Filter Storage should read IRs from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterSource {
    Wav,
    Mat,
}

/// Per-stage filter-size settings in samples, prior to the block-size
/// rounding Filter Storage applies at load time.
#[derive(Debug, Clone, Copy)]
pub struct FilterSizes {
    pub ds: usize,
    pub er: usize,
    pub lr: usize,
    pub sd: usize,
    pub hp: usize,
}

impl Default for FilterSizes {
    fn default() -> Self {
        Self {
            ds: 512,
            er: 8192,
            lr: 16384,
            sd: 512,
            hp: 512,
        }
    }
}

/// Engine-wide configuration. Immutable fields are set once at startup;
/// `loudness_factor`, `pause_audio_playback`, and `pause_convolution` are
/// atomics so the Receiver can update them from its own thread without a
/// lock on the audio thread's hot path (§5, §10).
pub struct EngineConfig {
    pub block_size: usize,
    pub sample_rate: u32,
    pub max_channels: usize,
    pub filter_sizes: FilterSizes,
    pub filter_source: FilterSource,
    pub filter_list: Option<String>,
    pub filter_database: Option<String>,
    pub enable_crossfading: bool,
    pub use_headphone_filter: bool,
    pub loop_sound: bool,
    pub ds_convolver_active: bool,
    pub er_convolver_active: bool,
    pub lr_convolver_active: bool,
    pub sd_convolver_active: bool,
    pub output_normalization: OutputNormalization,
    pub recv_type: Option<String>,
    pub recv_protocol: Option<String>,
    pub recv_ip: Option<String>,
    pub recv_port: Option<u16>,

    loudness_factor_bits: AtomicU32,
    pause_audio_playback: AtomicBool,
    pause_convolution: AtomicBool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_size: 256,
            sample_rate: 48_000,
            max_channels: 2,
            filter_sizes: FilterSizes::default(),
            filter_source: FilterSource::Wav,
            filter_list: None,
            filter_database: None,
            enable_crossfading: true,
            use_headphone_filter: false,
            loop_sound: false,
            ds_convolver_active: true,
            er_convolver_active: true,
            lr_convolver_active: true,
            sd_convolver_active: false,
            output_normalization: OutputNormalization::default(),
            recv_type: None,
            recv_protocol: None,
            recv_ip: None,
            recv_port: None,
            loudness_factor_bits: AtomicU32::new(1.0f32.to_bits()),
            pause_audio_playback: AtomicBool::new(false),
            pause_convolution: AtomicBool::new(false),
        }
    }
}

impl EngineConfig {
    /// Builds a config from already-tokenized `key value` pairs (§6
    /// Configuration file, §10). Unrecognized keys and unparsable values are
    /// logged and ignored, never fatal (`ConfigParse`, §7).
    pub fn from_pairs(pairs: impl Iterator<Item = (String, String)>) -> Self {
        let mut config = Self::default();
        for (key, value) in pairs {
            config.apply_pair(&key, &value);
        }
        config
    }

    fn apply_pair(&mut self, key: &str, value: &str) {
        match key {
            "blockSize" => assign(key, value, &mut self.block_size),
            "samplingRate" => assign(key, value, &mut self.sample_rate),
            "maxChannels" => assign(key, value, &mut self.max_channels),
            "ds_filterSize" => assign(key, value, &mut self.filter_sizes.ds),
            "early_filterSize" => assign(key, value, &mut self.filter_sizes.er),
            "late_filterSize" => assign(key, value, &mut self.filter_sizes.lr),
            "directivity_filterSize" => assign(key, value, &mut self.filter_sizes.sd),
            "headphone_filterSize" => assign(key, value, &mut self.filter_sizes.hp),
            "filterSource" => match value {
                "wav" => self.filter_source = FilterSource::Wav,
                "mat" => self.filter_source = FilterSource::Mat,
                other => warn!(target: "config", "unrecognized filterSource {other:?}, keeping default"),
            },
            "filterList" => self.filter_list = Some(value.to_string()),
            "filterDatabase" => self.filter_database = Some(value.to_string()),
            "enableCrossfading" => assign(key, value, &mut self.enable_crossfading),
            "useHeadphoneFilter" => assign(key, value, &mut self.use_headphone_filter),
            "loopSound" => assign(key, value, &mut self.loop_sound),
            "ds_convolverActive" => assign(key, value, &mut self.ds_convolver_active),
            "early_convolverActive" => assign(key, value, &mut self.er_convolver_active),
            "late_convolverActive" => assign(key, value, &mut self.lr_convolver_active),
            "sd_convolverActive" => assign(key, value, &mut self.sd_convolver_active),
            "loudnessFactor" => match value.parse::<f32>() {
                Ok(v) => self.set_loudness_factor(v),
                Err(_) => warn!(target: "config", "bad loudnessFactor {value:?}"),
            },
            "recv_type" => self.recv_type = Some(value.to_string()),
            "recv_protocol" => self.recv_protocol = Some(value.to_string()),
            "recv_ip" => self.recv_ip = Some(value.to_string()),
            "recv_port" => match value.parse::<u16>() {
                Ok(v) => self.recv_port = Some(v),
                Err(_) => warn!(target: "config", "bad value {value:?} for key {key:?}"),
            },
            other => warn!(target: "config", "unrecognized config key {other:?}"),
        }
    }

    pub fn loudness_factor(&self) -> f32 {
        f32::from_bits(self.loudness_factor_bits.load(Ordering::Relaxed))
    }

    pub fn set_loudness_factor(&self, value: f32) {
        self.loudness_factor_bits
            .store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn pause_audio_playback(&self) -> bool {
        self.pause_audio_playback.load(Ordering::Relaxed)
    }

    pub fn set_pause_audio_playback(&self, value: bool) {
        self.pause_audio_playback.store(value, Ordering::Relaxed);
    }

    pub fn pause_convolution(&self) -> bool {
        self.pause_convolution.load(Ordering::Relaxed)
    }

    pub fn set_pause_convolution(&self, value: bool) {
        self.pause_convolution.store(value, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_key_is_ignored_not_fatal() {
        let pairs = vec![("bogusKey".to_string(), "123".to_string())];
        let config = EngineConfig::from_pairs(pairs.into_iter());
        assert_eq!(config.block_size, 256);
    }

    #[test]
    fn parses_recognized_keys() {
        let pairs = vec![
            ("blockSize".to_string(), "512".to_string()),
            ("samplingRate".to_string(), "44100".to_string()),
            ("loudnessFactor".to_string(), "0.5".to_string()),
            ("sd_convolverActive".to_string(), "true".to_string()),
        ];
        let config = EngineConfig::from_pairs(pairs.into_iter());
        assert_eq!(config.block_size, 512);
        assert_eq!(config.sample_rate, 44_100);
        assert_eq!(config.loudness_factor(), 0.5);
        assert!(config.sd_convolver_active);
    }

    #[test]
    fn loudness_factor_is_hot_mutable_via_atomics() {
        let config = EngineConfig::default();
        assert_eq!(config.loudness_factor(), 1.0);
        config.set_loudness_factor(0.25);
        assert_eq!(config.loudness_factor(), 0.25);
    }

    #[test]
    fn pause_flags_default_to_false() {
        let config = EngineConfig::default();
        assert!(!config.pause_audio_playback());
        assert!(!config.pause_convolution());
    }
}
