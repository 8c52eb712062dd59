//! Immutable, preloaded (stage, pose-key) → Filter mapping.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::{Arc, Mutex};

use rf_spatial::{Pose, PoseKey, SourcePose, SourcePoseKey};

use crate::error::{DspError, DspResult};
use crate::filter::{FadeKind, Filter};

/// The five IR stages. DS/ER/LR are keyed by a 15-integer `PoseKey`; SD by a
/// 9-integer `SourcePoseKey`; HP has no key at all (a single filter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Ds,
    Er,
    Lr,
    Sd,
    Hp,
}

impl Stage {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "DS" => Some(Self::Ds),
            "ER" => Some(Self::Er),
            "LR" => Some(Self::Lr),
            "SD" => Some(Self::Sd),
            "HP" => Some(Self::Hp),
            _ => None,
        }
    }

    /// Number of integer pose components this stage's filter list lines and
    /// `valueList` rows carry (§3, §4.5).
    pub fn pose_width(self) -> usize {
        match self {
            Stage::Sd => 9,
            Stage::Hp => 0,
            _ => 15,
        }
    }

    /// Fade windowing applied when building this stage's filters (§4.1).
    fn fade_kind(self) -> FadeKind {
        match self {
            Stage::Lr => FadeKind::FadeInFirstPartition,
            Stage::Er => FadeKind::FadeOutLastPartition,
            _ => FadeKind::None,
        }
    }

    /// DS/ER/LR/SD are stereo IRs; HP is a single filter built from one
    /// (already-stereo) IR so it never needs a "missing" default.
    fn is_keyed(self) -> bool {
        !matches!(self, Stage::Hp)
    }
}

/// Per-stage target filter length in samples, each rounded up to a multiple
/// of the engine block size if the caller didn't already do so (§4.1).
#[derive(Debug, Clone, Copy)]
pub struct StageFilterSizes {
    pub ds: usize,
    pub er: usize,
    pub lr: usize,
    pub sd: usize,
    pub hp: usize,
}

impl StageFilterSizes {
    pub fn get(&self, stage: Stage) -> usize {
        match stage {
            Stage::Ds => self.ds,
            Stage::Er => self.er,
            Stage::Lr => self.lr,
            Stage::Sd => self.sd,
            Stage::Hp => self.hp,
        }
    }

    fn rounded(&self, stage: Stage, block_size: usize) -> usize {
        round_up_to_multiple(self.get(stage), block_size)
    }
}

fn round_up_to_multiple(len: usize, b: usize) -> usize {
    if b == 0 || len % b == 0 {
        len
    } else {
        (len / b + 1) * b
    }
}

/// Zero-pads (if short) or truncates (if long) `samples` to exactly
/// `target_len`.
fn normalize_len(mut samples: Vec<f32>, target_len: usize) -> Vec<f32> {
    samples.resize(target_len, 0.0);
    samples
}

/// One filter-database record, already decoded into plain pose integers and
/// time-domain samples. Produced by a `FilterRecordSource`; constructing one
/// from on-disk bytes is the out-of-scope "reading IR databases from disk"
/// collaborator (§1) — this crate only defines the seam and a minimal
/// concrete reader for exercising it.
pub struct FilterRecord {
    pub stage: Stage,
    /// 15 integers for DS/ER/LR, 9 for SD, 0 for HP.
    pub pose_values: Vec<i32>,
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

/// Source of decoded filter-database records, one at a time.
pub trait FilterRecordSource {
    fn next_record(&mut self) -> DspResult<Option<FilterRecord>>;
}

/// Minimal concrete `FilterRecordSource` reading a simple little-endian
/// binary layout: repeated records of
/// `[u8 stage_tag][i32 * pose_width][u32 frame_count][f32 * frame_count * 2]`
/// until EOF. This is not a format any external tool is assumed to produce;
/// it exists so `FilterStorage::load_from_database`'s validate/normalize/
/// install logic can be exercised end-to-end without a real vendor database
/// reader, mirroring the `AudioSource` seam used for sound files (§4.4).
pub struct BinaryFileRecordSource {
    reader: BufReader<File>,
}

impl BinaryFileRecordSource {
    pub fn open(path: &Path) -> DspResult<Self> {
        let file = File::open(path).map_err(|_| DspError::FilterFileMissing(path.to_path_buf()))?;
        Ok(Self {
            reader: BufReader::new(file),
        })
    }
}

impl FilterRecordSource for BinaryFileRecordSource {
    fn next_record(&mut self) -> DspResult<Option<FilterRecord>> {
        use std::io::Read;

        let mut tag = [0u8; 1];
        match self.reader.read(&mut tag)? {
            0 => return Ok(None),
            _ => {}
        }
        let stage = match tag[0] {
            0 => Stage::Ds,
            1 => Stage::Er,
            2 => Stage::Lr,
            3 => Stage::Sd,
            4 => Stage::Hp,
            other => {
                return Err(DspError::DatabaseSyntax(format!(
                    "unrecognized stage tag {other}"
                )));
            }
        };

        let mut pose_values = vec![0i32; stage.pose_width()];
        for slot in &mut pose_values {
            let mut buf = [0u8; 4];
            self.reader.read_exact(&mut buf)?;
            *slot = i32::from_le_bytes(buf);
        }

        let mut frame_count_buf = [0u8; 4];
        self.reader.read_exact(&mut frame_count_buf)?;
        let frame_count = u32::from_le_bytes(frame_count_buf) as usize;

        let mut left = Vec::with_capacity(frame_count);
        let mut right = Vec::with_capacity(frame_count);
        for _ in 0..frame_count {
            let mut lbuf = [0u8; 4];
            let mut rbuf = [0u8; 4];
            self.reader.read_exact(&mut lbuf)?;
            self.reader.read_exact(&mut rbuf)?;
            left.push(f32::from_le_bytes(lbuf));
            right.push(f32::from_le_bytes(rbuf));
        }

        Ok(Some(FilterRecord {
            stage,
            pose_values,
            left,
            right,
        }))
    }
}

/// Immutable (after load), read-only-thereafter (stage, key) → Filter
/// mapping (§3, §4.1). A silent default is returned for any missing key; the
/// first miss for a given (stage, key) is logged, subsequent misses for the
/// same key are not (§10).
pub struct FilterStorage {
    block_size: usize,
    ds: HashMap<PoseKey, Arc<Filter>>,
    er: HashMap<PoseKey, Arc<Filter>>,
    lr: HashMap<PoseKey, Arc<Filter>>,
    sd: HashMap<SourcePoseKey, Arc<Filter>>,
    hp: Option<Arc<Filter>>,
    default_ds: Arc<Filter>,
    default_er: Arc<Filter>,
    default_lr: Arc<Filter>,
    default_sd: Arc<Filter>,
    warned: Mutex<HashSet<(Stage, Vec<i32>)>>,
}

impl FilterStorage {
    pub fn new(block_size: usize) -> Self {
        let silent = Arc::new(Filter::silent(block_size));
        Self {
            block_size,
            ds: HashMap::new(),
            er: HashMap::new(),
            lr: HashMap::new(),
            sd: HashMap::new(),
            hp: None,
            default_ds: silent.clone(),
            default_er: silent.clone(),
            default_lr: silent.clone(),
            default_sd: silent,
            warned: Mutex::new(HashSet::new()),
        }
    }

    /// Parses `<STAGE> <15 or 9 ints> <ir_path>` lines (blank lines and `#`
    /// comments skipped), reads each referenced IR as a WAV file, normalizes
    /// its length to `sizes`, and installs it. A missing IR file is a fatal
    /// `FilterFileMissing` — Filter Storage is populated once at startup and
    /// a missing filter indicates a broken deployment, never a runtime
    /// condition to degrade gracefully from (§4.1, contrast with the
    /// Player's per-file skip-and-continue policy in §4.4).
    pub fn load_from_file_list(&mut self, path: &Path, sizes: &StageFilterSizes) -> DspResult<()> {
        let file = File::open(path).map_err(|_| DspError::FilterFileMissing(path.to_path_buf()))?;
        let reader = BufReader::new(file);

        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let tokens: Vec<&str> = trimmed.split_whitespace().collect();
            if tokens.len() < 2 {
                return Err(DspError::FilterListSyntax {
                    line: line_no,
                    reason: "expected <STAGE> <ints...> <path>".into(),
                });
            }
            let stage = Stage::parse(tokens[0])
                .ok_or_else(|| DspError::StageIdentifierMissing(tokens[0].to_string()))?;
            let pose_width = stage.pose_width();
            let expected_tokens = 1 + pose_width + 1;
            if tokens.len() != expected_tokens {
                return Err(DspError::FilterListSyntax {
                    line: line_no,
                    reason: format!(
                        "stage {:?} expects {pose_width} pose integers, got {}",
                        stage,
                        tokens.len().saturating_sub(2)
                    ),
                });
            }
            let pose_values: Vec<i32> = tokens[1..1 + pose_width]
                .iter()
                .map(|t| {
                    t.parse::<i32>().map_err(|_| DspError::FilterListSyntax {
                        line: line_no,
                        reason: format!("not an integer: {t:?}"),
                    })
                })
                .collect::<DspResult<_>>()?;
            let ir_path = Path::new(tokens[tokens.len() - 1]);

            let (left, right) = read_wav_stereo(ir_path)?;
            self.install(stage, &pose_values, left, right, sizes)?;
        }
        Ok(())
    }

    /// Drains `source` and installs every record, normalizing each IR to
    /// `sizes` exactly as `load_from_file_list` does.
    pub fn load_from_database(
        &mut self,
        source: &mut dyn FilterRecordSource,
        sizes: &StageFilterSizes,
    ) -> DspResult<()> {
        while let Some(record) = source.next_record()? {
            self.install(
                record.stage,
                &record.pose_values,
                record.left,
                record.right,
                sizes,
            )?;
        }
        Ok(())
    }

    fn install(
        &mut self,
        stage: Stage,
        pose_values: &[i32],
        left: Vec<f32>,
        right: Vec<f32>,
        sizes: &StageFilterSizes,
    ) -> DspResult<()> {
        let target_len = sizes.rounded(stage, self.block_size);
        let left = normalize_len(left, target_len);
        let right = normalize_len(right, target_len);
        let filter = Arc::new(Filter::from_time_domain(
            &left,
            &right,
            self.block_size,
            stage.fade_kind(),
        ));

        match stage {
            Stage::Ds => {
                let key = Pose::from_filter_values(pose_values)
                    .map_err(|e| DspError::FilterListSyntax {
                        line: 0,
                        reason: e.to_string(),
                    })?
                    .create_key();
                self.ds.insert(key, filter);
            }
            Stage::Er => {
                let key = Pose::from_filter_values(pose_values)
                    .map_err(|e| DspError::FilterListSyntax {
                        line: 0,
                        reason: e.to_string(),
                    })?
                    .create_key();
                self.er.insert(key, filter);
            }
            Stage::Lr => {
                let key = Pose::from_filter_values(pose_values)
                    .map_err(|e| DspError::FilterListSyntax {
                        line: 0,
                        reason: e.to_string(),
                    })?
                    .create_key();
                self.lr.insert(key, filter);
            }
            Stage::Sd => {
                let key = SourcePose::from_filter_values(pose_values)
                    .map_err(|e| DspError::FilterListSyntax {
                        line: 0,
                        reason: e.to_string(),
                    })?
                    .create_key();
                self.sd.insert(key, filter);
            }
            Stage::Hp => {
                self.hp = Some(filter);
            }
        }
        Ok(())
    }

    /// Looks up a filter by stage and pose key, returning a clone of the
    /// shared `Arc`. Misses return the stage's silent default and log a
    /// warning the first time a given key is missed, never again after
    /// (§10 — an improvement over every-miss logging).
    pub fn get(&self, stage: Stage, key: &[i32]) -> Arc<Filter> {
        debug_assert!(stage.is_keyed());
        let map_hit = match stage {
            Stage::Ds => key_as_pose(key).and_then(|k| self.ds.get(&k)),
            Stage::Er => key_as_pose(key).and_then(|k| self.er.get(&k)),
            Stage::Lr => key_as_pose(key).and_then(|k| self.lr.get(&k)),
            Stage::Sd => key_as_source_pose(key).and_then(|k| self.sd.get(&k)),
            Stage::Hp => None,
        };
        if let Some(filter) = map_hit {
            return filter.clone();
        }

        let already_warned = {
            let mut warned = self.warned.lock().unwrap();
            !warned.insert((stage, key.to_vec()))
        };
        if !already_warned {
            log::warn!(target: "filter_storage", "no filter for stage {stage:?}, key {key:?}; using silence");
        }

        match stage {
            Stage::Ds => self.default_ds.clone(),
            Stage::Er => self.default_er.clone(),
            Stage::Lr => self.default_lr.clone(),
            Stage::Sd => self.default_sd.clone(),
            Stage::Hp => unreachable!("HP has no keyed lookup"),
        }
    }

    pub fn get_headphone(&self) -> DspResult<Arc<Filter>> {
        self.hp.clone().ok_or(DspError::NoHeadphoneFilter)
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

fn key_as_pose(key: &[i32]) -> Option<PoseKey> {
    key.try_into().ok()
}

fn key_as_source_pose(key: &[i32]) -> Option<SourcePoseKey> {
    key.try_into().ok()
}

/// Reads a stereo (or mono, duplicated to both channels) WAV IR as `f32`
/// samples. The "mat" `filterSource` configuration names a MATLAB-array
/// loader this crate does not implement (an out-of-scope decoder, same
/// status as the full multi-format `AudioSource` stack for sound files);
/// only the WAV path is wired up end-to-end here.
fn read_wav_stereo(path: &Path) -> DspResult<(Vec<f32>, Vec<f32>)> {
    let mut reader =
        hound::WavReader::open(path).map_err(|_| DspError::FilterFileMissing(path.to_path_buf()))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| DspError::DatabaseSyntax(e.to_string()))?,
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<Result<_, _>>()
                .map_err(|e| DspError::DatabaseSyntax(e.to_string()))?
        }
    };

    if channels == 1 {
        Ok((samples.clone(), samples))
    } else {
        let left: Vec<f32> = samples.iter().step_by(channels).copied().collect();
        let right: Vec<f32> = samples
            .iter()
            .skip(1)
            .step_by(channels)
            .copied()
            .collect();
        Ok((left, right))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(n: usize) -> StageFilterSizes {
        StageFilterSizes {
            ds: n,
            er: n,
            lr: n,
            sd: n,
            hp: n,
        }
    }

    #[test]
    fn missing_pose_returns_silent_default() {
        let storage = FilterStorage::new(64);
        let key = [0i32; 15];
        let filter = storage.get(Stage::Ds, &key);
        assert!(filter.is_silent());
    }

    #[test]
    fn second_miss_does_not_warn_again() {
        let storage = FilterStorage::new(64);
        let key = [1i32; 15];
        let _ = storage.get(Stage::Ds, &key);
        let _ = storage.get(Stage::Ds, &key);
        assert_eq!(storage.warned.lock().unwrap().len(), 1);
    }

    #[test]
    fn headphone_missing_is_an_error() {
        let storage = FilterStorage::new(64);
        assert!(matches!(
            storage.get_headphone(),
            Err(DspError::NoHeadphoneFilter)
        ));
    }

    #[test]
    fn install_then_get_round_trips() {
        let mut storage = FilterStorage::new(4);
        let pose = vec![0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        storage
            .install(Stage::Ds, &pose, vec![1.0; 4], vec![1.0; 4], &sizes(4))
            .unwrap();
        let filter = storage.get(Stage::Ds, &pose);
        assert!(!filter.is_silent());
        assert_eq!(filter.p, 1);
    }

    #[test]
    fn stage_sizes_round_up_to_block_multiple() {
        let sizes = sizes(100);
        assert_eq!(sizes.rounded(Stage::Ds, 64), 128);
    }
}
