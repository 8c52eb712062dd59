//! Player: sequential file playback behind a prefetch thread.
//!
//! Sample decoding (parsing WAV/FLAC/MP3 containers) is the out-of-scope
//! "reading audio sample files" collaborator (§1, §4.4); the Player is
//! written against the small `AudioSource` seam so the prefetch/queue/
//! loop-state machinery here is fully exercised without a multi-format
//! decoder stack. `WavFileSource` is a minimal, concrete decoder used for
//! real files; `InMemorySource` exercises the same machinery in tests.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{error, warn};

/// Minimum blocks the prefetch thread keeps queued ahead of the audio
/// thread (§4.4).
pub const QMIN: usize = 4;

const QUEUE_CAPACITY: usize = QMIN * 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Playing,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Single,
    Loop,
}

/// One (possibly multi-channel) decoded block, one `Vec<f32>` of length `B`
/// per channel.
pub type PlayerBlock = Vec<Vec<f32>>;

/// Seam between this crate's prefetch/queue machinery and an actual file
/// decoder. `read_into` fills each channel's slice starting at frame 0 and
/// returns the number of frames actually produced; 0 means end-of-stream.
/// A return value less than `buf[0].len()` means the source ran out
/// mid-read — frames at and beyond the returned count are left untouched,
/// it is the caller's job to decide whether to zero-pad or pull the rest
/// from wherever comes next (§4.4, the leftover-carrying behavior
/// `prefetch_loop` implements).
pub trait AudioSource: Send {
    fn channels(&self) -> usize;
    fn read_into(&mut self, buf: &mut [Vec<f32>]) -> usize;
    /// Rewinds to the start of the stream, for `LoopState::Loop` wraparound.
    fn reset(&mut self);
}

/// An in-memory, cyclable source — used by tests and by any caller that
/// already has decoded PCM in hand.
pub struct InMemorySource {
    channels: Vec<Vec<f32>>,
    pos: usize,
}

impl InMemorySource {
    pub fn new(channels: Vec<Vec<f32>>) -> Self {
        Self { channels, pos: 0 }
    }

    pub fn mono(samples: Vec<f32>) -> Self {
        Self::new(vec![samples])
    }
}

impl AudioSource for InMemorySource {
    fn channels(&self) -> usize {
        self.channels.len()
    }

    fn read_into(&mut self, buf: &mut [Vec<f32>]) -> usize {
        let total = self.channels[0].len();
        let remaining = total.saturating_sub(self.pos);
        let block_len = buf[0].len();
        let to_copy = remaining.min(block_len);
        for (ch, out) in self.channels.iter().zip(buf.iter_mut()) {
            out[..to_copy].copy_from_slice(&ch[self.pos..self.pos + to_copy]);
        }
        self.pos += to_copy;
        to_copy
    }

    fn reset(&mut self) {
        self.pos = 0;
    }
}

/// A minimal WAV-backed `AudioSource`. Deinterleaves on read; does not
/// resample or convert sample rate (out of scope, §1).
pub struct WavFileSource {
    path: std::path::PathBuf,
    reader: hound::WavReader<std::io::BufReader<std::fs::File>>,
    channels: usize,
}

impl WavFileSource {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let reader = hound::WavReader::open(path)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        let channels = reader.spec().channels as usize;
        Ok(Self {
            path: path.to_path_buf(),
            reader,
            channels,
        })
    }
}

impl AudioSource for WavFileSource {
    fn channels(&self) -> usize {
        self.channels
    }

    fn read_into(&mut self, buf: &mut [Vec<f32>]) -> usize {
        let block_len = buf[0].len();
        let spec = self.reader.spec();
        let max = if spec.bits_per_sample >= 32 {
            1.0
        } else {
            (1i64 << (spec.bits_per_sample - 1)) as f32
        };
        let mut frames_read = 0;
        'frames: for frame in 0..block_len {
            for ch in 0..self.channels {
                let sample = match spec.sample_format {
                    hound::SampleFormat::Float => self.reader.samples::<f32>().next(),
                    hound::SampleFormat::Int => self
                        .reader
                        .samples::<i32>()
                        .next()
                        .map(|r| r.map(|v| v as f32 / max)),
                };
                match sample {
                    Some(Ok(v)) => buf[ch][frame] = v,
                    _ => break 'frames,
                }
            }
            frames_read = frame + 1;
        }
        frames_read
    }

    fn reset(&mut self) {
        match hound::WavReader::open(&self.path) {
            Ok(reader) => self.reader = reader,
            Err(e) => error!(target: "player", "failed to rewind {:?}: {e}", self.path),
        }
    }
}

enum QueueItem {
    Block(PlayerBlock),
    End,
}

/// One named playback channel. Owns a prefetch thread that decodes ahead
/// into a bounded SPSC queue; the audio thread only ever pops from it.
pub struct Player {
    name: String,
    block_size: usize,
    play_state: AtomicU8,
    volume_bits: AtomicU32,
    start_channel: AtomicI32,
    last_channels: AtomicU32,
    consumer: rtrb::Consumer<QueueItem>,
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Player {
    pub fn new(
        name: impl Into<String>,
        sources: Vec<Box<dyn AudioSource>>,
        block_size: usize,
        loop_state: LoopState,
        start_channel: i32,
        volume: f32,
        initial_state: PlayState,
    ) -> Self {
        let (mut producer, consumer) = rtrb::RingBuffer::new(QUEUE_CAPACITY);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let thread_stop = stop_flag.clone();
        let thread_loop_state = loop_state;
        let name_for_thread = name.into();
        let thread_name = name_for_thread.clone();

        let handle = std::thread::Builder::new()
            .name(format!("player-prefetch-{thread_name}"))
            .spawn(move || {
                prefetch_loop(sources, block_size, thread_loop_state, &mut producer, &thread_stop);
            })
            .expect("failed to spawn player prefetch thread");

        Self {
            name: thread_name,
            block_size,
            play_state: AtomicU8::new(initial_state as u8),
            volume_bits: AtomicU32::new(volume.to_bits()),
            start_channel: AtomicI32::new(start_channel),
            last_channels: AtomicU32::new(1),
            consumer,
            stop_flag,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn play_state(&self) -> PlayState {
        decode_play_state(self.play_state.load(Ordering::Relaxed))
    }

    pub fn set_play_state(&self, state: PlayState) {
        self.play_state.store(state as u8, Ordering::Relaxed);
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume_bits.store(volume.to_bits(), Ordering::Relaxed);
    }

    pub fn start_channel(&self) -> i32 {
        self.start_channel.load(Ordering::Relaxed)
    }

    pub fn set_start_channel(&self, channel: i32) {
        self.start_channel.store(channel, Ordering::Relaxed);
    }

    /// Non-blocking. Returns `None` iff the player has stopped; otherwise a
    /// `(1 or 2, B)` block, substituting zeros (and logging) on underrun or
    /// while paused (§4.4).
    pub fn get_block(&mut self) -> Option<PlayerBlock> {
        if self.play_state() == PlayState::Stopped {
            return None;
        }
        if self.play_state() == PlayState::Paused {
            return Some(self.silent_block());
        }

        match self.consumer.pop() {
            Ok(QueueItem::Block(block)) => {
                self.last_channels
                    .store(block.len() as u32, Ordering::Relaxed);
                Some(block)
            }
            Ok(QueueItem::End) => {
                self.set_play_state(PlayState::Stopped);
                None
            }
            Err(_) => {
                warn!(target: "player", "queue underrun for {:?}", self.name);
                Some(self.silent_block())
            }
        }
    }

    fn silent_block(&self) -> PlayerBlock {
        let channels = self.last_channels.load(Ordering::Relaxed).max(1) as usize;
        vec![vec![0.0; self.block_size]; channels]
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn decode_play_state(value: u8) -> PlayState {
    match value {
        0 => PlayState::Playing,
        1 => PlayState::Paused,
        _ => PlayState::Stopped,
    }
}

/// Prepends `leftover`'s samples to `fresh`'s first `fresh_frames` samples,
/// channel-wise. Channel counts need not match (a loop can cross from one
/// source into another with a different channel count); the missing rows on
/// the narrower side are treated as zero, mirroring the original's
/// `audio_concat`.
fn audio_concat(leftover: &[Vec<f32>], fresh: &[Vec<f32>], fresh_frames: usize) -> PlayerBlock {
    let channels = leftover.len().max(fresh.len());
    let mut out = Vec::with_capacity(channels);
    for c in 0..channels {
        let mut row = leftover.get(c).cloned().unwrap_or_default();
        match fresh.get(c) {
            Some(f) => row.extend_from_slice(&f[..fresh_frames]),
            None => row.resize(row.len() + fresh_frames, 0.0),
        }
        out.push(row);
    }
    out
}

/// Pushes `block` to `producer`, spin-waiting while the queue is full.
/// Returns `false` if `stop_flag` was raised before the push succeeded.
fn push_block(
    block: PlayerBlock,
    producer: &mut rtrb::Producer<QueueItem>,
    stop_flag: &AtomicBool,
) -> bool {
    while producer.push(QueueItem::Block(block.clone())).is_err() {
        if stop_flag.load(Ordering::Relaxed) {
            return false;
        }
        std::thread::sleep(Duration::from_micros(200));
    }
    true
}

/// Fills and pushes fixed-`block_size` blocks, carrying any partial-block
/// remainder across a source or loop-restart boundary (the `_leftover_audio`
/// mechanism the original player keeps around a playlist read) rather than
/// zero-padding mid-block — a block only ever ends short when the whole
/// playlist is exhausted under `LoopState::Single`.
fn prefetch_loop(
    mut sources: Vec<Box<dyn AudioSource>>,
    block_size: usize,
    loop_state: LoopState,
    producer: &mut rtrb::Producer<QueueItem>,
    stop_flag: &AtomicBool,
) {
    if sources.is_empty() {
        let _ = producer.push(QueueItem::End);
        return;
    }

    let mut index = 0;
    let mut leftover: PlayerBlock = Vec::new();
    loop {
        if stop_flag.load(Ordering::Relaxed) {
            return;
        }
        let leftover_len = leftover.first().map_or(0, |row| row.len());
        let needed = block_size - leftover_len;
        let src_channels = sources[index].channels().max(1);
        let mut temp: PlayerBlock = vec![vec![0.0; needed]; src_channels];
        let frames = sources[index].read_into(&mut temp);

        if frames == 0 {
            index += 1;
            if index >= sources.len() {
                match loop_state {
                    LoopState::Loop => {
                        for source in &mut sources {
                            source.reset();
                        }
                        index = 0;
                    }
                    LoopState::Single => {
                        if leftover_len > 0 {
                            let mut padded = leftover;
                            for row in &mut padded {
                                row.resize(block_size, 0.0);
                            }
                            if !push_block(padded, producer, stop_flag) {
                                return;
                            }
                        }
                        while producer.push(QueueItem::End).is_err() {
                            if stop_flag.load(Ordering::Relaxed) {
                                return;
                            }
                            std::thread::sleep(Duration::from_micros(200));
                        }
                        return;
                    }
                }
            }
            continue;
        }

        let combined = audio_concat(&leftover, &temp, frames);
        if combined.first().is_some_and(|row| row.len() == block_size) {
            if !push_block(combined, producer, stop_flag) {
                return;
            }
            leftover = Vec::new();
        } else {
            leftover = combined;
        }
    }
}
