//! Partitioned frequency-domain convolution with click-free filter hot-swaps.
//!
//! One `Convolver` drives one mono input (one sound source) through `C`
//! parallel filter channels (DS/ER/LR/SD, say) whose outputs are summed into
//! a single stereo result — the per-source contribution that `SoundHandler`
//! mixes into the engine's output bus.

use std::sync::Arc;

use rustfft::num_complex::Complex32;

use crate::error::{DspError, DspResult};
use crate::filter::Filter;
use crate::input_buffer::InverseScratch;
use crate::windows;

/// Frequency-domain delay line: `max_partitions` slots of `(b+1)`-wide
/// spectra, one per past input block. Indexed by a logical rotating base —
/// "sliding" the line means moving `base`, never copying the stored spectra
/// (§9).
struct Fdl {
    b: usize,
    max_partitions: usize,
    slots: Vec<Complex32>,
    base: usize,
}

impl Fdl {
    fn new(b: usize, max_partitions: usize) -> Self {
        Self {
            b,
            max_partitions,
            slots: vec![Complex32::new(0.0, 0.0); max_partitions * (b + 1)],
            base: 0,
        }
    }

    /// Advances the line by one block, then writes `spectrum` into the
    /// newly-vacated delay-0 slot (advance-then-write, §9).
    fn push(&mut self, spectrum: &[Complex32]) {
        self.base = (self.base + self.max_partitions - 1) % self.max_partitions;
        let slot = self.slot_mut(0);
        slot.copy_from_slice(spectrum);
    }

    fn slot(&self, delay: usize) -> &[Complex32] {
        let idx = (self.base + delay) % self.max_partitions;
        &self.slots[idx * (self.b + 1)..(idx + 1) * (self.b + 1)]
    }

    fn slot_mut(&mut self, delay: usize) -> &mut [Complex32] {
        let idx = (self.base + delay) % self.max_partitions;
        &mut self.slots[idx * (self.b + 1)..(idx + 1) * (self.b + 1)]
    }
}

/// One of the `C` parallel filter channels feeding a convolver (for example
/// DS, ER, LR, SD for a single sound source).
type ChannelFilters = Vec<Arc<Filter>>;

/// Multi-channel partitioned convolver. `process` takes one new input
/// spectrum per block and returns the summed stereo time-domain output.
///
/// Filters are swapped atomically via `set_all_filters`: the outgoing set is
/// kept as `filters_previous` and both sets are processed for exactly one
/// block, their outputs blended with a cosine-square crossfade, which avoids
/// the click a hard filter swap would produce (§4.3).
pub struct Convolver {
    b: usize,
    num_channels: usize,
    max_partitions: usize,
    fdl: Fdl,
    filters_current: ChannelFilters,
    filters_previous: ChannelFilters,
    crossfading: bool,
    fade_in: Vec<f32>,
    fade_out: Vec<f32>,
    scratch: InverseScratch,
    accum_left: Vec<Complex32>,
    accum_right: Vec<Complex32>,
    prev_accum_left: Vec<Complex32>,
    prev_accum_right: Vec<Complex32>,
    out_left: Vec<f32>,
    out_right: Vec<f32>,
}

impl Convolver {
    /// `max_partitions` must be at least the partition count of the longest
    /// filter this convolver will ever be given.
    pub fn new(b: usize, num_channels: usize, max_partitions: usize) -> Self {
        let silent = Arc::new(Filter::silent(b));
        let (fade_in, fade_out) = windows::cosine_square_pair(b);
        Self {
            b,
            num_channels,
            max_partitions,
            fdl: Fdl::new(b, max_partitions.max(1)),
            filters_current: vec![silent.clone(); num_channels],
            filters_previous: vec![silent; num_channels],
            crossfading: false,
            fade_in,
            fade_out,
            scratch: InverseScratch::new(b),
            accum_left: vec![Complex32::new(0.0, 0.0); b + 1],
            accum_right: vec![Complex32::new(0.0, 0.0); b + 1],
            prev_accum_left: vec![Complex32::new(0.0, 0.0); b + 1],
            prev_accum_right: vec![Complex32::new(0.0, 0.0); b + 1],
            out_left: vec![0.0; b],
            out_right: vec![0.0; b],
        }
    }

    /// Replaces every channel's filter at once. The previously active set is
    /// retained for one more block so `process` can crossfade between them.
    pub fn set_all_filters(&mut self, new_filters: Vec<Arc<Filter>>) -> DspResult<()> {
        if new_filters.len() != self.num_channels {
            return Err(DspError::WrongFilterCount {
                expected: self.num_channels,
                got: new_filters.len(),
            });
        }
        for f in &new_filters {
            if !f.is_silent() && f.p > self.max_partitions {
                return Err(DspError::FilterShapeMismatch {
                    expected_p: self.max_partitions,
                    expected_b: self.b,
                    got_p: f.p,
                    got_b: f.b,
                });
            }
        }
        std::mem::swap(&mut self.filters_previous, &mut self.filters_current);
        self.filters_current = new_filters;
        self.crossfading = true;
        Ok(())
    }

    /// Feeds one new `(b+1)`-wide input spectrum through the line and
    /// returns the summed stereo output for this block as `(left, right)`.
    pub fn process(&mut self, input_spectrum: &[Complex32]) -> (&[f32], &[f32]) {
        self.fdl.push(input_spectrum);

        mac_channels(&self.fdl, &self.filters_current, &mut self.accum_left, &mut self.accum_right);

        if self.crossfading {
            mac_channels(
                &self.fdl,
                &self.filters_previous,
                &mut self.prev_accum_left,
                &mut self.prev_accum_right,
            );
            let current_left = self.scratch.save_tail(&mut self.accum_left).to_vec();
            let current_right = self.scratch.save_tail(&mut self.accum_right).to_vec();
            let previous_left = self.scratch.save_tail(&mut self.prev_accum_left).to_vec();
            let previous_right = self.scratch.save_tail(&mut self.prev_accum_right).to_vec();

            for k in 0..self.b {
                self.out_left[k] = current_left[k] * self.fade_in[k] + previous_left[k] * self.fade_out[k];
                self.out_right[k] = current_right[k] * self.fade_in[k] + previous_right[k] * self.fade_out[k];
            }
            self.crossfading = false;
        } else {
            let tail_left = self.scratch.save_tail(&mut self.accum_left);
            self.out_left.copy_from_slice(tail_left);
            let tail_right = self.scratch.save_tail(&mut self.accum_right);
            self.out_right.copy_from_slice(tail_right);
        }

        (&self.out_left, &self.out_right)
    }

    pub fn block_size(&self) -> usize {
        self.b
    }
}

/// Multiply-accumulates every channel's partitions against the matching FDL
/// delay slots into `accum_left`/`accum_right` (which must already be
/// zeroed, as `InverseScratch::save_tail` leaves them after consuming the
/// previous block's sum).
fn mac_channels(
    fdl: &Fdl,
    filters: &[Arc<Filter>],
    accum_left: &mut [Complex32],
    accum_right: &mut [Complex32],
) {
    for filter in filters {
        for part in 0..filter.p {
            let delayed = fdl.slot(part);
            let left_taps = filter.left_partition(part);
            let right_taps = filter.right_partition(part);
            for k in 0..delayed.len() {
                accum_left[k] += delayed[k] * left_taps[k];
                accum_right[k] += delayed[k] * right_taps[k];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FadeKind;
    use approx::assert_relative_eq;
    use realfft::RealFftPlanner;

    fn spectrum_of(block: &[f32], b: usize) -> Vec<Complex32> {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(2 * b);
        let mut padded = vec![0.0f32; 2 * b];
        padded[..b].copy_from_slice(block);
        let mut out = vec![Complex32::new(0.0, 0.0); b + 1];
        fft.process(&mut padded, &mut out).unwrap();
        out
    }

    #[test]
    fn silent_filters_produce_silent_output() {
        let b = 8;
        let mut conv = Convolver::new(b, 2, 4);
        let block = vec![1.0f32; b];
        let spectrum = spectrum_of(&block, b);
        let (left, right) = conv.process(&spectrum);
        assert!(left.iter().all(|&v| v.abs() < 1e-4));
        assert!(right.iter().all(|&v| v.abs() < 1e-4));
    }

    #[test]
    fn single_partition_identity_filter_passes_input_through_after_one_block_delay() {
        let b = 4;
        let mut conv = Convolver::new(b, 1, 2);
        let ir = vec![1.0f32, 0.0, 0.0, 0.0];
        let filter = Arc::new(Filter::from_time_domain(&ir, &ir, b, FadeKind::None));
        conv.set_all_filters(vec![filter]).unwrap();

        let silence = vec![0.0f32; b];
        let block_a = vec![1.0f32, 2.0, 3.0, 4.0];
        let block_b = vec![0.0f32; b];

        let _ = conv.process(&spectrum_of(&silence, b));
        let (left, _) = conv.process(&spectrum_of(&block_a, b));
        let first_block_out: Vec<f32> = left.to_vec();
        let (left2, _) = conv.process(&spectrum_of(&block_b, b));

        assert!(first_block_out.iter().all(|&v| v.abs() < 1e-3));
        for (got, expected) in left2.iter().zip(block_a.iter()) {
            assert_relative_eq!(got, expected, epsilon = 1e-3);
        }
    }

    #[test]
    fn wrong_filter_count_is_rejected() {
        let mut conv = Convolver::new(8, 2, 4);
        let err = conv.set_all_filters(vec![Arc::new(Filter::silent(8))]);
        assert!(matches!(err, Err(DspError::WrongFilterCount { expected: 2, got: 1 })));
    }

    #[test]
    fn oversized_filter_is_rejected() {
        let b = 4;
        let mut conv = Convolver::new(b, 1, 1);
        let ir = vec![1.0f32; 2 * b];
        let filter = Arc::new(Filter::from_time_domain(&ir, &ir, b, FadeKind::None));
        let err = conv.set_all_filters(vec![filter]);
        assert!(matches!(err, Err(DspError::FilterShapeMismatch { .. })));
    }

    #[test]
    fn filter_swap_crossfades_over_exactly_one_block() {
        let b = 8;
        let mut conv = Convolver::new(b, 1, 1);
        let silence = vec![0.0f32; b];
        let impulse = vec![1.0f32; b];
        let filter_a = Arc::new(Filter::from_time_domain(&impulse, &impulse, b, FadeKind::None));
        conv.set_all_filters(vec![filter_a]).unwrap();
        let _ = conv.process(&spectrum_of(&silence, b));
        let _ = conv.process(&spectrum_of(&impulse, b));

        let filter_b = Arc::new(Filter::silent(b));
        conv.set_all_filters(vec![filter_b]).unwrap();
        assert!(conv.crossfading);
        let _ = conv.process(&spectrum_of(&impulse, b));
        assert!(!conv.crossfading, "crossfade must resolve after exactly one block");
    }
}
