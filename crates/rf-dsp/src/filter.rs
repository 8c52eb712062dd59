//! A single impulse response, stored partitioned in the frequency domain.

use realfft::RealFftPlanner;
use rustfft::num_complex::Complex32;

use crate::windows;

/// Which end of the IR, if any, gets a cosine-square amplitude taper before
/// the forward FFT. Late reverb fades in (avoids a click where the direct
/// sound's tail is truncated into the first LR partition); early reflections
/// fade out (avoids a hard edge where ER hands off to LR).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeKind {
    None,
    FadeInFirstPartition,
    FadeOutLastPartition,
}

/// A partitioned, frequency-domain impulse response: two (P, B+1) complex
/// arrays (`left`, `right`), flattened partition-major. For directivity and
/// headphone filters `left` and `right` are constructed from the same
/// time-domain samples and are therefore identical.
///
/// `p == 0` is the silent default: an empty filter that contributes nothing
/// when multiply-accumulated into a convolver's result.
#[derive(Debug, Clone)]
pub struct Filter {
    /// Number of partitions.
    pub p: usize,
    /// Partition size in samples; equals the engine block size.
    pub b: usize,
    /// Flattened (P, B+1) complex spectrum, partition-major.
    pub left: Vec<Complex32>,
    pub right: Vec<Complex32>,
}

impl Filter {
    /// The silent default filter for a given block size: zero partitions,
    /// contributes nothing to a convolver sum.
    pub fn silent(b: usize) -> Self {
        Self {
            p: 0,
            b,
            left: Vec::new(),
            right: Vec::new(),
        }
    }

    pub fn is_silent(&self) -> bool {
        self.p == 0
    }

    /// Returns one (B+1)-wide partition's spectrum.
    pub fn left_partition(&self, idx: usize) -> &[Complex32] {
        &self.left[idx * (self.b + 1)..(idx + 1) * (self.b + 1)]
    }

    pub fn right_partition(&self, idx: usize) -> &[Complex32] {
        &self.right[idx * (self.b + 1)..(idx + 1) * (self.b + 1)]
    }

    /// Builds a filter from interleaved-by-channel time-domain IRs whose
    /// length is already an exact multiple of `b` (callers — `FilterStorage`
    /// — are responsible for the pad/truncate normalization in §4.1).
    ///
    /// Each `b`-sample partition is zero-padded to `2b` and real-FFT'd into
    /// `b+1` complex bins, matching the overlap-save convention the
    /// convolver expects.
    pub fn from_time_domain(
        left_td: &[f32],
        right_td: &[f32],
        b: usize,
        fade: FadeKind,
    ) -> Self {
        assert_eq!(left_td.len(), right_td.len());
        assert_eq!(left_td.len() % b, 0, "IR length must be a multiple of b");
        if left_td.is_empty() {
            return Self::silent(b);
        }
        let p = left_td.len() / b;
        let (fade_in, fade_out) = windows::cosine_square_pair(b);

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(2 * b);

        let mut left = Vec::with_capacity(p * (b + 1));
        let mut right = Vec::with_capacity(p * (b + 1));

        for part in 0..p {
            let window = match (fade, part) {
                (FadeKind::FadeInFirstPartition, 0) => Some(&fade_in),
                (FadeKind::FadeOutLastPartition, last) if last == p - 1 => Some(&fade_out),
                _ => None,
            };

            for (td, out) in [(left_td, &mut left), (right_td, &mut right)] {
                let segment = &td[part * b..(part + 1) * b];
                let mut padded = vec![0.0f32; 2 * b];
                padded[..b].copy_from_slice(segment);
                if let Some(w) = window {
                    for (sample, gain) in padded[..b].iter_mut().zip(w.iter()) {
                        *sample *= gain;
                    }
                }
                let mut spectrum = vec![Complex32::new(0.0, 0.0); b + 1];
                fft.process(&mut padded, &mut spectrum)
                    .expect("fixed-size rfft never fails");
                out.extend(spectrum);
            }
        }

        Self { p, b, left, right }
    }

    /// Builds a mono filter (directivity/headphone): `left` and `right` are
    /// computed from the same samples and are therefore identical.
    pub fn from_mono_time_domain(ir: &[f32], b: usize, fade: FadeKind) -> Self {
        Self::from_time_domain(ir, ir, b, fade)
    }

    /// Splits a stereo filter into two single-ear filters with the opposite
    /// ear's taps zeroed: `(left_only, right_only)`. Used to apply a
    /// post-sum stage (SD, HP) to each ear's signal independently without
    /// cross-talk, by running each half through its own single-channel
    /// convolver fed by that ear's own input history.
    pub fn split_ear_channels(&self) -> (Self, Self) {
        let zeros = vec![Complex32::new(0.0, 0.0); self.left.len()];
        let left_only = Self {
            p: self.p,
            b: self.b,
            left: self.left.clone(),
            right: zeros.clone(),
        };
        let right_only = Self {
            p: self.p,
            b: self.b,
            left: zeros,
            right: self.right.clone(),
        };
        (left_only, right_only)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use realfft::RealFftPlanner;

    #[test]
    fn silent_filter_has_no_partitions() {
        let f = Filter::silent(256);
        assert!(f.is_silent());
        assert_eq!(f.p, 0);
    }

    #[test]
    fn round_trip_recovers_zero_padded_ir() {
        let b = 8;
        let ir_left: Vec<f32> = (0..2 * b).map(|i| (i as f32) * 0.01).collect();
        let ir_right: Vec<f32> = (0..2 * b).map(|i| -(i as f32) * 0.02).collect();
        let filter = Filter::from_time_domain(&ir_left, &ir_right, b, FadeKind::None);
        assert_eq!(filter.p, 2);

        let mut planner = RealFftPlanner::<f32>::new();
        let ifft = planner.plan_fft_inverse(2 * b);
        for part in 0..filter.p {
            let mut spectrum = filter.left_partition(part).to_vec();
            let mut time = vec![0.0f32; 2 * b];
            ifft.process(&mut spectrum, &mut time).unwrap();
            for v in &mut time {
                *v /= (2 * b) as f32;
            }
            let expected = &ir_left[part * b..(part + 1) * b];
            for k in 0..b {
                assert_relative_eq!(time[k], expected[k], epsilon = 1e-3);
            }
            for v in &time[b..] {
                assert_relative_eq!(*v, 0.0, epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn split_ear_channels_zeroes_the_opposite_ear() {
        let b = 8;
        let ir_left = vec![1.0f32; b];
        let ir_right = vec![2.0f32; b];
        let filter = Filter::from_time_domain(&ir_left, &ir_right, b, FadeKind::None);
        let (left_only, right_only) = filter.split_ear_channels();
        assert!(right_only.left.iter().all(|c| c.re == 0.0 && c.im == 0.0));
        assert!(left_only.right.iter().all(|c| c.re == 0.0 && c.im == 0.0));
        assert_eq!(left_only.left, filter.left);
        assert_eq!(right_only.right, filter.right);
    }

    #[test]
    fn fade_in_zeroes_first_sample_of_first_partition() {
        let b = 64;
        let ir: Vec<f32> = vec![1.0; b];
        let filter = Filter::from_mono_time_domain(&ir, b, FadeKind::FadeInFirstPartition);
        let mut planner = RealFftPlanner::<f32>::new();
        let ifft = planner.plan_fft_inverse(2 * b);
        let mut spectrum = filter.left_partition(0).to_vec();
        let mut time = vec![0.0f32; 2 * b];
        ifft.process(&mut spectrum, &mut time).unwrap();
        assert_relative_eq!(time[0] / (2 * b) as f32, 0.0, epsilon = 1e-3);
    }
}
