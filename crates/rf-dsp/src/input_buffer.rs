//! Sliding-window input staging and forward FFT for overlap-save convolution.

use std::sync::Arc;

use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex32;

/// Holds the last `2b` samples of one channel and forward-FFTs them into a
/// `(b+1)`-wide spectrum each time a new `b`-sample block arrives.
///
/// This is the overlap-save staging buffer: the oldest `b` samples are
/// discarded, the new block is appended, and the whole `2b`-sample window is
/// transformed — the convolver then multiplies this spectrum against each
/// filter partition and keeps only the back half of each inverse transform
/// (the save, as opposed to overlap-add's extra summation).
pub struct InputBuffer {
    b: usize,
    history: Vec<f32>,
    spectrum: Vec<Complex32>,
    forward: Arc<dyn RealToComplex<f32>>,
}

impl InputBuffer {
    pub fn new(b: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(2 * b);
        Self {
            b,
            history: vec![0.0; 2 * b],
            spectrum: vec![Complex32::new(0.0, 0.0); b + 1],
            forward,
        }
    }

    pub fn b(&self) -> usize {
        self.b
    }

    /// Slides in one new block of exactly `b` samples and re-transforms the
    /// window. Returns the resulting `b+1`-wide spectrum.
    pub fn push_block(&mut self, block: &[f32]) -> &[Complex32] {
        debug_assert_eq!(block.len(), self.b);
        self.history.copy_within(self.b.., 0);
        self.history[self.b..].copy_from_slice(block);

        let mut windowed = self.history.clone();
        self.forward
            .process(&mut windowed, &mut self.spectrum)
            .expect("fixed-size rfft never fails");
        &self.spectrum
    }

    pub fn spectrum(&self) -> &[Complex32] {
        &self.spectrum
    }
}

/// Scratch buffers shared by `Convolver::process` for the inverse transform
/// and overlap-save tail extraction, sized once at construction per §4.3's
/// "all sizes are preallocated" requirement.
pub struct InverseScratch {
    b: usize,
    inverse: Arc<dyn ComplexToReal<f32>>,
    spectrum: Vec<Complex32>,
    time: Vec<f32>,
}

impl InverseScratch {
    pub fn new(b: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let inverse = planner.plan_fft_inverse(2 * b);
        Self {
            b,
            inverse,
            spectrum: vec![Complex32::new(0.0, 0.0); b + 1],
            time: vec![0.0; 2 * b],
        }
    }

    /// Inverse-transforms `accum` (a `b+1`-wide sum of partition products,
    /// consumed and left zeroed for reuse) and returns the back `b` samples
    /// — the overlap-save result — normalized by the FFT size.
    pub fn save_tail(&mut self, accum: &mut [Complex32]) -> &[f32] {
        debug_assert_eq!(accum.len(), self.b + 1);
        self.spectrum.copy_from_slice(accum);
        self.inverse
            .process(&mut self.spectrum, &mut self.time)
            .expect("fixed-size irfft never fails");
        let scale = 1.0 / (2 * self.b) as f32;
        for v in &mut self.time[self.b..] {
            *v *= scale;
        }
        for v in accum.iter_mut() {
            *v = Complex32::new(0.0, 0.0);
        }
        &self.time[self.b..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn push_block_shifts_history() {
        let b = 4;
        let mut buf = InputBuffer::new(b);
        buf.push_block(&[1.0, 2.0, 3.0, 4.0]);
        buf.push_block(&[5.0, 6.0, 7.0, 8.0]);
        assert_eq!(buf.history, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn identity_spectrum_round_trips_through_inverse_scratch() {
        let b = 8;
        let mut input = InputBuffer::new(b);
        let block: Vec<f32> = (0..b).map(|i| i as f32 * 0.1).collect();
        input.push_block(&vec![0.0; b]);
        let spectrum = input.push_block(&block).to_vec();

        let mut scratch = InverseScratch::new(b);
        let mut accum = spectrum.clone();
        let tail = scratch.save_tail(&mut accum);
        for (got, expected) in tail.iter().zip(block.iter()) {
            assert_relative_eq!(got, expected, epsilon = 1e-3);
        }
        assert!(accum.iter().all(|c| c.re == 0.0 && c.im == 0.0));
    }
}
