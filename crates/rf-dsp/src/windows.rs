//! Shared cosine-square windows.
//!
//! The same sin²/cos² ramp shape is used in two unrelated places: `Filter`
//! windows the first partition of a late-reverb IR in (fade-in) or the last
//! partition of an early-reflections IR out (fade-out), and `Convolver`
//! crossfades between a previous and current filter's output over one
//! block. Both are computed once per block size and shared rather than
//! recomputed per call.

/// `fade_in[k] = sin²(π/2 · k/(n-1))`, `fade_out[k] = cos²(π/2 · k/(n-1))`,
/// for `k` in `0..n`. For `n == 1` both windows degenerate to `[1.0]`.
pub fn cosine_square_pair(n: usize) -> (Vec<f32>, Vec<f32>) {
    if n <= 1 {
        return (vec![1.0; n], vec![1.0; n]);
    }
    let denom = (n - 1) as f32;
    let mut fade_in = Vec::with_capacity(n);
    let mut fade_out = Vec::with_capacity(n);
    for k in 0..n {
        let theta = std::f32::consts::FRAC_PI_2 * (k as f32 / denom);
        let s = theta.sin();
        let c = theta.cos();
        fade_in.push(s * s);
        fade_out.push(c * c);
    }
    (fade_in, fade_out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn endpoints_are_zero_and_one() {
        let (fade_in, fade_out) = cosine_square_pair(512);
        assert_relative_eq!(fade_in[0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(fade_in[511], 1.0, epsilon = 1e-6);
        assert_relative_eq!(fade_out[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(fade_out[511], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn windows_sum_to_one_everywhere() {
        let (fade_in, fade_out) = cosine_square_pair(256);
        for k in 0..256 {
            assert_relative_eq!(fade_in[k] + fade_out[k], 1.0, epsilon = 1e-5);
        }
    }
}
