//! Phase vocoder time stretching
//!
//! ## Algorithm
//!
//! - STFT analysis at a fractional hop `Hs / factor`
//! - per-bin instantaneous frequency from the wrapped phase deviation
//! - phase accumulation at the fixed synthesis hop `Hs`
//! - ISTFT overlap-add normalized by the accumulated squared window
//!
//! The synthesis hop is fixed, so output coverage does not depend on the
//! stretch factor. Output length is `round(len × factor)`.

use std::f64::consts::PI;

use rustfft::FftPlanner;
use rustfft::num_complex::Complex;

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Default FFT size for good quality/latency tradeoff
pub const DEFAULT_FFT_SIZE: usize = 2048;

/// Overlap factor (75% overlap = hop_size = fft_size / 4)
const OVERLAP_FACTOR: usize = 4;

/// Accepted stretch range
const MIN_FACTOR: f64 = 0.25;
const MAX_FACTOR: f64 = 4.0;

// ═══════════════════════════════════════════════════════════════════════════════
// PHASE VOCODER
// ═══════════════════════════════════════════════════════════════════════════════

/// Phase vocoder for time stretching
///
/// ```ignore
/// let mut vocoder = PhaseVocoder::new(2048);
/// // 1.5x longer, same pitch
/// let stretched = vocoder.stretch(&samples, 1.5);
/// ```
pub struct PhaseVocoder {
    fft_size: usize,
    hop_s: usize,
    window: Vec<f64>,
    fft_planner: FftPlanner<f64>,
}

impl std::fmt::Debug for PhaseVocoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseVocoder")
            .field("fft_size", &self.fft_size)
            .field("hop_s", &self.hop_s)
            .finish_non_exhaustive()
    }
}

impl Default for PhaseVocoder {
    fn default() -> Self {
        Self::new(DEFAULT_FFT_SIZE)
    }
}

impl PhaseVocoder {
    /// `fft_size` is rounded up to a multiple of the overlap factor
    pub fn new(fft_size: usize) -> Self {
        let fft_size = fft_size.max(OVERLAP_FACTOR).next_multiple_of(OVERLAP_FACTOR);
        Self {
            fft_size,
            hop_s: fft_size / OVERLAP_FACTOR,
            window: Self::create_hann_window(fft_size),
            fft_planner: FftPlanner::new(),
        }
    }

    /// Periodic Hann window
    fn create_hann_window(size: usize) -> Vec<f64> {
        (0..size)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / size as f64).cos()))
            .collect()
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Stretch a mono signal by `factor` (> 1 lengthens, < 1 shortens)
    ///
    /// The factor is clamped to [0.25, 4]. Inputs shorter than one FFT
    /// frame fall back to linear resampling.
    pub fn stretch(&mut self, input: &[f32], factor: f64) -> Vec<f32> {
        let factor = if factor.is_finite() && factor > 0.0 {
            factor.clamp(MIN_FACTOR, MAX_FACTOR)
        } else {
            1.0
        };
        let output_len = (input.len() as f64 * factor).round() as usize;

        if input.len() < self.fft_size {
            log::debug!(
                "Input of {} samples shorter than FFT size {}, resampling instead",
                input.len(),
                self.fft_size
            );
            return resample_linear(input, output_len);
        }

        let n = self.fft_size;
        let half = n / 2;
        let num_bins = half + 1;
        let hop_s = self.hop_s;
        let hop_a = hop_s as f64 / factor;

        // Centered frames: both signals are offset by half a window
        let num_frames = output_len.div_ceil(hop_s) + 1;
        let padded_out_len = (num_frames - 1) * hop_s + n;
        let last_in_start = ((num_frames - 1) as f64 * hop_a).round() as usize;
        let padded_in_len = (last_in_start + n).max(input.len() + n);

        let mut padded_in = vec![0.0f64; padded_in_len];
        for (dst, &src) in padded_in[half..].iter_mut().zip(input) {
            *dst = src as f64;
        }

        let mut output = vec![0.0f64; padded_out_len];
        let mut window_acc = vec![0.0f64; padded_out_len];

        let fft = self.fft_planner.plan_fft_forward(n);
        let ifft = self.fft_planner.plan_fft_inverse(n);

        let mut frame = vec![Complex::new(0.0, 0.0); n];
        let mut prev_phase = vec![0.0f64; num_bins];
        let mut phase_acc = vec![0.0f64; num_bins];
        let mut prev_in_start = 0usize;

        for frame_idx in 0..num_frames {
            let in_start = (frame_idx as f64 * hop_a).round() as usize;
            let out_start = frame_idx * hop_s;

            // === ANALYSIS ===
            for (i, bin) in frame.iter_mut().enumerate() {
                *bin = Complex::new(padded_in[in_start + i] * self.window[i], 0.0);
            }
            fft.process(&mut frame);

            // === PHASE PROPAGATION ===
            let actual_hop = (in_start - prev_in_start) as f64;
            for bin in 0..num_bins {
                let phase = frame[bin].arg();
                let omega = 2.0 * PI * bin as f64 / n as f64;

                if frame_idx == 0 || actual_hop == 0.0 {
                    phase_acc[bin] = phase;
                } else {
                    let deviation = wrap_phase(phase - prev_phase[bin] - omega * actual_hop);
                    let inst_freq = omega + deviation / actual_hop;
                    phase_acc[bin] = wrap_phase(phase_acc[bin] + inst_freq * hop_s as f64);
                }
                prev_phase[bin] = phase;

                let magnitude = frame[bin].norm();
                frame[bin] = Complex::from_polar(magnitude, phase_acc[bin]);
            }
            // Mirror negative frequencies (conjugate symmetry)
            for bin in 1..half {
                frame[n - bin] = frame[bin].conj();
            }
            frame[0].im = 0.0;
            frame[half].im = 0.0;
            prev_in_start = in_start;

            // === SYNTHESIS ===
            ifft.process(&mut frame);
            for i in 0..n {
                let w = self.window[i];
                output[out_start + i] += frame[i].re * w / n as f64;
                window_acc[out_start + i] += w * w;
            }
        }

        output
            .iter()
            .zip(&window_acc)
            .skip(half)
            .take(output_len)
            .map(|(&s, &acc)| if acc > 1e-10 { (s / acc) as f32 } else { 0.0 })
            .collect()
    }

    /// Stretch both channels of a stereo pair independently
    pub fn stretch_stereo(&mut self, left: &[f32], right: &[f32], factor: f64) -> (Vec<f32>, Vec<f32>) {
        (self.stretch(left, factor), self.stretch(right, factor))
    }
}

/// Wrap phase to [-π, π]
#[inline]
fn wrap_phase(phase: f64) -> f64 {
    phase - 2.0 * PI * (phase / (2.0 * PI)).round()
}

/// Linear-interpolation resampling to exactly `output_len` samples
///
/// Endpoints are aligned: the first output sample is the first input
/// sample and positions advance by `len / output_len`.
pub fn resample_linear(input: &[f32], output_len: usize) -> Vec<f32> {
    if output_len == 0 || input.is_empty() {
        return vec![0.0; output_len];
    }

    let step = input.len() as f64 / output_len as f64;
    (0..output_len)
        .map(|i| {
            let src_pos = i as f64 * step;
            let src_idx = src_pos as usize;
            let frac = (src_pos - src_idx as f64) as f32;

            if src_idx + 1 < input.len() {
                input[src_idx] * (1.0 - frac) + input[src_idx + 1] * frac
            } else {
                input[input.len() - 1]
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn generate_sine(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / 44100.0).sin() * 0.5)
            .collect()
    }

    fn zero_crossings(signal: &[f32]) -> usize {
        signal
            .windows(2)
            .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
            .count()
    }

    #[test]
    fn test_output_length() {
        let mut vocoder = PhaseVocoder::default();
        let input = generate_sine(440.0, 44100);
        for factor in [0.5, 0.75, 1.0, 1.333, 1.5, 2.0] {
            let out = vocoder.stretch(&input, factor);
            assert_eq!(out.len(), (44100.0 * factor).round() as usize);
        }
    }

    #[test]
    fn test_unity_factor_reconstructs() {
        let mut vocoder = PhaseVocoder::default();
        let input = generate_sine(440.0, 16384);
        let out = vocoder.stretch(&input, 1.0);
        for i in 0..input.len() {
            assert_abs_diff_eq!(out[i], input[i], epsilon = 1e-3);
        }
    }

    #[test]
    fn test_pitch_preserved() {
        let mut vocoder = PhaseVocoder::default();
        let input = generate_sine(440.0, 44100);
        let out = vocoder.stretch(&input, 1.5);

        // Same frequency means crossings scale with duration
        let rate_in = zero_crossings(&input) as f32 / input.len() as f32;
        let rate_out = zero_crossings(&out[2048..out.len() - 2048]) as f32 / (out.len() - 4096) as f32;
        assert!((rate_in - rate_out).abs() / rate_in < 0.05);
    }

    #[test]
    fn test_short_input_resamples() {
        let mut vocoder = PhaseVocoder::default();
        let out = vocoder.stretch(&[0.0, 1.0, 0.0, -1.0], 2.0);
        assert_eq!(out.len(), 8);
        assert!(vocoder.stretch(&[], 1.5).is_empty());
    }

    #[test]
    fn test_resample_linear() {
        let out = resample_linear(&[0.0, 1.0, 2.0, 3.0], 8);
        assert_eq!(out.len(), 8);
        assert_abs_diff_eq!(out[1], 0.5);
        assert_abs_diff_eq!(out[7], 3.0);
        assert_eq!(resample_linear(&[1.0, 2.0], 0).len(), 0);
    }

    #[test]
    fn test_wrap_phase() {
        assert_abs_diff_eq!(wrap_phase(3.0 * PI), PI, epsilon = 1e-9);
        assert_abs_diff_eq!(wrap_phase(-0.5), -0.5);
    }
}
