//! Spectrogram codec (STFT analysis / ISTFT synthesis)
//!
//! Framing follows the conventions the separation network was trained with:
//! - periodic Hann window, W = 2048, H = 512
//! - W/2 zeros on both sides of the signal, then right padding to a whole
//!   number of hops, giving `ceil(N / H) + 1` frames
//! - spectra scaled by `1 / Σ window`
//! - magnitudes compressed as `log2(1 + |X|)` for network I/O
//!
//! Synthesis is weighted overlap-add normalized by `Σ window²`, so an
//! unmodified spectrum reconstructs its input.

use std::sync::Arc;

use dmx_core::{NUM_CHANNELS, StereoBuffer};
use ndarray::{Array2, ArrayView2, Zip};
use num_complex::Complex32;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{DspError, DspResult};

/// Overlap-add weights below this are treated as uncovered
const WINDOW_SUM_FLOOR: f32 = 1e-10;

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// STFT framing parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecConfig {
    /// FFT / window size in samples
    pub window_size: usize,
    /// Hop between frames in samples
    pub hop_size: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            window_size: 2048,
            hop_size: 512,
        }
    }
}

impl CodecConfig {
    pub fn validate(&self) -> DspResult<()> {
        if self.window_size == 0 || self.window_size % 2 != 0 {
            return Err(DspError::InvalidConfig(format!(
                "window size must be even and non-zero, got {}",
                self.window_size
            )));
        }
        if self.hop_size == 0 || self.hop_size > self.window_size {
            return Err(DspError::InvalidConfig(format!(
                "hop size must be in 1..={}, got {}",
                self.window_size, self.hop_size
            )));
        }
        Ok(())
    }

    /// Frequency bins per frame (`W/2 + 1`)
    pub fn num_bins(&self) -> usize {
        self.window_size / 2 + 1
    }

    /// Frames produced for a signal of `num_samples` samples
    pub fn num_frames(&self, num_samples: usize) -> usize {
        num_samples.div_ceil(self.hop_size) + 1
    }

    /// Samples spanned by `hops` hops
    pub fn samples_for_hops(&self, hops: usize) -> usize {
        self.hop_size * hops
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MAGNITUDE COMPRESSION
// ═══════════════════════════════════════════════════════════════════════════════

/// `log2(1 + x)`
#[inline]
pub fn compress(x: f32) -> f32 {
    x.ln_1p() / std::f32::consts::LN_2
}

/// `2^y - 1`, inverse of [`compress`]
#[inline]
pub fn decompress(y: f32) -> f32 {
    (y * std::f32::consts::LN_2).exp_m1()
}

// ═══════════════════════════════════════════════════════════════════════════════
// STEREO SPECTROGRAM
// ═══════════════════════════════════════════════════════════════════════════════

/// Analyzed stereo signal
///
/// Each array is (bins, frames). `magnitude` is compressed, `phase` is in
/// radians.
#[derive(Debug, Clone)]
pub struct StereoSpectrogram {
    pub magnitude: [Array2<f32>; NUM_CHANNELS],
    pub phase: [Array2<f32>; NUM_CHANNELS],
    /// Length in samples of the analyzed signal
    pub length: usize,
}

impl StereoSpectrogram {
    pub fn num_bins(&self) -> usize {
        self.magnitude[0].nrows()
    }

    pub fn num_frames(&self) -> usize {
        self.magnitude[0].ncols()
    }

    /// Decompressed magnitude of one channel
    pub fn linear_magnitude(&self, channel: usize) -> Array2<f32> {
        self.magnitude[channel].mapv(decompress)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CODEC
// ═══════════════════════════════════════════════════════════════════════════════

/// STFT/ISTFT pair shared by training and inference
///
/// Immutable after construction and safe to share across threads.
pub struct SpectrogramCodec {
    config: CodecConfig,
    window: Vec<f32>,
    window_sum: f32,
    fft_forward: Arc<dyn RealToComplex<f32>>,
    fft_inverse: Arc<dyn ComplexToReal<f32>>,
}

impl std::fmt::Debug for SpectrogramCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrogramCodec")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SpectrogramCodec {
    pub fn new(config: CodecConfig) -> DspResult<Self> {
        config.validate()?;

        let mut planner = RealFftPlanner::new();
        let fft_forward = planner.plan_fft_forward(config.window_size);
        let fft_inverse = planner.plan_fft_inverse(config.window_size);

        let window = Self::create_hann_window(config.window_size);
        let window_sum = window.iter().sum();

        Ok(Self {
            config,
            window,
            window_sum,
            fft_forward,
            fft_inverse,
        })
    }

    /// Periodic Hann window
    fn create_hann_window(size: usize) -> Vec<f32> {
        (0..size)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / size as f32).cos()))
            .collect()
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn num_bins(&self) -> usize {
        self.config.num_bins()
    }

    pub fn num_frames(&self, num_samples: usize) -> usize {
        self.config.num_frames(num_samples)
    }

    /// Complex spectrum (bins, frames) of one channel
    pub fn stft(&self, signal: &[f32]) -> DspResult<Array2<Complex32>> {
        let n_fft = self.config.window_size;
        let hop = self.config.hop_size;
        let pad = n_fft / 2;
        let n_bins = self.num_bins();
        let n_frames = self.num_frames(signal.len());

        let padded_len = (n_frames - 1) * hop + n_fft;
        let mut padded = vec![0.0f32; padded_len];
        padded[pad..pad + signal.len()].copy_from_slice(signal);

        let scale = 1.0 / self.window_sum;
        let mut spectrum = Array2::<Complex32>::zeros((n_bins, n_frames));
        let mut input_buffer = vec![0.0f32; n_fft];
        let mut output_buffer = vec![Complex32::new(0.0, 0.0); n_bins];
        let mut scratch = vec![Complex32::new(0.0, 0.0); self.fft_forward.get_scratch_len()];

        for frame_idx in 0..n_frames {
            let start = frame_idx * hop;
            for (i, &sample) in padded[start..start + n_fft].iter().enumerate() {
                input_buffer[i] = sample * self.window[i];
            }

            self.fft_forward
                .process_with_scratch(&mut input_buffer, &mut output_buffer, &mut scratch)
                .map_err(|e| DspError::Fft(e.to_string()))?;

            for (bin, &val) in output_buffer.iter().enumerate() {
                spectrum[[bin, frame_idx]] = val * scale;
            }
        }

        Ok(spectrum)
    }

    /// Inverse of [`SpectrogramCodec::stft`], trimmed to `length` samples
    pub fn istft(&self, spectrum: ArrayView2<'_, Complex32>, length: usize) -> DspResult<Vec<f32>> {
        let n_fft = self.config.window_size;
        let hop = self.config.hop_size;
        let pad = n_fft / 2;
        let n_bins = self.num_bins();

        if spectrum.nrows() != n_bins {
            return Err(DspError::ShapeMismatch {
                expected: format!("{} bins", n_bins),
                got: format!("{} bins", spectrum.nrows()),
            });
        }
        let n_frames = spectrum.ncols();
        if n_frames == 0 {
            return Ok(vec![0.0; length]);
        }

        let total_len = (n_frames - 1) * hop + n_fft;
        let mut output = vec![0.0f32; total_len];
        let mut window_acc = vec![0.0f32; total_len];

        // Undo spectrum scaling and the unnormalized inverse FFT in one factor
        let norm = self.window_sum / n_fft as f32;

        let mut input_buffer = vec![Complex32::new(0.0, 0.0); n_bins];
        let mut output_buffer = vec![0.0f32; n_fft];
        let mut scratch = vec![Complex32::new(0.0, 0.0); self.fft_inverse.get_scratch_len()];

        for frame_idx in 0..n_frames {
            for (bin, value) in input_buffer.iter_mut().enumerate() {
                *value = spectrum[[bin, frame_idx]];
            }
            // DC and Nyquist must be real for a real-valued inverse
            input_buffer[0].im = 0.0;
            input_buffer[n_bins - 1].im = 0.0;

            self.fft_inverse
                .process_with_scratch(&mut input_buffer, &mut output_buffer, &mut scratch)
                .map_err(|e| DspError::Fft(e.to_string()))?;

            let start = frame_idx * hop;
            for (i, &sample) in output_buffer.iter().enumerate() {
                let w = self.window[i];
                output[start + i] += sample * norm * w;
                window_acc[start + i] += w * w;
            }
        }

        for (sample, &acc) in output.iter_mut().zip(&window_acc) {
            if acc > WINDOW_SUM_FLOOR {
                *sample /= acc;
            }
        }

        let mut signal = vec![0.0f32; length];
        let available = total_len.saturating_sub(pad).min(length);
        signal[..available].copy_from_slice(&output[pad..pad + available]);
        Ok(signal)
    }

    /// Analyze both channels into compressed magnitude and phase
    pub fn analyze(&self, audio: &StereoBuffer) -> DspResult<StereoSpectrogram> {
        let left = self.stft(audio.left())?;
        let right = self.stft(audio.right())?;

        let magnitude = [
            left.mapv(|c| compress(c.norm())),
            right.mapv(|c| compress(c.norm())),
        ];
        let phase = [left.mapv(|c| c.arg()), right.mapv(|c| c.arg())];

        Ok(StereoSpectrogram {
            magnitude,
            phase,
            length: audio.len(),
        })
    }

    /// Resynthesize stereo audio from LINEAR magnitude and phase
    pub fn synthesize(
        &self,
        magnitude: [ArrayView2<'_, f32>; NUM_CHANNELS],
        phase: [ArrayView2<'_, f32>; NUM_CHANNELS],
        length: usize,
    ) -> DspResult<StereoBuffer> {
        let mut channels: [Vec<f32>; NUM_CHANNELS] = Default::default();

        for (ch, out) in channels.iter_mut().enumerate() {
            if magnitude[ch].dim() != phase[ch].dim() {
                return Err(DspError::ShapeMismatch {
                    expected: format!("{:?}", magnitude[ch].dim()),
                    got: format!("{:?}", phase[ch].dim()),
                });
            }
            let spectrum = Zip::from(&magnitude[ch])
                .and(&phase[ch])
                .map_collect(|&m, &p| Complex32::from_polar(m, p));
            *out = self.istft(spectrum.view(), length)?;
        }

        let [left, right] = channels;
        Ok(StereoBuffer::from_channels(left, right))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn codec() -> SpectrogramCodec {
        SpectrogramCodec::new(CodecConfig::default()).unwrap()
    }

    fn test_signal(len: usize) -> StereoBuffer {
        let left: Vec<f32> = (0..len)
            .map(|i| {
                let t = i as f32 / 44100.0;
                0.5 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
                    + 0.2 * (2.0 * std::f32::consts::PI * 3000.0 * t).sin()
            })
            .collect();
        let right: Vec<f32> = (0..len)
            .map(|i| 0.3 * ((i * 7919 % 1000) as f32 / 500.0 - 1.0))
            .collect();
        StereoBuffer::from_channels(left, right)
    }

    #[test]
    fn test_frame_count() {
        let config = CodecConfig::default();
        assert_eq!(config.num_bins(), 1025);
        assert_eq!(config.num_frames(10240), 21);
        assert_eq!(config.num_frames(10241), 22);
        assert_eq!(config.num_frames(0), 1);
    }

    #[test]
    fn test_invalid_config() {
        let odd = CodecConfig {
            window_size: 2047,
            hop_size: 512,
        };
        assert!(matches!(odd.validate(), Err(DspError::InvalidConfig(_))));

        let wide_hop = CodecConfig {
            window_size: 1024,
            hop_size: 2048,
        };
        assert!(SpectrogramCodec::new(wide_hop).is_err());
    }

    #[test]
    fn test_compress_inverse() {
        for x in [0.0f32, 1e-6, 0.25, 1.0, 37.5] {
            assert_abs_diff_eq!(decompress(compress(x)), x, epsilon = 1e-5 * (1.0 + x));
        }
        assert_abs_diff_eq!(compress(1.0), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_analyze_shape() {
        let spectrum = codec().analyze(&test_signal(10240)).unwrap();
        assert_eq!(spectrum.magnitude[0].dim(), (1025, 21));
        assert_eq!(spectrum.phase[1].dim(), (1025, 21));
        assert_eq!(spectrum.length, 10240);
    }

    #[test]
    fn test_roundtrip_reconstruction() {
        let codec = codec();
        let audio = test_signal(20000);
        let spectrum = codec.analyze(&audio).unwrap();

        let magnitude = [spectrum.linear_magnitude(0), spectrum.linear_magnitude(1)];
        let out = codec
            .synthesize(
                [magnitude[0].view(), magnitude[1].view()],
                [spectrum.phase[0].view(), spectrum.phase[1].view()],
                spectrum.length,
            )
            .unwrap();

        assert_eq!(out.len(), audio.len());
        let hop = codec.config().hop_size;
        for ch in 0..2 {
            for i in hop..audio.len() - hop {
                assert_abs_diff_eq!(out.channel(ch)[i], audio.channel(ch)[i], epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn test_spectrum_scaling() {
        // A full-scale DC signal lands in bin 0 with magnitude ~1
        let codec = codec();
        let spectrum = codec.stft(&vec![1.0f32; 8192]).unwrap();
        assert_abs_diff_eq!(spectrum[[0, 8]].norm(), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_istft_rejects_wrong_bins() {
        let codec = codec();
        let bad = Array2::<Complex32>::zeros((100, 4));
        assert!(matches!(
            codec.istft(bad.view(), 1000),
            Err(DspError::ShapeMismatch { .. })
        ));
    }
}
