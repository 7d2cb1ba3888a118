//! Overlap-add aggregation of windowed network estimates
//!
//! Windows of `width` frames advance by `stride` frames. Each prediction is
//! decompressed and added at its frame offset with weight
//! `w[k] · stride / Σ w`, so a fully overlapped frame accumulates one times
//! the estimate on average.

use dmx_core::{NUM_CHANNELS, NUM_SOURCES};
use dmx_dsp::decompress;
use ndarray::{Array4, ArrayView4, Axis, s};
use serde::{Deserialize, Serialize};

use crate::{MlError, MlResult};

/// Shape of the per-frame weights inside a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OverlapWeighting {
    /// Every frame weighted equally (1/7 for width 21, stride 3)
    #[default]
    Uniform,
    /// Periodic Hann taper (hann[k] / 3.5 for width 21, stride 3)
    Hann,
}

impl OverlapWeighting {
    /// Raw weights before normalization
    fn raw(self, width: usize) -> Vec<f32> {
        match self {
            OverlapWeighting::Uniform => vec![1.0; width],
            OverlapWeighting::Hann => (0..width)
                .map(|k| {
                    0.5 * (1.0 - (2.0 * std::f32::consts::PI * k as f32 / width as f32).cos())
                })
                .collect(),
        }
    }

    /// Normalized weights for `width` and `stride`
    pub fn weights(self, width: usize, stride: usize) -> Vec<f32> {
        let raw = self.raw(width);
        let sum: f32 = raw.iter().sum();
        if sum <= 0.0 {
            return vec![0.0; width];
        }
        let norm = stride as f32 / sum;
        raw.into_iter().map(|w| w * norm).collect()
    }
}

/// Frame offsets of every full window over `num_frames`
pub fn window_starts(num_frames: usize, width: usize, stride: usize) -> Vec<usize> {
    if width == 0 || stride == 0 || num_frames < width {
        return Vec::new();
    }
    (0..=num_frames - width).step_by(stride).collect()
}

/// Accumulates (bins, frames, channel, source) linear magnitude estimates
#[derive(Debug, Clone)]
pub struct OverlapAggregator {
    width: usize,
    weights: Vec<f32>,
    accumulator: Array4<f32>,
    next_start: usize,
    windows_added: usize,
}

impl OverlapAggregator {
    pub fn new(
        num_bins: usize,
        num_frames: usize,
        width: usize,
        stride: usize,
        weighting: OverlapWeighting,
    ) -> MlResult<Self> {
        if width == 0 || stride == 0 || stride > width {
            return Err(MlError::InvalidConfig(format!(
                "overlap needs 0 < stride <= width, got width {} stride {}",
                width, stride
            )));
        }
        Ok(Self {
            width,
            weights: weighting.weights(width, stride),
            accumulator: Array4::zeros((num_bins, num_frames, NUM_CHANNELS, NUM_SOURCES)),
            next_start: 0,
            windows_added: 0,
        })
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn windows_added(&self) -> usize {
        self.windows_added
    }

    /// Add one compressed prediction (bins, width, channel, source) at `start`
    ///
    /// Starts must be strictly increasing.
    pub fn add(&mut self, start: usize, prediction: ArrayView4<'_, f32>) -> MlResult<()> {
        let (bins, frames, _, _) = self.accumulator.dim();
        let expected = (bins, self.width, NUM_CHANNELS, NUM_SOURCES);
        if prediction.dim() != expected {
            return Err(MlError::InvalidOutputShape {
                expected: format!("{:?}", expected),
                got: format!("{:?}", prediction.dim()),
            });
        }
        if start < self.next_start || start + self.width > frames {
            return Err(MlError::InferenceFailed {
                reason: format!(
                    "window start {} out of order or range (next {}, {} frames)",
                    start, self.next_start, frames
                ),
            });
        }

        for (k, frame) in prediction.axis_iter(Axis(1)).enumerate() {
            let weight = self.weights[k];
            let mut target = self.accumulator.slice_mut(s![.., start + k, .., ..]);
            target.zip_mut_with(&frame, |acc, &p| *acc += weight * decompress(p));
        }

        self.next_start = start + 1;
        self.windows_added += 1;
        Ok(())
    }

    /// Accumulated linear estimates; uncovered edge frames stay zero
    pub fn finish(self) -> Array4<f32> {
        self.accumulator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use dmx_dsp::compress;

    #[test]
    fn test_normalization_constants() {
        let uniform = OverlapWeighting::Uniform.weights(21, 3);
        assert_abs_diff_eq!(uniform[0], 1.0 / 7.0, epsilon = 1e-6);

        let hann = OverlapWeighting::Hann.weights(21, 3);
        let raw = OverlapWeighting::Hann.raw(21);
        for (w, r) in hann.iter().zip(&raw) {
            assert_abs_diff_eq!(*w, r / 3.5, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_window_starts() {
        assert_eq!(window_starts(27, 21, 3), vec![0, 3, 6]);
        assert_eq!(window_starts(21, 21, 3), vec![0]);
        assert!(window_starts(20, 21, 3).is_empty());
    }

    #[test]
    fn test_full_overlap_recovers_estimate() {
        // Constant linear estimate of 2.0 everywhere
        let frames = 61;
        let mut agg = OverlapAggregator::new(3, frames, 21, 3, OverlapWeighting::Uniform).unwrap();
        let prediction = Array4::from_elem((3, 21, 2, 4), compress(2.0));
        for start in window_starts(frames, 21, 3) {
            agg.add(start, prediction.view()).unwrap();
        }
        let out = agg.finish();

        // Frames 18..=41 are covered by exactly 7 windows
        for t in 18..=41 {
            assert_abs_diff_eq!(out[[1, t, 0, 2]], 2.0, epsilon = 1e-4);
        }
        // Last window spans frames 39..60; frame 60 is never covered
        assert_eq!(window_starts(frames, 21, 3).last(), Some(&39));
        assert_eq!(out[[0, frames - 1, 1, 3]], 0.0);
        assert!(out[[0, frames - 2, 1, 3]] > 0.0);
    }

    #[test]
    fn test_hann_full_overlap_sums_to_one() {
        let weights = OverlapWeighting::Hann.weights(21, 3);
        for phase in 0..3 {
            let total: f32 = weights.iter().skip(phase).step_by(3).sum();
            assert_abs_diff_eq!(total, 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_rejects_out_of_order_and_bad_shape() {
        let mut agg = OverlapAggregator::new(2, 30, 21, 3, OverlapWeighting::Uniform).unwrap();
        let good = Array4::zeros((2, 21, 2, 4));
        agg.add(3, good.view()).unwrap();
        assert!(agg.add(3, good.view()).is_err());
        assert!(agg.add(0, good.view()).is_err());

        let bad = Array4::zeros((2, 20, 2, 4));
        assert!(matches!(
            agg.add(6, bad.view()),
            Err(MlError::InvalidOutputShape { .. })
        ));
    }
}
