//! Soft-mask reconstruction

use dmx_core::{NUM_CHANNELS, NUM_SOURCES};
use ndarray::{Array4, ArrayView2, ArrayView4, Axis, Zip, s};

use crate::{MlError, MlResult};

/// Regularizer for silent bins
///
/// Linear magnitudes of quiet bins sit near 1e-9, so anything larger than
/// the smallest normal float would bias their masks.
pub const MASK_EPSILON: f32 = f32::MIN_POSITIVE;

/// Per-bin source fractions, (bins, frames, channel, source)
///
/// `mask_s = estimate_s / (Σ estimate + ε)`. Silent bins give all-zero
/// masks.
#[derive(Debug, Clone)]
pub struct SoftMask {
    masks: Array4<f32>,
}

impl SoftMask {
    /// Build masks from linear (decompressed) estimates
    pub fn from_estimates(estimates: ArrayView4<'_, f32>) -> Self {
        let total = estimates.sum_axis(Axis(3));
        let mut masks = estimates.to_owned();
        for mut source in masks.axis_iter_mut(Axis(3)) {
            Zip::from(&mut source)
                .and(&total)
                .for_each(|m, &t| *m /= t + MASK_EPSILON);
        }
        Self { masks }
    }

    pub fn masks(&self) -> ArrayView4<'_, f32> {
        self.masks.view()
    }

    /// Scale the LINEAR mixture magnitude of each channel by every mask
    pub fn apply(&self, mixture: [ArrayView2<'_, f32>; NUM_CHANNELS]) -> MlResult<Array4<f32>> {
        let (bins, frames, _, _) = self.masks.dim();
        let mut sources = self.masks.clone();
        for (ch, magnitude) in mixture.iter().enumerate() {
            if magnitude.dim() != (bins, frames) {
                return Err(MlError::InvalidInputShape {
                    expected: format!("{:?}", (bins, frames)),
                    got: format!("{:?}", magnitude.dim()),
                });
            }
            for k in 0..NUM_SOURCES {
                let mut plane = sources.slice_mut(s![.., .., ch, k]);
                plane *= magnitude;
            }
        }
        Ok(sources)
    }
}
