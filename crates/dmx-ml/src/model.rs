//! Separation network interface

use ndarray::{Array4, Array5};

use crate::MlResult;

/// A network mapping mixture windows to per-source estimates
///
/// Input is (batch, bins, frames, channel) compressed magnitude, output is
/// (batch, bins, frames, channel, source) compressed magnitude with sources
/// in bass, drums, other, vocals order.
pub trait SeparationModel {
    fn predict(&mut self, inputs: &Array4<f32>) -> MlResult<Array5<f32>>;
}

impl<F> SeparationModel for F
where
    F: FnMut(&Array4<f32>) -> MlResult<Array5<f32>>,
{
    fn predict(&mut self, inputs: &Array4<f32>) -> MlResult<Array5<f32>> {
        self(inputs)
    }
}
