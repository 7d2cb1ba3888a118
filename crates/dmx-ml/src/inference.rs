//! ONNX separation model (tract, pure Rust)

use std::path::{Path, PathBuf};

use ndarray::{Array4, Array5, Ix5};
use tract_onnx::prelude::*;

use crate::{MlError, MlResult, SeparationModel};

type TractPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX export of the separation network
///
/// The input fact is pinned to (batch, bins, frames, 2). Short batches are
/// zero-padded to the pinned size and the padding is cut from the output.
pub struct OnnxModel {
    plan: TractPlan,
    path: PathBuf,
    input_shape: [usize; 4],
}

impl std::fmt::Debug for OnnxModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxModel")
            .field("path", &self.path)
            .field("input_shape", &self.input_shape)
            .finish_non_exhaustive()
    }
}

impl OnnxModel {
    /// Load and optimize the model at `path`
    pub fn load<P: AsRef<Path>>(path: P, input_shape: [usize; 4]) -> MlResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MlError::ModelNotFound {
                path: path.display().to_string(),
            });
        }

        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(|e| MlError::ModelLoadFailed {
                reason: e.to_string(),
            })?
            .with_input_fact(0, f32::fact(input_shape).into())
            .map_err(|e| MlError::TractError(e.to_string()))?
            .into_optimized()
            .map_err(|e| MlError::TractError(e.to_string()))?
            .into_runnable()
            .map_err(|e| MlError::TractError(e.to_string()))?;

        log::info!(
            "Loaded separation model {} (input {:?})",
            path.display(),
            input_shape
        );

        Ok(Self {
            plan,
            path: path.to_path_buf(),
            input_shape,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn batch_size(&self) -> usize {
        self.input_shape[0]
    }
}

impl SeparationModel for OnnxModel {
    fn predict(&mut self, inputs: &Array4<f32>) -> MlResult<Array5<f32>> {
        let (n, bins, frames, channels) = inputs.dim();
        let [batch, want_bins, want_frames, want_channels] = self.input_shape;
        if n > batch || (bins, frames, channels) != (want_bins, want_frames, want_channels) {
            return Err(MlError::InvalidInputShape {
                expected: format!("(<={}, {}, {}, {})", batch, want_bins, want_frames, want_channels),
                got: format!("{:?}", inputs.dim()),
            });
        }

        // Copy through plain slices so the tensor crate's ndarray version does not matter
        let mut data: Vec<f32> = inputs.iter().copied().collect();
        data.resize(batch * bins * frames * channels, 0.0);
        let tensor = Tensor::from_shape(&self.input_shape, &data)
            .map_err(|e| MlError::TractError(e.to_string()))?;

        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| MlError::InferenceFailed {
                reason: e.to_string(),
            })?;
        let output = outputs.first().ok_or_else(|| MlError::InferenceFailed {
            reason: "model produced no outputs".into(),
        })?;

        let shape = output.shape().to_vec();
        let values = output
            .as_slice::<f32>()
            .map_err(|e| MlError::TractError(e.to_string()))?;
        let full = ndarray::ArrayD::from_shape_vec(shape.clone(), values.to_vec())
            .map_err(|e| MlError::TractError(e.to_string()))?
            .into_dimensionality::<Ix5>()
            .map_err(|_| MlError::InvalidOutputShape {
                expected: "5-D tensor".into(),
                got: format!("{:?}", shape),
            })?;

        if full.dim().0 < n {
            return Err(MlError::InvalidOutputShape {
                expected: format!("batch of at least {}", n),
                got: format!("{:?}", shape),
            });
        }
        Ok(full.slice_move(ndarray::s![..n, .., .., .., ..]))
    }
}
