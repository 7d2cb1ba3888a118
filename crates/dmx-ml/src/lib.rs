//! dmx-ml: Stem separation for Demixer
//!
//! Runs a separation network over a full recording and rebuilds four stems:
//! - `SeparationModel` - network interface (closures or `OnnxModel`)
//! - `OverlapAggregator` - stride-3 overlap-add of windowed estimates
//! - `SoftMask` - ε-regularized source fractions applied to the mixture
//! - `Separator` - analysis, windowing, masking and resynthesis
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dmx_ml::{OnnxModel, SeparationConfig, Separator};
//!
//! let config = SeparationConfig::default();
//! let model = OnnxModel::load("models/demixer.onnx", [config.batch_size, 1025, 21, 2])?;
//! let mut separator = Separator::new(model, config)?;
//! separator.separate_file(Path::new("song.wav"), Path::new("out"))?;
//! ```

mod aggregate;
mod config;
mod error;
mod inference;
mod mask;
mod model;
mod separator;

pub use aggregate::{OverlapAggregator, OverlapWeighting, window_starts};
pub use config::SeparationConfig;
pub use error::{MlError, MlResult};
pub use inference::OnnxModel;
pub use mask::{MASK_EPSILON, SoftMask};
pub use model::SeparationModel;
pub use separator::{Separator, Stems, output_file_name};
