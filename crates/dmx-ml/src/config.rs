//! Separation configuration

use std::path::Path;

use dmx_dsp::CodecConfig;
use dmx_file::WavEncoding;
use serde::{Deserialize, Serialize};

use crate::{MlError, MlResult, OverlapWeighting};

/// Inference parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparationConfig {
    /// Context frames before the center frame
    pub frames_past: usize,
    /// Context frames after the center frame
    pub frames_future: usize,
    /// Frames between consecutive windows
    pub stride: usize,
    /// Windows per model call
    pub batch_size: usize,
    pub weighting: OverlapWeighting,
    pub codec: CodecConfig,
    /// Sample format of written stems
    #[serde(skip, default = "default_encoding")]
    pub output_encoding: WavEncoding,
}

fn default_encoding() -> WavEncoding {
    WavEncoding::Float32
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            frames_past: 10,
            frames_future: 10,
            stride: 3,
            batch_size: 16,
            weighting: OverlapWeighting::Uniform,
            codec: CodecConfig::default(),
            output_encoding: default_encoding(),
        }
    }
}

impl SeparationConfig {
    /// Hann-weighted overlap-add
    pub fn smooth() -> Self {
        Self {
            weighting: OverlapWeighting::Hann,
            ..Default::default()
        }
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_weighting(mut self, weighting: OverlapWeighting) -> Self {
        self.weighting = weighting;
        self
    }

    /// Frames per network window
    pub fn window_frames(&self) -> usize {
        self.frames_past + self.frames_future + 1
    }

    /// Samples spanned by one window
    pub fn window_samples(&self) -> usize {
        self.codec
            .samples_for_hops(self.frames_past + self.frames_future)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> MlResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| MlError::InvalidConfig(format!("config parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MlResult<()> {
        self.codec.validate()?;
        if self.stride == 0 || self.stride > self.window_frames() {
            return Err(MlError::InvalidConfig(format!(
                "stride must be in 1..={}, got {}",
                self.window_frames(),
                self.stride
            )));
        }
        if self.batch_size == 0 {
            return Err(MlError::InvalidConfig("batch_size must be at least 1".into()));
        }
        Ok(())
    }
}
