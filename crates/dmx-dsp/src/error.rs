//! DSP error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DspError {
    /// Rejected codec or effect configuration
    #[error("Invalid DSP configuration: {0}")]
    InvalidConfig(String),

    /// Forward or inverse FFT failed
    #[error("FFT failed: {0}")]
    Fft(String),

    /// Spectrogram or buffer dimensions do not match the codec
    #[error("Shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: String, got: String },
}

pub type DspResult<T> = Result<T, DspError>;
