//! Error types for separation

use dmx_dsp::DspError;
use dmx_file::FileError;
use thiserror::Error;

/// Separation error types
#[derive(Error, Debug)]
pub enum MlError {
    /// Model file not found
    #[error("Model not found: {path}")]
    ModelNotFound { path: String },

    /// Model loading failed
    #[error("Failed to load model: {reason}")]
    ModelLoadFailed { reason: String },

    /// Inference failed
    #[error("Inference failed: {reason}")]
    InferenceFailed { reason: String },

    /// Invalid input shape
    #[error("Invalid input shape: expected {expected}, got {got}")]
    InvalidInputShape { expected: String, got: String },

    /// Model returned a tensor that breaks the output contract
    #[error("Invalid output shape: expected {expected}, got {got}")]
    InvalidOutputShape { expected: String, got: String },

    /// Buffer too small
    #[error("Buffer too small: need {needed} samples, got {got}")]
    BufferTooSmall { needed: usize, got: usize },

    /// Rejected separation configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Tract error
    #[error("Tract error: {0}")]
    TractError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    Dsp(#[from] DspError),

    #[error(transparent)]
    File(#[from] FileError),
}

/// Result type for separation
pub type MlResult<T> = Result<T, MlError>;
