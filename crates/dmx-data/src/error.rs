//! Error types for the data pipeline

use dmx_dsp::DspError;
use dmx_file::FileError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    /// A corpus file could not be read; the song is never skipped
    #[error("Failed to read corpus file {path}: {reason}")]
    CorpusIo { path: String, reason: String },

    /// No resident song is long enough to host a window
    #[error("No resident song can host {needed} samples (longest is {got})")]
    ShapeMismatch { needed: usize, got: usize },

    #[error("Empty corpus: {0}")]
    EmptyCorpus(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Pipeline cancelled")]
    Cancelled,

    /// Prefetch worker died or could not be started
    #[error("Prefetch worker error: {0}")]
    Worker(String),

    #[error("DSP error: {0}")]
    Dsp(#[from] DspError),

    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DataError {
    pub(crate) fn corpus_io(path: &std::path::Path, reason: impl std::fmt::Display) -> Self {
        DataError::CorpusIo {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for data pipeline operations
pub type DataResult<T> = Result<T, DataError>;
