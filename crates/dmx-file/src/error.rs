//! File I/O error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported channel layout: {channels} channels in {path}")]
    UnsupportedChannels { path: String, channels: u16 },

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("WAV error: {0}")]
    WavError(String),
}

impl FileError {
    /// Whether retrying the same read could succeed
    ///
    /// hound reports truncated data as `Other`, so only interruptions and
    /// timeouts qualify.
    pub fn is_transient(&self) -> bool {
        match self {
            FileError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

pub type FileResult<T> = Result<T, FileError>;

impl From<hound::Error> for FileError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(io) => FileError::Io(io),
            other => FileError::WavError(other.to_string()),
        }
    }
}
