//! dmx-core: Shared types for Demixer
//!
//! Foundational types used by every Demixer crate:
//! - `Instrument` - the four separated sources and their canonical order
//! - `StereoBuffer` - planar stereo f32 audio

mod buffer;
mod instrument;

pub use buffer::*;
pub use instrument::*;

/// Number of separated sources
pub const NUM_SOURCES: usize = 4;

/// Number of audio channels handled by the pipeline
pub const NUM_CHANNELS: usize = 2;

/// Corpus sample rate assumed when a file header is unavailable
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
