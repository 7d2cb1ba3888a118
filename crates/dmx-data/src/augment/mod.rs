//! On-the-fly data augmentation
//!
//! Builds one long synthetic song per resident chunk by concatenating
//! transformed stem fragments. The result lives in memory and is consumed
//! window by window by the sampler.

mod engine;
mod transforms;

use std::path::Path;

use dmx_core::{Instrument, NUM_SOURCES, StereoBuffer};
use dmx_file::{WavEncoding, write_stereo_wav};

pub use engine::AugmentationEngine;
pub use transforms::{Transform, TransformContext, TransformFn, stretch_aligned};

use crate::{DataResult, SongWindow};

/// Four stems in source-axis order
pub type StemSet = [StereoBuffer; NUM_SOURCES];

/// Provenance of one fragment of an augmented buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AugmentedFragment {
    pub transform: Transform,
    /// Stems were drawn from independent songs
    pub swapped: bool,
    /// Resident song index each stem came from
    pub source_songs: [usize; NUM_SOURCES],
}

/// Synthetic mixture and stems for one chunk
///
/// `mixture` equals the sum of `stems` sample for sample.
#[derive(Debug, Clone)]
pub struct AugmentedBuffer {
    pub mixture: StereoBuffer,
    pub stems: StemSet,
    pub fragments: Vec<AugmentedFragment>,
    pub fragment_len: usize,
    pub sample_rate: u32,
}

impl AugmentedBuffer {
    pub fn len(&self) -> usize {
        self.mixture.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mixture.is_empty()
    }

    /// Whole windows of `window_len` samples
    pub fn num_windows(&self, window_len: usize) -> usize {
        if window_len == 0 {
            return 0;
        }
        self.len() / window_len
    }

    /// Window number `index` (sequential, non-overlapping)
    pub fn window(&self, index: usize, window_len: usize) -> Option<SongWindow> {
        let start = index.checked_mul(window_len)?;
        let mixture = self.mixture.slice(start, window_len)?;
        let mut stems: StemSet = Default::default();
        for (dst, src) in stems.iter_mut().zip(&self.stems) {
            *dst = src.slice(start, window_len)?;
        }
        Some(SongWindow { mixture, stems })
    }

    /// Write `augmented.wav` and one file per stem into `dir` for inspection
    pub fn write_scratch(&self, dir: &Path) -> DataResult<()> {
        std::fs::create_dir_all(dir)?;
        write_stereo_wav(
            dir.join("augmented.wav"),
            &self.mixture,
            self.sample_rate,
            WavEncoding::Float32,
        )?;
        for instrument in Instrument::ALL {
            write_stereo_wav(
                dir.join(instrument.file_name()),
                &self.stems[instrument.index()],
                self.sample_rate,
                WavEncoding::Float32,
            )?;
        }
        log::debug!("Wrote augmented buffer to {}", dir.display());
        Ok(())
    }
}
