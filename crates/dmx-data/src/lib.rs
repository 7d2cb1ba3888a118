//! dmx-data: Training data pipeline for Demixer
//!
//! Serves randomized, fixed-size training windows from a multi-track corpus
//! that does not fit in memory:
//!
//! - `Corpus` - song discovery for one split
//! - `ChunkedCorpusLoader` - keeps `chunk_size` songs resident at a time
//! - `AugmentationEngine` - synthesizes new mixtures from transformed stems
//! - `BatchSampler` - assembles spectrogram batches for the network
//! - `ChunkPrefetcher` - loads the next chunk on a worker thread
//!
//! ## Batch layout
//!
//! ```text
//! inputs:  (batch, frequency, time, channel)          mixture magnitude
//! targets: (batch, frequency, time, channel, source)  bass, drums, other, vocals
//! ```

pub mod augment;
mod config;
mod corpus;
mod error;
mod loader;
mod prefetch;
mod sampler;

pub use augment::{AugmentationEngine, AugmentedBuffer, AugmentedFragment, StemSet, Transform};
pub use config::*;
pub use corpus::*;
pub use error::*;
pub use loader::*;
pub use prefetch::*;
pub use sampler::*;

/// Random number generator threaded through the whole pipeline
pub type PipelineRng = rand_chacha::ChaCha8Rng;
