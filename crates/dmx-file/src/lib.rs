//! dmx-file: Audio File I/O
//!
//! WAV import/export (via hound) for corpus tracks and separated stems.
//! Integer PCM is normalized to [-1, 1]; float WAV is read as-is.

mod error;
mod wav;

pub use error::*;
pub use wav::*;
