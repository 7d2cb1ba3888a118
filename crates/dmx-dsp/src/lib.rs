//! dmx-dsp: Signal processing for Demixer
//!
//! - `SpectrogramCodec` - STFT analysis / ISTFT synthesis with log-compressed magnitudes
//! - Effects used by data augmentation: high shelf, overdrive, reverb,
//!   phase-vocoder time stretch and pitch shift
//!
//! Effects process `f32` buffers with `f64` internal state.

mod error;

pub mod biquad;
pub mod pitch;
pub mod reverb;
pub mod saturation;
pub mod stft;
pub mod time_stretch;

pub use biquad::*;
pub use error::*;
pub use pitch::*;
pub use reverb::*;
pub use saturation::*;
pub use stft::*;
pub use time_stretch::*;

/// Base trait for stateful effects
pub trait Processor: Send + Sync {
    /// Clear internal state (delay lines, filter memory)
    fn reset(&mut self);
}

/// Single-channel effect
pub trait MonoProcessor: Processor {
    fn process_sample(&mut self, input: f64) -> f64;

    /// Process a buffer in place
    fn process_block(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample as f64) as f32;
        }
    }
}

/// Two-channel effect with cross-channel state
pub trait StereoProcessor: Processor {
    fn process_sample(&mut self, left: f64, right: f64) -> (f64, f64);

    /// Process a pair of buffers in place
    fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        debug_assert_eq!(left.len(), right.len());
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let (out_l, out_r) = self.process_sample(*l as f64, *r as f64);
            *l = out_l as f32;
            *r = out_r as f32;
        }
    }
}

/// Convert decibels to linear gain
#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}
