//! Pitch shifting by stretch-and-resample
//!
//! A shift of `s` semitones stretches the signal by `r = 2^(s/12)` with the
//! phase vocoder, then resamples it back to the original length, which
//! scales every frequency by `r`.

use dmx_core::StereoBuffer;

use crate::time_stretch::{PhaseVocoder, resample_linear};

/// Frequency ratio of a shift in semitones
#[inline]
pub fn semitones_to_ratio(semitones: f64) -> f64 {
    2.0_f64.powf(semitones / 12.0)
}

/// Shift a mono signal by `semitones`; the output has the input's length
pub fn pitch_shift(vocoder: &mut PhaseVocoder, input: &[f32], semitones: f64) -> Vec<f32> {
    if semitones == 0.0 || input.is_empty() {
        return input.to_vec();
    }
    let ratio = semitones_to_ratio(semitones);
    let stretched = vocoder.stretch(input, ratio);
    resample_linear(&stretched, input.len())
}

/// Shift both channels of a stereo buffer
pub fn pitch_shift_stereo(vocoder: &mut PhaseVocoder, audio: &StereoBuffer, semitones: f64) -> StereoBuffer {
    let left = pitch_shift(vocoder, audio.left(), semitones);
    let right = pitch_shift(vocoder, audio.right(), semitones);
    StereoBuffer::from_channels(left, right)
}
