//! Augmentation transforms
//!
//! Each transform maps four stem fragments to four new fragments of the
//! same length. The mixture is always recomputed as the sum of the
//! returned stems, so `mixture == Σ stems` holds for augmented material.

use dmx_core::{Instrument, StereoBuffer};
use dmx_dsp::{
    BiquadTDF2, MonoProcessor, Overdrive, PhaseVocoder, ReverbParams, RoomReverb, SHELF_Q,
    StereoProcessor, pitch_shift_stereo,
};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::StemSet;
use crate::PipelineRng;

/// Per-fragment transform
///
/// Declaration order matches the historical registry numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transform {
    /// Independent tempo change per stem, realigned to the fragment length
    TimeStretch,
    /// High-shelf boost then overdrive on the bass stem
    BassDistortion,
    /// Independent room reverb per stem
    Reverb,
    /// Vocal pitch shift in whole semitones
    VocalPitchShift,
    /// Move each stem to a random pan position
    Repan,
    /// Fold each stem to mono
    MonoFold,
    /// Swap L/R of each stem with probability 0.5
    ChannelSwap,
    /// Independent gain per stem
    AmplitudeScale,
}

/// Transform signature used by the function table
pub type TransformFn = fn(StemSet, &mut TransformContext, &mut PipelineRng) -> StemSet;

/// Shared state for transforms (sample rate, reusable FFT plans)
#[derive(Debug)]
pub struct TransformContext {
    pub sample_rate: f64,
    pub vocoder: PhaseVocoder,
}

impl TransformContext {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate as f64,
            vocoder: PhaseVocoder::default(),
        }
    }
}

impl Transform {
    pub const ALL: [Transform; 8] = [
        Transform::TimeStretch,
        Transform::BassDistortion,
        Transform::Reverb,
        Transform::VocalPitchShift,
        Transform::Repan,
        Transform::MonoFold,
        Transform::ChannelSwap,
        Transform::AmplitudeScale,
    ];

    /// Registry drawn from by default: every transform except amplitude scaling
    pub fn default_registry() -> Vec<Transform> {
        Self::ALL[..7].to_vec()
    }

    pub fn name(self) -> &'static str {
        match self {
            Transform::TimeStretch => "time_stretch",
            Transform::BassDistortion => "bass_distortion",
            Transform::Reverb => "reverb",
            Transform::VocalPitchShift => "vocal_pitch_shift",
            Transform::Repan => "repan",
            Transform::MonoFold => "mono_fold",
            Transform::ChannelSwap => "channel_swap",
            Transform::AmplitudeScale => "amplitude_scale",
        }
    }

    /// Function implementing this transform
    pub fn function(self) -> TransformFn {
        match self {
            Transform::TimeStretch => time_stretch,
            Transform::BassDistortion => bass_distortion,
            Transform::Reverb => reverb,
            Transform::VocalPitchShift => vocal_pitch_shift,
            Transform::Repan => repan,
            Transform::MonoFold => mono_fold,
            Transform::ChannelSwap => channel_swap,
            Transform::AmplitudeScale => amplitude_scale,
        }
    }

    pub fn apply(self, stems: StemSet, ctx: &mut TransformContext, rng: &mut PipelineRng) -> StemSet {
        (self.function())(stems, ctx, rng)
    }
}

impl std::fmt::Display for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHANNEL / GAIN TRANSFORMS
// ═══════════════════════════════════════════════════════════════════════════════

fn amplitude_scale(mut stems: StemSet, _ctx: &mut TransformContext, rng: &mut PipelineRng) -> StemSet {
    for stem in &mut stems {
        stem.apply_gain(rng.random_range(0.25..=1.25));
    }
    stems
}

fn channel_swap(mut stems: StemSet, _ctx: &mut TransformContext, rng: &mut PipelineRng) -> StemSet {
    for stem in &mut stems {
        if rng.random_bool(0.5) {
            stem.swap_channels();
        }
    }
    stems
}

fn mono_fold(mut stems: StemSet, _ctx: &mut TransformContext, _rng: &mut PipelineRng) -> StemSet {
    for stem in &mut stems {
        let (left, right) = stem.channels_mut();
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let mono = (*l + *r) * 0.5;
            *l = mono;
            *r = mono;
        }
    }
    stems
}

fn repan(mut stems: StemSet, _ctx: &mut TransformContext, rng: &mut PipelineRng) -> StemSet {
    for stem in &mut stems {
        let pan: f32 = rng.random_range(0.0..=1.0);
        let (left, right) = stem.channels_mut();
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let sum = *l + *r;
            *l = pan * sum;
            *r = (1.0 - pan) * sum;
        }
    }
    stems
}

// ═══════════════════════════════════════════════════════════════════════════════
// EFFECT TRANSFORMS
// ═══════════════════════════════════════════════════════════════════════════════

fn vocal_pitch_shift(mut stems: StemSet, ctx: &mut TransformContext, rng: &mut PipelineRng) -> StemSet {
    let semitones = rng.random_range(-4..=4);
    let vocals = &mut stems[Instrument::Vocals.index()];
    *vocals = pitch_shift_stereo(&mut ctx.vocoder, vocals, semitones as f64);
    stems
}

fn reverb(mut stems: StemSet, ctx: &mut TransformContext, rng: &mut PipelineRng) -> StemSet {
    for stem in &mut stems {
        let params = ReverbParams {
            reverberance: rng.random_range(0..100) as f64,
            hf_damping: rng.random_range(0..100) as f64,
            room_scale: rng.random_range(0..100) as f64,
            stereo_depth: rng.random_range(0..100) as f64,
            pre_delay_ms: rng.random_range(0..100) as f64,
        };
        let mut reverb = RoomReverb::new(params, ctx.sample_rate);
        let (left, right) = stem.channels_mut();
        reverb.process_block(left, right);
    }
    stems
}

fn bass_distortion(mut stems: StemSet, ctx: &mut TransformContext, rng: &mut PipelineRng) -> StemSet {
    let drive_db = rng.random_range(10..20) as f64;
    let colour = rng.random_range(0..100) as f64;
    let shelf_freq = rng.random_range(2000..5000) as f64;
    let shelf_gain_db = rng.random_range(0..10) as f64;

    let bass = &mut stems[Instrument::Bass.index()];
    for ch in 0..2 {
        let mut shelf = BiquadTDF2::new(ctx.sample_rate);
        shelf.set_high_shelf(shelf_freq, SHELF_Q, shelf_gain_db);
        let mut drive = Overdrive::new(drive_db, colour);

        let samples = bass.channel_mut(ch);
        shelf.process_block(samples);
        drive.process_block(samples);
    }
    stems
}

fn time_stretch(mut stems: StemSet, ctx: &mut TransformContext, rng: &mut PipelineRng) -> StemSet {
    for stem in &mut stems {
        let tempo: f64 = rng.random_range(0.75..=1.5);
        *stem = stretch_aligned(&mut ctx.vocoder, stem, tempo, rng);
    }
    stems
}

/// Play `stem` at `tempo` and fit the result back to the original length
///
/// Longer results are truncated; shorter ones are placed at a random
/// offset inside silence.
pub fn stretch_aligned(
    vocoder: &mut PhaseVocoder,
    stem: &StereoBuffer,
    tempo: f64,
    rng: &mut PipelineRng,
) -> StereoBuffer {
    let len = stem.len();
    let (left, right) = vocoder.stretch_stereo(stem.left(), stem.right(), 1.0 / tempo);
    let mut stretched = StereoBuffer::from_channels(left, right);

    if stretched.len() >= len {
        stretched.truncate(len);
        return stretched;
    }

    let shift = rng.random_range(0..=len - stretched.len());
    let mut out = StereoBuffer::silence(len);
    for ch in 0..2 {
        out.channel_mut(ch)[shift..shift + stretched.len()].copy_from_slice(stretched.channel(ch));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;

    fn stems(len: usize) -> StemSet {
        std::array::from_fn(|k| {
            let left = (0..len)
                .map(|i| ((i * (k + 3)) as f32 * 0.013).sin() * 0.3)
                .collect();
            let right = (0..len)
                .map(|i| ((i * (k + 5)) as f32 * 0.007).cos() * 0.2)
                .collect();
            StereoBuffer::from_channels(left, right)
        })
    }

    fn run(transform: Transform, input: StemSet) -> StemSet {
        let mut ctx = TransformContext::new(44100);
        let mut rng = PipelineRng::seed_from_u64(42);
        transform.apply(input, &mut ctx, &mut rng)
    }

    #[test]
    fn test_every_transform_preserves_length() {
        for transform in Transform::ALL {
            let out = run(transform, stems(6000));
            for stem in &out {
                assert_eq!(stem.len(), 6000, "{transform} changed the length");
                assert!(stem.peak().is_finite());
            }
        }
    }

    #[test]
    fn test_default_registry_excludes_amplitude_scale() {
        let registry = Transform::default_registry();
        assert_eq!(registry.len(), 7);
        assert!(!registry.contains(&Transform::AmplitudeScale));
    }

    #[test]
    fn test_mono_fold() {
        let out = run(Transform::MonoFold, stems(256));
        for stem in &out {
            assert_eq!(stem.left(), stem.right());
        }
    }

    #[test]
    fn test_repan_keeps_channel_sum() {
        let input = stems(256);
        let out = run(Transform::Repan, input.clone());
        for (before, after) in input.iter().zip(&out) {
            for i in 0..256 {
                assert_abs_diff_eq!(
                    after.left()[i] + after.right()[i],
                    before.left()[i] + before.right()[i],
                    epsilon = 1e-5
                );
            }
        }
    }

    #[test]
    fn test_pitch_shift_touches_vocals_only() {
        let input = stems(8192);
        let out = run(Transform::VocalPitchShift, input.clone());
        for inst in [Instrument::Bass, Instrument::Drums, Instrument::Other] {
            assert_eq!(out[inst.index()], input[inst.index()]);
        }
    }

    #[test]
    fn test_distortion_touches_bass_only() {
        let input = stems(4096);
        let out = run(Transform::BassDistortion, input.clone());
        assert_ne!(out[0], input[0]);
        assert_eq!(out[1..], input[1..]);
    }

    #[test]
    fn test_amplitude_scale_bounds() {
        let input = stems(1024);
        let out = run(Transform::AmplitudeScale, input.clone());
        for (before, after) in input.iter().zip(&out) {
            let ratio = after.peak() / before.peak();
            assert!((0.25 - 1e-4..=1.25 + 1e-4).contains(&ratio));
        }
    }

    #[test]
    fn test_stretch_alignment() {
        let mut vocoder = PhaseVocoder::default();
        let mut rng = PipelineRng::seed_from_u64(3);
        let [stem, ..] = stems(12000);
        for tempo in [0.75, 1.0, 1.2, 1.5] {
            assert_eq!(stretch_aligned(&mut vocoder, &stem, tempo, &mut rng).len(), 12000);
        }
    }
}
