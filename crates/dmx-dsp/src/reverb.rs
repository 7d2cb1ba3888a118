//! Room reverb
//!
//! Schroeder/Moorer network in the Freeverb layout: eight damped feedback
//! combs in parallel followed by four series allpass diffusers per channel.
//! The right channel uses slightly longer delays for stereo decorrelation.
//! Output length equals input length; the tail past the end is discarded.

use serde::{Deserialize, Serialize};

use crate::{Processor, StereoProcessor};

/// Comb delays in samples at 44.1 kHz
const COMB_TUNING: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];

/// Allpass delays in samples at 44.1 kHz
const ALLPASS_TUNING: [usize; 4] = [556, 441, 341, 225];

/// Extra right-channel delay in samples at 44.1 kHz
const STEREO_SPREAD: usize = 23;

const ALLPASS_FEEDBACK: f64 = 0.5;

/// Input attenuation into the comb bank
const INPUT_GAIN: f64 = 0.015;

const REFERENCE_RATE: f64 = 44100.0;

/// Reverb parameters, each on a 0..=100 scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReverbParams {
    /// Decay length
    pub reverberance: f64,
    /// High-frequency absorption in the feedback path
    pub hf_damping: f64,
    /// Room size (scales every delay)
    pub room_scale: f64,
    /// Stereo width of the wet signal
    pub stereo_depth: f64,
    /// Delay before the wet signal, in milliseconds
    pub pre_delay_ms: f64,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            reverberance: 50.0,
            hf_damping: 50.0,
            room_scale: 100.0,
            stereo_depth: 100.0,
            pre_delay_ms: 0.0,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUILDING BLOCKS
// ═══════════════════════════════════════════════════════════════════════════════

/// Feedback comb with one-pole lowpass damping
#[derive(Debug, Clone)]
struct DampedComb {
    buffer: Vec<f64>,
    pos: usize,
    feedback: f64,
    damp: f64,
    filter_state: f64,
}

impl DampedComb {
    fn new(delay_samples: usize, feedback: f64, damp: f64) -> Self {
        Self {
            buffer: vec![0.0; delay_samples.max(1)],
            pos: 0,
            feedback,
            damp,
            filter_state: 0.0,
        }
    }

    #[inline(always)]
    fn process(&mut self, input: f64) -> f64 {
        let output = self.buffer[self.pos];
        self.filter_state = output * (1.0 - self.damp) + self.filter_state * self.damp;
        self.buffer[self.pos] = input + self.filter_state * self.feedback;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
        self.filter_state = 0.0;
    }
}

/// Allpass filter for diffusion stage
#[derive(Debug, Clone)]
struct DiffusionAllpass {
    buffer: Vec<f64>,
    pos: usize,
    feedback: f64,
}

impl DiffusionAllpass {
    fn new(delay_samples: usize, feedback: f64) -> Self {
        Self {
            buffer: vec![0.0; delay_samples.max(1)],
            pos: 0,
            feedback,
        }
    }

    #[inline(always)]
    fn process(&mut self, input: f64) -> f64 {
        let delayed = self.buffer[self.pos];
        let output = delayed - input * self.feedback;
        self.buffer[self.pos] = input + delayed * self.feedback;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
    }
}

/// Plain delay line; zero length passes through
#[derive(Debug, Clone)]
struct PreDelay {
    buffer: Vec<f64>,
    pos: usize,
}

impl PreDelay {
    fn new(delay_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; delay_samples],
            pos: 0,
        }
    }

    #[inline(always)]
    fn process(&mut self, input: f64) -> f64 {
        if self.buffer.is_empty() {
            return input;
        }
        let output = self.buffer[self.pos];
        self.buffer[self.pos] = input;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROOM REVERB
// ═══════════════════════════════════════════════════════════════════════════════

/// Stereo room reverb (dry + wet)
#[derive(Debug, Clone)]
pub struct RoomReverb {
    combs: [Vec<DampedComb>; 2],
    allpasses: [Vec<DiffusionAllpass>; 2],
    pre_delay: PreDelay,
    wet_direct: f64,
    wet_cross: f64,
    dry: f64,
}

impl RoomReverb {
    pub fn new(params: ReverbParams, sample_rate: f64) -> Self {
        let reverberance = params.reverberance.clamp(0.0, 100.0) / 100.0;
        let damping = params.hf_damping.clamp(0.0, 100.0) / 100.0;
        let room = params.room_scale.clamp(0.0, 100.0) / 100.0;
        let width = params.stereo_depth.clamp(0.0, 100.0) / 100.0;

        let feedback = 0.7 + 0.28 * reverberance;
        let damp = 0.4 * damping;
        let delay_scale = sample_rate / REFERENCE_RATE * (0.1 + 0.9 * room);
        let scaled = |samples: usize| ((samples as f64 * delay_scale).round() as usize).max(1);
        let spread = (STEREO_SPREAD as f64 * sample_rate / REFERENCE_RATE).round() as usize;

        let make_combs = |offset: usize| {
            COMB_TUNING
                .iter()
                .map(|&d| DampedComb::new(scaled(d) + offset, feedback, damp))
                .collect::<Vec<_>>()
        };
        let make_allpasses = |offset: usize| {
            ALLPASS_TUNING
                .iter()
                .map(|&d| DiffusionAllpass::new(scaled(d) + offset, ALLPASS_FEEDBACK))
                .collect::<Vec<_>>()
        };

        let pre_delay_samples =
            (params.pre_delay_ms.max(0.0) * 0.001 * sample_rate).round() as usize;

        Self {
            combs: [make_combs(0), make_combs(spread)],
            allpasses: [make_allpasses(0), make_allpasses(spread)],
            pre_delay: PreDelay::new(pre_delay_samples),
            wet_direct: width / 2.0 + 0.5,
            wet_cross: (1.0 - width) / 2.0,
            dry: 1.0,
        }
    }

    #[inline(always)]
    fn process_channel(&mut self, channel: usize, input: f64) -> f64 {
        let mut out = 0.0;
        for comb in &mut self.combs[channel] {
            out += comb.process(input);
        }
        for allpass in &mut self.allpasses[channel] {
            out = allpass.process(out);
        }
        out
    }
}

impl Processor for RoomReverb {
    fn reset(&mut self) {
        for comb in self.combs.iter_mut().flatten() {
            comb.reset();
        }
        for allpass in self.allpasses.iter_mut().flatten() {
            allpass.reset();
        }
        self.pre_delay.reset();
    }
}

impl StereoProcessor for RoomReverb {
    #[inline(always)]
    fn process_sample(&mut self, left: f64, right: f64) -> (f64, f64) {
        let input = self.pre_delay.process((left + right) * INPUT_GAIN);
        let wet_l = self.process_channel(0, input);
        let wet_r = self.process_channel(1, input);

        (
            left * self.dry + wet_l * self.wet_direct + wet_r * self.wet_cross,
            right * self.dry + wet_r * self.wet_direct + wet_l * self.wet_cross,
        )
    }
}
