//! Overdrive
//!
//! Gain into a cubic soft clipper with a colour bias, followed by a DC
//! blocker that removes the offset introduced by the bias.

use crate::{MonoProcessor, Processor, db_to_linear};

/// DC blocker pole
const DC_BLOCK_R: f64 = 0.995;

/// Cubic soft clip `x - x³/3`, saturating at ±2/3 outside [-1, 1]
#[inline(always)]
pub fn soft_clip(x: f64) -> f64 {
    if x < -1.0 {
        -2.0 / 3.0
    } else if x > 1.0 {
        2.0 / 3.0
    } else {
        x - x * x * x / 3.0
    }
}

/// Overdrive with adjustable drive and even-harmonic colour
#[derive(Debug, Clone)]
pub struct Overdrive {
    gain: f64,
    colour: f64,
    last_in: f64,
    last_out: f64,
}

impl Overdrive {
    /// `gain_db` is the input drive, `colour` in 0..=100 sets the bias
    pub fn new(gain_db: f64, colour: f64) -> Self {
        Self {
            gain: db_to_linear(gain_db),
            colour: colour.clamp(0.0, 100.0) / 200.0,
            last_in: 0.0,
            last_out: 0.0,
        }
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }
}

impl Default for Overdrive {
    fn default() -> Self {
        Self::new(20.0, 20.0)
    }
}

impl Processor for Overdrive {
    fn reset(&mut self) {
        self.last_in = 0.0;
        self.last_out = 0.0;
    }
}

impl MonoProcessor for Overdrive {
    #[inline(always)]
    fn process_sample(&mut self, input: f64) -> f64 {
        let shaped = soft_clip(input * self.gain + self.colour);
        // y[n] = x[n] - x[n-1] + R * y[n-1]
        self.last_out = shaped - self.last_in + DC_BLOCK_R * self.last_out;
        self.last_in = shaped;
        self.last_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_soft_clip_curve() {
        assert_relative_eq!(soft_clip(0.0), 0.0);
        assert_relative_eq!(soft_clip(1.0), 2.0 / 3.0);
        assert_relative_eq!(soft_clip(5.0), 2.0 / 3.0);
        assert_relative_eq!(soft_clip(-5.0), -2.0 / 3.0);
        assert_relative_eq!(soft_clip(0.5), 0.5 - 0.125 / 3.0);
    }

    #[test]
    fn test_output_is_bounded() {
        let mut drive = Overdrive::new(20.0, 100.0);
        let mut block: Vec<f32> = (0..4410)
            .map(|i| (2.0 * std::f32::consts::PI * 110.0 * i as f32 / 44100.0).sin())
            .collect();
        drive.process_block(&mut block);
        assert!(block.iter().all(|s| s.is_finite() && s.abs() < 2.0));
    }

    #[test]
    fn test_dc_bias_removed() {
        let mut drive = Overdrive::new(10.0, 100.0);
        let mut out = 1.0;
        for _ in 0..20000 {
            out = drive.process_sample(0.0);
        }
        assert!(out.abs() < 1e-6);
    }
}
