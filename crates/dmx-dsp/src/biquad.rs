//! Biquad filter implementation using Transposed Direct Form II
//!
//! Only the high shelf used by augmentation is provided (RBJ cookbook).

use std::f64::consts::PI;

use crate::{MonoProcessor, Processor};

/// Shelf slope giving a maximally steep shelf without overshoot
pub const SHELF_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Biquad coefficients (normalized by a0)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoeffs {
    /// Calculate high shelf filter coefficients
    pub fn high_shelf(freq: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        let a = 10.0_f64.powf(gain_db / 40.0);
        let omega = 2.0 * PI * freq / sample_rate;
        let cos_omega = omega.cos();
        let alpha = omega.sin() / (2.0 * q);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let b0 = a * ((a + 1.0) + (a - 1.0) * cos_omega + two_sqrt_a_alpha);
        let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_omega);
        let b2 = a * ((a + 1.0) + (a - 1.0) * cos_omega - two_sqrt_a_alpha);
        let a0 = (a + 1.0) - (a - 1.0) * cos_omega + two_sqrt_a_alpha;
        let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos_omega);
        let a2 = (a + 1.0) - (a - 1.0) * cos_omega - two_sqrt_a_alpha;

        Self::normalized(b0, b1, b2, a0, a1, a2)
    }

    /// Bypass (unity gain, no filtering)
    pub fn bypass() -> Self {
        Self {
            b0: 1.0,
            ..Default::default()
        }
    }

    fn normalized(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Magnitude response at `freq` Hz
    pub fn magnitude_at(&self, freq: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * freq / sample_rate;
        let (c1, s1) = (w.cos(), w.sin());
        let (c2, s2) = ((2.0 * w).cos(), (2.0 * w).sin());

        let num_re = self.b0 + self.b1 * c1 + self.b2 * c2;
        let num_im = -(self.b1 * s1 + self.b2 * s2);
        let den_re = 1.0 + self.a1 * c1 + self.a2 * c2;
        let den_im = -(self.a1 * s1 + self.a2 * s2);

        ((num_re * num_re + num_im * num_im) / (den_re * den_re + den_im * den_im)).sqrt()
    }
}

/// Transposed Direct Form II biquad filter
#[derive(Debug, Clone)]
pub struct BiquadTDF2 {
    coeffs: BiquadCoeffs,
    z1: f64,
    z2: f64,
    sample_rate: f64,
}

impl BiquadTDF2 {
    pub fn new(sample_rate: f64) -> Self {
        Self::with_coeffs(BiquadCoeffs::bypass(), sample_rate)
    }

    pub fn with_coeffs(coeffs: BiquadCoeffs, sample_rate: f64) -> Self {
        Self {
            coeffs,
            z1: 0.0,
            z2: 0.0,
            sample_rate,
        }
    }

    #[inline]
    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    /// Set as high shelf filter
    pub fn set_high_shelf(&mut self, freq: f64, q: f64, gain_db: f64) {
        self.coeffs = BiquadCoeffs::high_shelf(freq, q, gain_db, self.sample_rate);
    }
}

impl Processor for BiquadTDF2 {
    fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

impl MonoProcessor for BiquadTDF2 {
    #[inline(always)]
    fn process_sample(&mut self, input: f64) -> f64 {
        let output = self.coeffs.b0 * input + self.z1;
        self.z1 = self.coeffs.b1 * input - self.coeffs.a1 * output + self.z2;
        self.z2 = self.coeffs.b2 * input - self.coeffs.a2 * output;
        output
    }
}
