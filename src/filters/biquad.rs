use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

use super::{CHANNELS, SAMPLE_RATE};

/// Tipos de filtro biquad (RBJ Audio EQ Cookbook)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BiquadKind {
    LowPass,
    HighPass,
    BandPass,
    Notch,
    AllPass,
    PeakingEq,
    LowShelf,
    HighShelf,
}

impl BiquadKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().replace(['_', '-', ' '], "").as_str() {
            "lowpass" => Some(Self::LowPass),
            "highpass" => Some(Self::HighPass),
            "bandpass" => Some(Self::BandPass),
            "notch" => Some(Self::Notch),
            "allpass" => Some(Self::AllPass),
            "peakingeq" | "peaking" => Some(Self::PeakingEq),
            "lowshelf" => Some(Self::LowShelf),
            "highshelf" => Some(Self::HighShelf),
            _ => None,
        }
    }
}

/// Single named biquad stage with its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiquadFilter {
    pub kind: BiquadKind,
    pub cutoff: f32,
    pub q: f32,
    pub gain_db: f32,
}

impl BiquadFilter {
    pub fn new(kind: BiquadKind, cutoff: f32) -> Self {
        Self {
            kind,
            cutoff,
            q: std::f32::consts::FRAC_1_SQRT_2,
            gain_db: 0.0,
        }
    }

    pub fn with_q(mut self, q: f32) -> Self {
        self.q = q;
        self
    }

    pub fn with_gain(mut self, gain_db: f32) -> Self {
        self.gain_db = gain_db;
        self
    }

    pub fn is_valid(&self) -> bool {
        self.cutoff > 0.0 && self.cutoff < SAMPLE_RATE as f32 / 2.0 && self.q > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Coefficients {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl Coefficients {
    pub(crate) fn design(filter: &BiquadFilter, sample_rate: f32) -> Self {
        let w0 = 2.0 * PI * filter.cutoff / sample_rate;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * filter.q);
        let a = 10f32.powf(filter.gain_db / 40.0);

        let (b0, b1, b2, a0, a1, a2) = match filter.kind {
            BiquadKind::LowPass => {
                let b1 = 1.0 - cos;
                (b1 / 2.0, b1, b1 / 2.0, 1.0 + alpha, -2.0 * cos, 1.0 - alpha)
            }
            BiquadKind::HighPass => {
                let b1 = -(1.0 + cos);
                (-b1 / 2.0, b1, -b1 / 2.0, 1.0 + alpha, -2.0 * cos, 1.0 - alpha)
            }
            BiquadKind::BandPass => (alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos, 1.0 - alpha),
            BiquadKind::Notch => (1.0, -2.0 * cos, 1.0, 1.0 + alpha, -2.0 * cos, 1.0 - alpha),
            BiquadKind::AllPass => (
                1.0 - alpha,
                -2.0 * cos,
                1.0 + alpha,
                1.0 + alpha,
                -2.0 * cos,
                1.0 - alpha,
            ),
            BiquadKind::PeakingEq => (
                1.0 + alpha * a,
                -2.0 * cos,
                1.0 - alpha * a,
                1.0 + alpha / a,
                -2.0 * cos,
                1.0 - alpha / a,
            ),
            BiquadKind::LowShelf => {
                let sq = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) - (a - 1.0) * cos + sq),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos),
                    a * ((a + 1.0) - (a - 1.0) * cos - sq),
                    (a + 1.0) + (a - 1.0) * cos + sq,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos),
                    (a + 1.0) + (a - 1.0) * cos - sq,
                )
            }
            BiquadKind::HighShelf => {
                let sq = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) + (a - 1.0) * cos + sq),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos),
                    a * ((a + 1.0) + (a - 1.0) * cos - sq),
                    (a + 1.0) - (a - 1.0) * cos + sq,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos),
                    (a + 1.0) - (a - 1.0) * cos - sq,
                )
            }
        };

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// Biquad en forma transpuesta II, un estado por canal
#[derive(Debug, Clone)]
pub(crate) struct Biquad {
    coeffs: Coefficients,
    state: [[f32; 2]; CHANNELS],
}

impl Biquad {
    pub(crate) fn new(filter: &BiquadFilter) -> Self {
        Self {
            coeffs: Coefficients::design(filter, SAMPLE_RATE as f32),
            state: [[0.0; 2]; CHANNELS],
        }
    }

    /// Procesa audio intercalado en estéreo
    pub(crate) fn process(&mut self, samples: &mut [f32]) {
        let c = self.coeffs;
        for frame in samples.chunks_exact_mut(CHANNELS) {
            for (sample, z) in frame.iter_mut().zip(self.state.iter_mut()) {
                let x = *sample;
                let y = c.b0 * x + z[0];
                z[0] = c.b1 * x - c.a1 * y + z[1];
                z[1] = c.b2 * x - c.a2 * y;
                *sample = y;
            }
        }
    }
}
