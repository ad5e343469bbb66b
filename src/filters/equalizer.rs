use serde::{Deserialize, Serialize};

use super::biquad::{Biquad, BiquadFilter, BiquadKind};
use crate::error::{PlayerError, Result};

/// Número de bandas del ecualizador
pub const EQ_BANDS: usize = 10;

/// Frecuencias centrales para el ecualizador de 10 bandas
pub const EQ_FREQUENCIES: [f32; EQ_BANDS] = [
    32.0,    // Sub-bass
    64.0,    // Bass
    125.0,   // Low-mid
    250.0,   // Mid
    500.0,   // Upper-mid
    1000.0,  // Presence
    2000.0,  // Brilliance
    4000.0,  // High
    8000.0,  // Very high
    16000.0, // Air
];

/// Ancho de banda Q para cada frecuencia
const EQ_Q: f32 = 1.414; // Factor Q estándar (octava)

/// Rango permitido de ganancia en dB
pub const MAX_GAIN_DB: f32 = 15.0;

/// Preset de ecualizador
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqPreset {
    pub name: String,
    pub gains: [f32; EQ_BANDS], // Ganancias en dB para cada banda
}

/// Presets predefinidos
pub struct EqPresets;

impl EqPresets {
    pub fn normal() -> EqPreset {
        Self::preset("Normal", [0.0; EQ_BANDS])
    }

    pub fn bass() -> EqPreset {
        Self::preset("Bass", [6.0, 5.0, 4.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])
    }

    pub fn pop() -> EqPreset {
        Self::preset("Pop", [-1.0, 2.0, 4.0, 5.0, 3.0, 0.0, -1.0, -1.0, 0.0, 0.0])
    }

    pub fn rock() -> EqPreset {
        Self::preset("Rock", [5.0, 4.0, 3.0, 1.0, -1.0, -1.0, 0.0, 2.0, 3.0, 4.0])
    }

    pub fn jazz() -> EqPreset {
        Self::preset("Jazz", [0.0, 1.0, 2.0, 3.0, 2.0, 1.0, 0.0, 1.0, 2.0, 3.0])
    }

    pub fn classical() -> EqPreset {
        Self::preset("Classical", [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, -2.0, -2.0, -2.0, -3.0])
    }

    pub fn electronic() -> EqPreset {
        Self::preset("Electronic", [5.0, 4.0, 1.0, 0.0, -2.0, 2.0, 1.0, 0.0, 3.0, 4.0])
    }

    pub fn vocal() -> EqPreset {
        Self::preset("Vocal", [-2.0, -1.0, 0.0, 2.0, 4.0, 3.0, 2.0, 1.0, 0.0, -1.0])
    }

    fn preset(name: &str, gains: [f32; EQ_BANDS]) -> EqPreset {
        EqPreset {
            name: name.to_string(),
            gains,
        }
    }

    /// Obtiene un preset por nombre
    pub fn get(name: &str) -> Option<EqPreset> {
        match name.to_lowercase().as_str() {
            "normal" | "flat" => Some(Self::normal()),
            "bass" => Some(Self::bass()),
            "pop" => Some(Self::pop()),
            "rock" => Some(Self::rock()),
            "jazz" => Some(Self::jazz()),
            "classical" => Some(Self::classical()),
            "electronic" => Some(Self::electronic()),
            "vocal" => Some(Self::vocal()),
            _ => None,
        }
    }

    /// Lista todos los presets disponibles
    pub fn list() -> Vec<&'static str> {
        vec![
            "normal",
            "bass",
            "pop",
            "rock",
            "jazz",
            "classical",
            "electronic",
            "vocal",
        ]
    }
}

/// Valida un conjunto de ganancias
pub fn validate_gains(gains: &[f32; EQ_BANDS]) -> Result<()> {
    for (i, &gain) in gains.iter().enumerate() {
        if !(-MAX_GAIN_DB..=MAX_GAIN_DB).contains(&gain) {
            return Err(PlayerError::InvalidValue(format!(
                "Ganancia fuera de rango en banda {}: {} dB (debe estar entre -15 y +15)",
                i + 1,
                gain
            )));
        }
    }
    Ok(())
}

/// Parsea una cadena de configuración de ecualizador
/// Formato: "32:2 64:1 125:0 250:-1 500:0 1k:1 2k:2 4k:1 8k:0 16k:-1"
pub fn parse_config(config: &str) -> Result<[f32; EQ_BANDS]> {
    let mut gains = [0.0; EQ_BANDS];
    let parts: Vec<&str> = config.split_whitespace().collect();

    if parts.len() != EQ_BANDS {
        return Err(PlayerError::InvalidValue(
            "Se esperan 10 valores de ganancia".to_string(),
        ));
    }

    for (i, part) in parts.iter().enumerate() {
        let (_, gain) = part.split_once(':').ok_or_else(|| {
            PlayerError::InvalidValue(format!(
                "Formato inválido en '{}', use 'frecuencia:ganancia'",
                part
            ))
        })?;

        gains[i] = gain
            .parse()
            .map_err(|_| PlayerError::InvalidValue(format!("Ganancia inválida en '{}'", part)))?;
    }

    validate_gains(&gains)?;
    Ok(gains)
}

/// Ecualizador paramétrico de 10 bandas sobre PCM
#[derive(Debug, Clone)]
pub(crate) struct Equalizer {
    gains: [f32; EQ_BANDS],
    bands: Vec<Biquad>,
}

impl Equalizer {
    pub(crate) fn new(gains: [f32; EQ_BANDS]) -> Self {
        let bands = EQ_FREQUENCIES
            .iter()
            .zip(gains.iter())
            // flat bands are an identity, skip them
            .filter(|(_, gain)| gain.abs() > f32::EPSILON)
            .map(|(&freq, &gain)| {
                Biquad::new(
                    &BiquadFilter::new(BiquadKind::PeakingEq, freq)
                        .with_q(EQ_Q)
                        .with_gain(gain),
                )
            })
            .collect();

        Self { gains, bands }
    }

    pub(crate) fn gains(&self) -> [f32; EQ_BANDS] {
        self.gains
    }

    pub(crate) fn is_flat(&self) -> bool {
        self.bands.is_empty()
    }

    pub(crate) fn process(&mut self, samples: &mut [f32]) {
        for band in &mut self.bands {
            band.process(samples);
        }
    }
}
