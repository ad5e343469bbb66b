use std::{collections::BTreeMap, f32::consts::PI};

use super::{CHANNELS, SAMPLE_RATE};

/// Filtros PCM conocidos (interruptores on/off)
pub const PCM_FILTERS: [&str; 4] = ["8D", "tremolo", "karaoke", "mono"];

const PAN_HZ: f32 = 0.1;
const TREMOLO_HZ: f32 = 5.0;
const TREMOLO_DEPTH: f32 = 0.5;

pub fn is_known(name: &str) -> bool {
    PCM_FILTERS.contains(&name)
}

/// Cadena de interruptores PCM con su fase de modulación
#[derive(Debug, Clone)]
pub(crate) struct PcmStage {
    toggles: BTreeMap<String, bool>,
    phase: f32,
}

impl PcmStage {
    pub(crate) fn new(toggles: &BTreeMap<String, bool>) -> Self {
        Self {
            toggles: toggles.clone(),
            phase: 0.0,
        }
    }

    pub(crate) fn toggles(&self) -> &BTreeMap<String, bool> {
        &self.toggles
    }

    pub(crate) fn set(&mut self, name: &str, enabled: bool) {
        self.toggles.insert(name.to_string(), enabled);
    }

    fn enabled(&self, name: &str) -> bool {
        self.toggles.get(name).copied().unwrap_or(false)
    }

    pub(crate) fn process(&mut self, samples: &mut [f32]) {
        let pan = self.enabled("8D");
        let tremolo = self.enabled("tremolo");
        let karaoke = self.enabled("karaoke");
        let mono = self.enabled("mono");
        if !(pan || tremolo || karaoke || mono) {
            return;
        }

        let step = 1.0 / SAMPLE_RATE as f32;
        for frame in samples.chunks_exact_mut(CHANNELS) {
            let (mut left, mut right) = (frame[0], frame[1]);

            if karaoke {
                // center-panned vocals cancel out
                let side = (left - right) * 0.5;
                left = side;
                right = -side;
            }
            if mono {
                let mid = (left + right) * 0.5;
                left = mid;
                right = mid;
            }
            if pan {
                let position = (2.0 * PI * PAN_HZ * self.phase).sin();
                left *= (1.0 - position) * 0.5;
                right *= (1.0 + position) * 0.5;
            }
            if tremolo {
                let gain = 1.0 - TREMOLO_DEPTH * (0.5 + 0.5 * (2.0 * PI * TREMOLO_HZ * self.phase).sin());
                left *= gain;
                right *= gain;
            }

            frame[0] = left;
            frame[1] = right;
            self.phase += step;
        }
        // keep the phase bounded over long streams
        let period = 1.0 / PAN_HZ;
        if self.phase >= period {
            self.phase %= period;
        }
    }
}
