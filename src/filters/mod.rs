//! Audio filter graph
//!
//! Stage order is fixed: FFmpeg presets → 10-band equalizer → biquad →
//! PCM toggles → volume → resampler. The FFmpeg stage and the output sample
//! rate are fixed when a stream opens, so changing them restarts the stream
//! (the queue replays from the elapsed position). Every other stage is
//! applied live on the stream's [`DspChain`].

pub mod biquad;
pub mod equalizer;
pub mod ffmpeg;
pub mod pcm;
pub mod resampler;

use parking_lot::Mutex;
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    sync::Arc,
};
use tracing::debug;

pub use biquad::{BiquadFilter, BiquadKind};
pub use equalizer::{EqPreset, EqPresets, EQ_BANDS, EQ_FREQUENCIES};

use crate::error::{PlayerError, Result};
use biquad::Biquad;
use equalizer::Equalizer;
use ffmpeg::FfmpegStage;
use pcm::PcmStage;
use resampler::ResamplerStage;

/// Frecuencia de muestreo del PCM interno
pub const SAMPLE_RATE: u32 = 48_000;
/// Audio intercalado en estéreo
pub const CHANNELS: usize = 2;

pub const MIN_VOLUME: f32 = 0.0;
pub const MAX_VOLUME: f32 = 2.0;

const SAMPLE_RATE_RANGE: std::ops::RangeInclusive<u32> = 8_000..=192_000;

/// Snapshot of every stage of the graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterState {
    pub ffmpeg: Vec<String>,
    pub equalizer: [f32; EQ_BANDS],
    pub biquad: Option<BiquadFilter>,
    pub pcm: BTreeMap<String, bool>,
    pub volume: f32,
    pub sample_rate: Option<u32>,
}

/// Selección de presets FFmpeg: todos/ninguno o una lista de nombres
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterSelection {
    All(bool),
    Names(Vec<String>),
}

impl From<bool> for FilterSelection {
    fn from(all: bool) -> Self {
        Self::All(all)
    }
}

impl From<Vec<String>> for FilterSelection {
    fn from(names: Vec<String>) -> Self {
        Self::Names(names)
    }
}

impl From<Vec<&str>> for FilterSelection {
    fn from(names: Vec<&str>) -> Self {
        Self::Names(names.into_iter().map(String::from).collect())
    }
}

impl From<&[&str]> for FilterSelection {
    fn from(names: &[&str]) -> Self {
        Self::Names(names.iter().map(|n| n.to_string()).collect())
    }
}

impl From<BTreeSet<String>> for FilterSelection {
    fn from(names: BTreeSet<String>) -> Self {
        Self::Names(names.into_iter().collect())
    }
}

impl From<HashSet<String>> for FilterSelection {
    fn from(names: HashSet<String>) -> Self {
        Self::Names(names.into_iter().collect())
    }
}

impl<const N: usize> From<[&str; N]> for FilterSelection {
    fn from(names: [&str; N]) -> Self {
        Self::Names(names.iter().map(|n| n.to_string()).collect())
    }
}

/// Result of a graph mutation that actually changed something.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterChange {
    pub old: FilterState,
    pub new: FilterState,
    /// The FFmpeg chain changed, the stream has to be restarted.
    pub replay: bool,
    /// A rate-altering preset was added or removed.
    pub pitch_changed: bool,
}

/// Cadena DSP en vivo para un stream
#[derive(Debug)]
pub struct DspChain {
    equalizer: Equalizer,
    biquad: Option<(BiquadFilter, Biquad)>,
    pcm: PcmStage,
    volume: f32,
    resampler: Option<ResamplerStage>,
}

impl DspChain {
    pub(crate) fn from_state(state: &FilterState) -> Result<Self> {
        let resampler = match state.sample_rate {
            Some(rate) if rate != SAMPLE_RATE => Some(ResamplerStage::new(rate)?),
            _ => None,
        };

        Ok(Self {
            equalizer: Equalizer::new(state.equalizer),
            biquad: state.biquad.map(|filter| (filter, Biquad::new(&filter))),
            pcm: PcmStage::new(&state.pcm),
            volume: state.volume,
            resampler,
        })
    }

    /// Aplica ecualizador, biquad, PCM y volumen sobre PCM intercalado a 48 kHz
    pub fn process(&mut self, samples: &mut [f32]) {
        if !self.equalizer.is_flat() {
            self.equalizer.process(samples);
        }
        if let Some((_, biquad)) = &mut self.biquad {
            biquad.process(samples);
        }
        self.pcm.process(samples);
        if (self.volume - 1.0).abs() > f32::EPSILON {
            for sample in samples.iter_mut() {
                *sample *= self.volume;
            }
        }
    }

    /// Convierte a la frecuencia objetivo; sin resampler devuelve una copia
    pub fn resample(&mut self, samples: &[f32]) -> Vec<f32> {
        match &mut self.resampler {
            Some(resampler) => resampler.process(samples),
            None => samples.to_vec(),
        }
    }

    pub fn output_sample_rate(&self) -> u32 {
        self.resampler
            .as_ref()
            .map(ResamplerStage::target)
            .unwrap_or(SAMPLE_RATE)
    }

    fn set_equalizer(&mut self, gains: [f32; EQ_BANDS]) {
        self.equalizer = Equalizer::new(gains);
    }

    fn set_biquad(&mut self, filter: Option<BiquadFilter>) {
        self.biquad = filter.map(|filter| (filter, Biquad::new(&filter)));
    }

    fn set_pcm(&mut self, name: &str, enabled: bool) {
        self.pcm.set(name, enabled);
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    fn fill(&self, state: &mut FilterState) {
        state.equalizer = self.equalizer.gains();
        state.biquad = self.biquad.as_ref().map(|(filter, _)| *filter);
        state.pcm = self.pcm.toggles().clone();
        state.volume = self.volume;
        state.sample_rate = self.resampler.as_ref().map(ResamplerStage::target);
    }
}

/// Grafo de filtros de una cola
#[derive(Debug)]
pub struct FilterGraph {
    ffmpeg: FfmpegStage,
    equalizer: [f32; EQ_BANDS],
    biquad: Option<BiquadFilter>,
    pcm: BTreeMap<String, bool>,
    volume: f32,
    sample_rate: Option<u32>,
    dispatcher: Option<Arc<Mutex<DspChain>>>,
}

impl Default for FilterGraph {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl FilterGraph {
    pub fn new(volume: f32) -> Self {
        Self {
            ffmpeg: FfmpegStage::default(),
            equalizer: [0.0; EQ_BANDS],
            biquad: None,
            pcm: BTreeMap::new(),
            volume: volume.clamp(MIN_VOLUME, MAX_VOLUME),
            sample_rate: None,
            dispatcher: None,
        }
    }

    /// Reemplaza la selección de presets FFmpeg
    pub fn set_filters(&mut self, selection: impl Into<FilterSelection>) -> Result<Option<FilterChange>> {
        let selection = Self::resolve(selection.into())?;
        self.apply(true, |graph| Ok(graph.ffmpeg.set(selection)))
    }

    /// Invierte los presets indicados
    pub fn toggle_filters(&mut self, names: &[&str]) -> Result<Option<FilterChange>> {
        if let Some(unknown) = names.iter().find(|name| !ffmpeg::is_known(name)) {
            return Err(PlayerError::UnknownFilter(unknown.to_string()));
        }
        self.apply(true, |graph| Ok(graph.ffmpeg.toggle(names.iter().copied())))
    }

    pub fn enabled_filters(&self) -> Vec<String> {
        self.ffmpeg.enabled().iter().cloned().collect()
    }

    pub fn disabled_filters(&self) -> Vec<&'static str> {
        ffmpeg::names()
            .filter(|name| !self.ffmpeg.is_enabled(name))
            .collect()
    }

    pub fn is_filter_enabled(&self, name: &str) -> bool {
        self.ffmpeg.is_enabled(name)
    }

    pub fn set_equalizer(&mut self, gains: [f32; EQ_BANDS]) -> Result<Option<FilterChange>> {
        equalizer::validate_gains(&gains)?;
        self.apply(false, |graph| {
            if graph.equalizer == gains {
                return Ok(false);
            }
            graph.equalizer = gains;
            graph.live(|chain| chain.set_equalizer(gains));
            Ok(true)
        })
    }

    pub fn set_equalizer_preset(&mut self, name: &str) -> Result<Option<FilterChange>> {
        let preset = EqPresets::get(name).ok_or_else(|| PlayerError::UnknownFilter(name.to_string()))?;
        self.set_equalizer(preset.gains)
    }

    pub fn set_biquad(&mut self, filter: Option<BiquadFilter>) -> Result<Option<FilterChange>> {
        if let Some(f) = &filter {
            if !f.is_valid() {
                return Err(PlayerError::InvalidValue(format!(
                    "Biquad inválido: cutoff {} Hz, q {}",
                    f.cutoff, f.q
                )));
            }
        }
        self.apply(false, |graph| {
            if graph.biquad == filter {
                return Ok(false);
            }
            graph.biquad = filter;
            graph.live(|chain| chain.set_biquad(filter));
            Ok(true)
        })
    }

    pub fn set_pcm(&mut self, name: &str, enabled: bool) -> Result<Option<FilterChange>> {
        if !pcm::is_known(name) {
            return Err(PlayerError::UnknownFilter(name.to_string()));
        }
        self.apply(false, |graph| {
            if graph.pcm.get(name).copied().unwrap_or(false) == enabled {
                return Ok(false);
            }
            graph.pcm.insert(name.to_string(), enabled);
            graph.live(|chain| chain.set_pcm(name, enabled));
            Ok(true)
        })
    }

    pub fn toggle_pcm(&mut self, name: &str) -> Result<Option<FilterChange>> {
        let enabled = self.pcm.get(name).copied().unwrap_or(false);
        self.set_pcm(name, !enabled)
    }

    pub fn set_sample_rate(&mut self, rate: Option<u32>) -> Result<Option<FilterChange>> {
        if let Some(rate) = rate {
            if !SAMPLE_RATE_RANGE.contains(&rate) {
                return Err(PlayerError::InvalidValue(format!(
                    "Frecuencia de muestreo fuera de rango: {} Hz",
                    rate
                )));
            }
        }
        self.apply(true, |graph| {
            if graph.sample_rate == rate {
                return Ok(false);
            }
            graph.sample_rate = rate;
            Ok(true)
        })
    }

    /// Ajusta el volumen (0.0 - 2.0), devuelve (anterior, nuevo)
    pub fn set_volume(&mut self, volume: f32) -> (f32, f32) {
        let old = self.volume;
        let new = volume.clamp(MIN_VOLUME, MAX_VOLUME);
        self.volume = new;
        self.live(|chain| chain.set_volume(new));
        (old, new)
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Cadena `-af` para transportes que lanzan FFmpeg
    pub fn ffmpeg_args(&self) -> Option<String> {
        self.ffmpeg.to_args()
    }

    /// Crea una cadena DSP nueva para el próximo stream
    pub fn rebuild_dispatcher(&mut self) -> Result<Arc<Mutex<DspChain>>> {
        let chain = Arc::new(Mutex::new(DspChain::from_state(&self.state())?));
        self.dispatcher = Some(Arc::clone(&chain));
        debug!("🎛️ Cadena DSP reconstruida");
        Ok(chain)
    }

    pub fn dispatcher(&self) -> Option<Arc<Mutex<DspChain>>> {
        self.dispatcher.clone()
    }

    pub fn clear_dispatcher(&mut self) {
        self.dispatcher = None;
    }

    pub fn is_streaming(&self) -> bool {
        self.dispatcher.is_some()
    }

    /// Estado en vivo si hay stream activo, el cacheado si no
    pub fn dump(&self) -> FilterState {
        let mut state = self.state();
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.lock().fill(&mut state);
        }
        state
    }

    /// Cached configuration, independent of any live stream.
    pub fn state(&self) -> FilterState {
        FilterState {
            ffmpeg: self.enabled_filters(),
            equalizer: self.equalizer,
            biquad: self.biquad,
            pcm: self.pcm.clone(),
            volume: self.volume,
            sample_rate: self.sample_rate,
        }
    }

    fn resolve(selection: FilterSelection) -> Result<BTreeSet<String>> {
        match selection {
            FilterSelection::All(true) => Ok(ffmpeg::names().map(String::from).collect()),
            FilterSelection::All(false) => Ok(BTreeSet::new()),
            FilterSelection::Names(names) => names
                .into_iter()
                .map(|name| {
                    if ffmpeg::is_known(&name) {
                        Ok(name)
                    } else {
                        Err(PlayerError::UnknownFilter(name))
                    }
                })
                .collect(),
        }
    }

    fn live(&self, update: impl FnOnce(&mut DspChain)) {
        if let Some(dispatcher) = &self.dispatcher {
            update(&mut *dispatcher.lock());
        }
    }

    fn apply(
        &mut self,
        replay: bool,
        update: impl FnOnce(&mut Self) -> Result<bool>,
    ) -> Result<Option<FilterChange>> {
        let old = self.state();
        let old_pitch: BTreeSet<String> = self
            .ffmpeg
            .pitch_presets()
            .into_iter()
            .map(String::from)
            .collect();

        if !update(self)? {
            return Ok(None);
        }

        let pitch_changed = self
            .ffmpeg
            .pitch_presets()
            .into_iter()
            .ne(old_pitch.iter().map(String::as_str));

        Ok(Some(FilterChange {
            old,
            new: self.state(),
            replay,
            pitch_changed,
        }))
    }
}
