//! Programmable filter stage: named presets rendered into an FFmpeg `-af`
//! chain. Transports that spawn FFmpeg receive the rendered string; the
//! stage itself only tracks which presets are enabled.

use std::collections::BTreeSet;

/// Catálogo de presets FFmpeg (nombre, cadena de filtros)
pub const FFMPEG_PRESETS: &[(&str, &str)] = &[
    ("bassboost_low", "bass=g=15:f=110:w=0.3"),
    ("bassboost", "bass=g=20:f=110:w=0.3"),
    ("bassboost_high", "bass=g=30:f=110:w=0.3"),
    ("8D", "apulsator=hz=0.09"),
    ("vaporwave", "aresample=48000,asetrate=48000*0.8"),
    ("nightcore", "aresample=48000,asetrate=48000*1.25"),
    ("lofi", "aresample=48000,asetrate=48000*0.9,extrastereo=m=2.5:c=disabled"),
    ("phaser", "aphaser=in_gain=0.4"),
    ("tremolo", "tremolo"),
    ("vibrato", "vibrato=f=6.5"),
    ("reverse", "areverse"),
    ("treble", "treble=g=5"),
    ("normalizer", "dynaudnorm=g=101"),
    ("normalizer2", "acompressor"),
    ("surrounding", "surround"),
    ("pulsator", "apulsator=hz=1"),
    ("subboost", "asubboost"),
    ("karaoke", "stereotools=mlev=0.03"),
    ("flanger", "flanger"),
    ("gate", "agate"),
    ("haas", "haas"),
    ("mcompand", "mcompand"),
    ("mono", "pan=mono|c0=.5*c0+.5*c1"),
    ("mstlr", "stereotools=mode=ms>lr"),
    ("mstrr", "stereotools=mode=ms>rr"),
    ("compressor", "compand=points=-80/-105|-62/-80|-15.4/-15.4|0/-12|20/-7.6"),
    ("expander", "compand=attacks=0.0001:decays=0.0001:points=-80/-169|-54/-80|-49.5/-64.6|-41.1/-41.1|-25.8/-15|-10.8/-4.5|0/0|20/8.3"),
    ("softlimiter", "compand=attacks=0:points=-80/-80|-12.4/-12.4|-6/-8|0/-6.8|20/-2.8"),
    ("chorus", "chorus=0.7:0.9:55:0.4:0.25:2"),
    ("chorus2d", "chorus=0.6:0.9:50|60:0.4|0.32:0.25|0.4:2|1.3"),
    ("chorus3d", "chorus=0.5:0.9:50|60|40:0.4|0.32|0.3:0.25|0.4|0.3:2|2.3|1.3"),
    ("fadein", "afade=t=in:ss=0:d=10"),
    ("earrape", "channelsplit,sidechaingate=level_in=64"),
    ("silenceremove", "silenceremove=1:0:-50dB"),
];

/// Presets que alteran la velocidad de reproducción
pub const PITCH_PRESETS: &[&str] = &["nightcore", "vaporwave", "lofi"];

pub fn preset(name: &str) -> Option<&'static str> {
    FFMPEG_PRESETS
        .iter()
        .find(|(preset, _)| *preset == name)
        .map(|(_, args)| *args)
}

pub fn is_known(name: &str) -> bool {
    preset(name).is_some()
}

pub fn names() -> impl Iterator<Item = &'static str> {
    FFMPEG_PRESETS.iter().map(|(name, _)| *name)
}

/// Set of enabled FFmpeg presets, kept in catalog order when rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FfmpegStage {
    enabled: BTreeSet<String>,
}

impl FfmpegStage {
    pub(crate) fn enabled(&self) -> &BTreeSet<String> {
        &self.enabled
    }

    pub(crate) fn is_enabled(&self, name: &str) -> bool {
        self.enabled.contains(name)
    }

    /// Reemplaza la selección; devuelve `false` si no hubo cambios
    pub(crate) fn set(&mut self, selection: BTreeSet<String>) -> bool {
        if self.enabled == selection {
            return false;
        }
        self.enabled = selection;
        true
    }

    /// Invierte cada preset indicado
    pub(crate) fn toggle<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) -> bool {
        let mut changed = false;
        for name in names {
            if !self.enabled.remove(name) {
                self.enabled.insert(name.to_string());
            }
            changed = true;
        }
        changed
    }

    pub(crate) fn pitch_presets(&self) -> BTreeSet<&str> {
        self.enabled
            .iter()
            .map(String::as_str)
            .filter(|name| PITCH_PRESETS.contains(name))
            .collect()
    }

    /// Renderiza la cadena `-af`, `None` si no hay presets activos
    pub(crate) fn to_args(&self) -> Option<String> {
        let chain: Vec<&str> = FFMPEG_PRESETS
            .iter()
            .filter(|(name, _)| self.enabled.contains(*name))
            .map(|(_, args)| *args)
            .collect();

        if chain.is_empty() {
            None
        } else {
            Some(chain.join(","))
        }
    }
}
