use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, fmt, str::FromStr, time::Duration};
use tracing::{debug, info};

use crate::{
    error::{PlayerError, Result},
    track::Track,
};

/// Modo de repetición
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepeatMode {
    #[default]
    Off,
    Track,
    Queue,
    Autoplay,
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Off => "off",
            Self::Track => "track",
            Self::Queue => "queue",
            Self::Autoplay => "autoplay",
        };
        f.write_str(name)
    }
}

impl FromStr for RepeatMode {
    type Err = PlayerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "off" | "none" => Ok(Self::Off),
            "track" | "song" => Ok(Self::Track),
            "queue" | "all" => Ok(Self::Queue),
            "autoplay" | "auto" => Ok(Self::Autoplay),
            other => Err(PlayerError::InvalidValue(format!(
                "Modo de repetición desconocido: {}",
                other
            ))),
        }
    }
}

/// Estado de reproducción de una cola
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueStatus {
    Idle,
    Connecting,
    Playing,
    Paused,
    Destroyed,
}

/// Why the current track is being left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Advance {
    /// Natural end: every repeat policy applies
    Finished,
    /// Explicit skip: repeat-track does not hold the track
    Skipped,
    /// Stream failure: the track is never re-queued
    Failed,
}

/// Lista ordenada de tracks con actual e historial
#[derive(Debug)]
pub(crate) struct TrackList {
    items: VecDeque<Track>,
    current: Option<Track>,
    history: VecDeque<Track>,
    repeat_mode: RepeatMode,
    max_size: usize,
    max_history: usize,
}

impl TrackList {
    pub(crate) fn new(max_size: usize, max_history: usize, repeat_mode: RepeatMode) -> Self {
        Self {
            items: VecDeque::new(),
            current: None,
            history: VecDeque::new(),
            repeat_mode,
            max_size,
            max_history,
        }
    }

    /// Agrega un track a la cola
    pub(crate) fn push(&mut self, track: Track) -> Result<()> {
        if self.items.len() >= self.max_size {
            return Err(PlayerError::QueueFull(self.max_size));
        }
        info!("➕ Agregado a la cola: {}", track.title());
        self.items.push_back(track);
        Ok(())
    }

    /// Agrega múltiples tracks, truncando al espacio disponible
    pub(crate) fn extend(&mut self, tracks: Vec<Track>) -> Vec<Track> {
        let available = self.max_size.saturating_sub(self.items.len());
        let added: Vec<Track> = tracks.into_iter().take(available).collect();
        self.items.extend(added.iter().cloned());
        info!("➕ Agregadas {} canciones a la cola", added.len());
        added
    }

    pub(crate) fn insert(&mut self, track: Track, index: usize) -> Result<()> {
        if self.items.len() >= self.max_size {
            return Err(PlayerError::QueueFull(self.max_size));
        }
        let index = index.min(self.items.len());
        self.items.insert(index, track);
        debug!("📍 Track insertado en posición {}", index);
        Ok(())
    }

    pub(crate) fn remove(&mut self, index: usize) -> Result<Track> {
        let track = self
            .items
            .remove(index)
            .ok_or(PlayerError::IndexOutOfBounds(index))?;
        debug!("❌ Track eliminado en posición {}", index);
        Ok(track)
    }

    pub(crate) fn remove_by_id(&mut self, id: u64) -> Option<Track> {
        let index = self.items.iter().position(|t| t.id() == id)?;
        self.items.remove(index)
    }

    /// Mueve un track a una nueva posición
    pub(crate) fn move_track(&mut self, from: usize, to: usize) -> Result<()> {
        if from >= self.items.len() {
            return Err(PlayerError::IndexOutOfBounds(from));
        }
        if to >= self.items.len() {
            return Err(PlayerError::IndexOutOfBounds(to));
        }

        if from != to {
            let track = self.remove(from)?;
            self.items.insert(to, track);
            debug!("📍 Track movido de posición {} a {}", from, to);
        }
        Ok(())
    }

    pub(crate) fn swap(&mut self, a: usize, b: usize) -> Result<()> {
        for index in [a, b] {
            if index >= self.items.len() {
                return Err(PlayerError::IndexOutOfBounds(index));
            }
        }
        self.items.swap(a, b);
        Ok(())
    }

    /// Limpia la cola
    pub(crate) fn clear(&mut self) {
        self.items.clear();
        info!("🗑️ Cola limpiada");
    }

    /// Mezcla la cola
    pub(crate) fn shuffle(&mut self) {
        let mut rng = rand::thread_rng();
        self.items.make_contiguous().shuffle(&mut rng);
        info!("🔀 Cola mezclada");
    }

    /// Deja el track actual y devuelve el siguiente según el modo de repetición
    pub(crate) fn advance(&mut self, reason: Advance) -> Option<Track> {
        if let Some(finished) = self.current.take() {
            match (reason, self.repeat_mode) {
                (Advance::Finished, RepeatMode::Track) => {
                    info!("🔂 Repitiendo track: {}", finished.title());
                    self.current = Some(finished.clone());
                    return Some(finished);
                }
                (Advance::Finished | Advance::Skipped, RepeatMode::Queue) => {
                    debug!("🔁 Track agregado al final por loop de cola: {}", finished.title());
                    self.items.push_back(finished.clone());
                    self.push_history(finished);
                }
                _ => self.push_history(finished),
            }
        }

        self.current = self.items.pop_front();
        match &self.current {
            Some(next) => info!("➡️ Siguiente en cola: {}", next.title()),
            None => info!("📭 Cola vacía, no hay siguiente track"),
        }
        self.current.clone()
    }

    /// Salta hasta `index`; los anteriores pasan al historial
    pub(crate) fn skip_to(&mut self, index: usize) -> Result<()> {
        if index >= self.items.len() {
            return Err(PlayerError::IndexOutOfBounds(index));
        }
        for track in self.items.drain(..index).collect::<Vec<_>>() {
            self.push_history(track);
        }
        Ok(())
    }

    /// Vuelve al track anterior; el actual regresa al frente de la cola
    pub(crate) fn rewind(&mut self) -> Option<Track> {
        let previous = self.history.pop_back()?;
        if let Some(current) = self.current.take() {
            self.items.push_front(current);
        }
        self.current = Some(previous.clone());
        Some(previous)
    }

    /// Reemplaza el actual por un track explícito
    pub(crate) fn set_current(&mut self, track: Track) {
        if let Some(previous) = self.current.replace(track) {
            self.push_history(previous);
        }
    }

    /// Drops the current track into history without picking a new one.
    pub(crate) fn finish_current(&mut self) {
        if let Some(current) = self.current.take() {
            self.push_history(current);
        }
    }

    pub(crate) fn items(&self) -> Vec<Track> {
        self.items.iter().cloned().collect()
    }

    pub(crate) fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub(crate) fn history(&self) -> Vec<Track> {
        self.history.iter().cloned().collect()
    }

    pub(crate) fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    /// Cambia el modo de repetición
    pub(crate) fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat_mode = mode;
        match mode {
            RepeatMode::Off => info!("➡️ Repetición desactivada"),
            RepeatMode::Track => info!("🔂 Repetir canción activado"),
            RepeatMode::Queue => info!("🔁 Repetir cola activado"),
            RepeatMode::Autoplay => info!("📻 Autoplay activado"),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn total_duration(&self) -> Duration {
        let queued: Duration = self.items.iter().filter_map(Track::duration).sum();
        let current = self
            .current
            .as_ref()
            .and_then(Track::duration)
            .unwrap_or_default();
        queued + current
    }

    pub(crate) fn reset(&mut self) {
        self.items.clear();
        self.finish_current();
    }

    fn push_history(&mut self, track: Track) {
        self.history.push_back(track);
        // Mantener solo los últimos N items
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
    }
}

/// Página de la cola para listados
#[derive(Debug, Clone)]
pub struct QueuePage {
    pub tracks: Vec<Track>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_tracks: usize,
}

impl QueuePage {
    /// Obtiene una página específica (empezando en 1)
    pub fn from_tracks(tracks: &[Track], page: usize, per_page: usize) -> Self {
        let per_page = per_page.max(1);
        let total_pages = tracks.len().div_ceil(per_page).max(1);
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * per_page;
        let end = (start + per_page).min(tracks.len());

        Self {
            tracks: tracks.get(start..end).map(<[Track]>::to_vec).unwrap_or_default(),
            current_page,
            total_pages,
            total_tracks: tracks.len(),
        }
    }
}
