//! # Guild queue
//!
//! One [`GuildQueue`] per guild drives playback: it owns the ordered track
//! list, the [`FilterGraph`], the voice connection and the per-guild timers.
//!
//! Connecting, every mutation that can (re)start a stream and every filter
//! change run under the queue's [`TaskQueue`] ticket, so two concurrent
//! `play` calls observe each other's full effect in ticket order. Plain list edits are synchronous and take
//! only the state mutex, which is never held across an `.await`.
//!
//! Once [`GuildQueue::delete`] has run the queue is inert: every operation
//! returns early and no further events are published.

pub mod state;
pub mod voice;

use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, error, info, warn};

pub use state::{QueuePage, QueueStatus, RepeatMode};
pub use voice::{VoiceSnapshot, VoiceStateDiff, VoiceStateHandler};

use crate::{
    error::{PlayerError, Result},
    events::{EventBus, PlayerEvent},
    filters::{BiquadFilter, FilterChange, FilterGraph, FilterSelection, FilterState, EQ_BANDS},
    search::ExtractorPipeline,
    task_queue::TaskQueue,
    track::{Playlist, Track},
    transport::{ConnectionEvent, PreparedStream, VoiceConnection, VoiceTransport},
};
use state::{Advance, TrackList};

pub(crate) type QueueRegistry = DashMap<GuildId, Arc<GuildQueue>>;

/// Opciones de una cola
#[derive(Debug, Clone)]
pub struct GuildQueueOptions {
    /// 0.0 - 2.0
    pub volume: f32,
    pub max_queue_size: usize,
    pub max_history: usize,
    pub repeat_mode: RepeatMode,
    pub leave_on_empty: bool,
    pub leave_on_empty_cooldown: Duration,
    pub leave_on_end: bool,
    pub leave_on_end_cooldown: Duration,
    pub pause_on_empty: bool,
}

impl Default for GuildQueueOptions {
    fn default() -> Self {
        Self {
            volume: 0.5,
            max_queue_size: 1000,
            max_history: 50,
            repeat_mode: RepeatMode::Off,
            leave_on_empty: true,
            leave_on_empty_cooldown: Duration::from_secs(60),
            leave_on_end: true,
            leave_on_end_cooldown: Duration::from_secs(60),
            pause_on_empty: true,
        }
    }
}

/// Opciones para `GuildQueue::play`
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackPlayOptions {
    /// Offset to start from.
    pub seek: Duration,
    /// Restart of the current track: no history entry, no `TrackStart`.
    pub transition: bool,
}

/// Shared handles every queue needs from its player.
#[derive(Clone)]
pub(crate) struct QueueContext {
    pub(crate) pipeline: Arc<ExtractorPipeline>,
    pub(crate) transport: Arc<dyn VoiceTransport>,
    pub(crate) events: EventBus,
    pub(crate) registry: Weak<QueueRegistry>,
}

struct ActiveStream {
    id: u64,
    track: Track,
    started_at: Instant,
    offset: Duration,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

impl ActiveStream {
    fn new(id: u64, track: Track, offset: Duration) -> Self {
        Self {
            id,
            track,
            started_at: Instant::now(),
            offset,
            paused_at: None,
            paused_total: Duration::ZERO,
        }
    }

    /// Tiempo reproducido, sin contar pausas
    fn elapsed(&self) -> Duration {
        let until = self.paused_at.unwrap_or_else(Instant::now);
        until
            .saturating_duration_since(self.started_at)
            .saturating_sub(self.paused_total)
            + self.offset
    }

    fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    fn set_paused(&mut self, paused: bool) {
        match (paused, self.paused_at) {
            (true, None) => self.paused_at = Some(Instant::now()),
            (false, Some(since)) => {
                self.paused_total += since.elapsed();
                self.paused_at = None;
            }
            _ => {}
        }
    }
}

struct Inner {
    status: QueueStatus,
    list: TrackList,
    connection: Option<Arc<dyn VoiceConnection>>,
    connection_gen: u64,
    channel_id: Option<ChannelId>,
    stream: Option<ActiveStream>,
    next_stream_id: u64,
    channel_empty: bool,
    paused_by_empty: bool,
}

#[derive(Default)]
struct Timers {
    empty: Option<JoinHandle<()>>,
    end: Option<JoinHandle<()>>,
}

/// Cola de reproducción de una guild
pub struct GuildQueue {
    guild_id: GuildId,
    options: GuildQueueOptions,
    ctx: QueueContext,
    tasks: TaskQueue,
    inner: Mutex<Inner>,
    filters: Mutex<FilterGraph>,
    timers: Mutex<Timers>,
    destroyed: AtomicBool,
    shutdown: watch::Sender<bool>,
    me: Weak<GuildQueue>,
}

impl GuildQueue {
    pub(crate) fn new(guild_id: GuildId, options: GuildQueueOptions, ctx: QueueContext) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            guild_id,
            tasks: TaskQueue::new(),
            inner: Mutex::new(Inner {
                status: QueueStatus::Idle,
                list: TrackList::new(options.max_queue_size, options.max_history, options.repeat_mode),
                connection: None,
                connection_gen: 0,
                channel_id: None,
                stream: None,
                next_stream_id: 0,
                channel_empty: false,
                paused_by_empty: false,
            }),
            filters: Mutex::new(FilterGraph::new(options.volume)),
            timers: Mutex::new(Timers::default()),
            destroyed: AtomicBool::new(false),
            shutdown: watch::channel(false).0,
            me: me.clone(),
            options,
            ctx,
        })
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn options(&self) -> &GuildQueueOptions {
        &self.options
    }

    /// Serializes work on this guild; see [`TaskQueue`].
    pub fn tasks(&self) -> &TaskQueue {
        &self.tasks
    }

    pub fn status(&self) -> QueueStatus {
        self.inner.lock().status
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn is_playing(&self) -> bool {
        self.status() == QueueStatus::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.status() == QueueStatus::Paused
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().connection.is_some()
    }

    pub fn channel_id(&self) -> Option<ChannelId> {
        self.inner.lock().channel_id
    }

    // ---- conexión ----

    /// Conecta (o mueve) la cola a un canal de voz
    pub async fn connect(&self, channel_id: ChannelId) -> Result<()> {
        let _guard = self.tasks.acquire().wait().await;
        self.connect_locked(channel_id).await
    }

    /// Como `connect`, para quien ya tiene el ticket
    pub(crate) async fn connect_locked(&self, channel_id: ChannelId) -> Result<()> {
        if self.is_destroyed() {
            return Ok(());
        }

        let (previous, generation) = {
            let mut inner = self.inner.lock();
            if inner.channel_id == Some(channel_id) && inner.connection.is_some() {
                return Ok(());
            }
            // events of the replaced connection become stale from here on
            inner.connection_gen += 1;
            inner.status = QueueStatus::Connecting;
            inner.stream = None;
            (inner.connection.take(), inner.connection_gen)
        };
        if let Some(previous) = previous {
            let _ = previous.disconnect().await;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let connection = match self.ctx.transport.connect(self.guild_id, channel_id, tx).await {
            Ok(connection) => connection,
            Err(e) => {
                error!("❌ Error al conectar en guild {}: {}", self.guild_id, e);
                {
                    let mut inner = self.inner.lock();
                    if inner.status == QueueStatus::Connecting {
                        inner.status = QueueStatus::Idle;
                    }
                    inner.channel_id = None;
                }
                self.emit(PlayerEvent::Error {
                    guild_id: self.guild_id,
                    message: e.to_string(),
                });
                return Err(e.into());
            }
        };

        if self.is_destroyed() {
            let _ = connection.disconnect().await;
            return Ok(());
        }

        {
            let mut inner = self.inner.lock();
            inner.connection = Some(connection);
            inner.channel_id = Some(channel_id);
            inner.channel_empty = false;
            if inner.status == QueueStatus::Connecting {
                inner.status = QueueStatus::Idle;
            }
        }

        tokio::spawn(run_connection_events(
            self.me.clone(),
            rx,
            generation,
            self.shutdown.subscribe(),
        ));

        info!("🔗 Conectado al canal {} en guild {}", channel_id, self.guild_id);
        self.emit(PlayerEvent::Connection {
            guild_id: self.guild_id,
            channel_id,
        });
        Ok(())
    }

    pub(crate) fn set_channel(&self, channel_id: ChannelId) {
        self.inner.lock().channel_id = Some(channel_id);
    }

    async fn on_connection_event(&self, event: ConnectionEvent, generation: u64) {
        if self.is_destroyed() {
            return;
        }

        match event {
            ConnectionEvent::Disconnected => {
                if self.inner.lock().connection_gen == generation {
                    warn!("🔌 Conexión de voz perdida en guild {}", self.guild_id);
                    self.delete().await;
                }
            }
            ConnectionEvent::TrackEnd { stream_id } => {
                let _guard = self.tasks.acquire().wait().await;
                let Some(track) = self.take_stream(stream_id) else {
                    return;
                };
                debug!("⏹️ Stream {} terminó en guild {}", stream_id, self.guild_id);
                self.emit(PlayerEvent::TrackEnd {
                    guild_id: self.guild_id,
                    track,
                });
                self.advance(Advance::Finished).await;
            }
            ConnectionEvent::TrackError { stream_id, message } => {
                let _guard = self.tasks.acquire().wait().await;
                let Some(track) = self.take_stream(stream_id) else {
                    return;
                };
                error!("❌ Error de stream en guild {}: {}", self.guild_id, message);
                self.emit(PlayerEvent::PlayerError {
                    guild_id: self.guild_id,
                    track,
                    message,
                });
                self.advance(Advance::Failed).await;
            }
        }
    }

    /// Quita el stream activo si `stream_id` es el vigente
    fn take_stream(&self, stream_id: u64) -> Option<Track> {
        let mut inner = self.inner.lock();
        if inner.stream.as_ref().map(|s| s.id) != Some(stream_id) {
            debug!("Evento de stream {} obsoleto, ignorado", stream_id);
            return None;
        }
        inner.stream.take().map(|s| s.track)
    }

    // ---- lista ----

    /// Agrega un track a la cola
    pub fn add_track(&self, track: Track) -> Result<()> {
        if self.is_destroyed() {
            return Ok(());
        }
        self.inner.lock().list.push(track.clone())?;
        self.cancel_end_timer();
        self.emit(PlayerEvent::TrackAdd {
            guild_id: self.guild_id,
            track,
        });
        Ok(())
    }

    /// Agrega varios tracks; devuelve los que cupieron
    pub fn add_tracks(&self, tracks: Vec<Track>) -> Vec<Track> {
        if self.is_destroyed() || tracks.is_empty() {
            return Vec::new();
        }
        let requested = tracks.len();
        let added = self.inner.lock().list.extend(tracks);
        if added.len() < requested {
            warn!(
                "⚠️ Cola llena en guild {}: {} de {} canciones agregadas",
                self.guild_id,
                added.len(),
                requested
            );
        }
        if !added.is_empty() {
            self.cancel_end_timer();
            self.emit(PlayerEvent::TracksAdd {
                guild_id: self.guild_id,
                tracks: added.clone(),
            });
        }
        added
    }

    pub fn add_playlist(&self, playlist: Playlist) -> Vec<Track> {
        info!("📃 Agregando playlist: {}", playlist.title);
        self.add_tracks(playlist.tracks)
    }

    pub fn insert_track(&self, track: Track, index: usize) -> Result<()> {
        if self.is_destroyed() {
            return Ok(());
        }
        self.inner.lock().list.insert(track.clone(), index)?;
        self.cancel_end_timer();
        self.emit(PlayerEvent::TrackAdd {
            guild_id: self.guild_id,
            track,
        });
        Ok(())
    }

    pub fn remove_track(&self, index: usize) -> Result<Option<Track>> {
        if self.is_destroyed() {
            return Ok(None);
        }
        self.inner.lock().list.remove(index).map(Some)
    }

    pub fn remove_track_by_id(&self, id: u64) -> Option<Track> {
        if self.is_destroyed() {
            return None;
        }
        self.inner.lock().list.remove_by_id(id)
    }

    pub fn move_track(&self, from: usize, to: usize) -> Result<()> {
        if self.is_destroyed() {
            return Ok(());
        }
        self.inner.lock().list.move_track(from, to)
    }

    pub fn swap_tracks(&self, a: usize, b: usize) -> Result<()> {
        if self.is_destroyed() {
            return Ok(());
        }
        self.inner.lock().list.swap(a, b)
    }

    pub fn clear(&self) {
        if !self.is_destroyed() {
            self.inner.lock().list.clear();
        }
    }

    pub fn shuffle(&self) {
        if !self.is_destroyed() {
            self.inner.lock().list.shuffle();
        }
    }

    pub fn tracks(&self) -> Vec<Track> {
        self.inner.lock().list.items()
    }

    pub fn size(&self) -> usize {
        self.inner.lock().list.len()
    }

    pub fn page(&self, page: usize, per_page: usize) -> QueuePage {
        QueuePage::from_tracks(&self.tracks(), page, per_page)
    }

    pub fn current_track(&self) -> Option<Track> {
        self.inner.lock().list.current().cloned()
    }

    pub fn history(&self) -> Vec<Track> {
        self.inner.lock().list.history()
    }

    pub fn total_duration(&self) -> Duration {
        self.inner.lock().list.total_duration()
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.inner.lock().list.repeat_mode()
    }

    pub fn set_repeat_mode(&self, mode: RepeatMode) {
        if !self.is_destroyed() {
            self.inner.lock().list.set_repeat_mode(mode);
        }
    }

    // ---- reproducción ----

    /// Reproduce un track concreto
    pub async fn play(&self, track: Track, options: TrackPlayOptions) -> Result<()> {
        let _guard = self.tasks.acquire().wait().await;
        if self.is_destroyed() {
            return Ok(());
        }
        if !options.transition {
            self.inner.lock().list.set_current(track.clone());
        }
        self.start_stream(track, options.seek, options.transition).await
    }

    /// Arranca la cola si no hay stream activo. El llamador tiene el ticket.
    pub(crate) async fn ensure_playing(&self) {
        let idle = {
            let inner = self.inner.lock();
            inner.stream.is_none() && inner.connection.is_some()
        };
        if idle && !self.is_destroyed() {
            self.advance(Advance::Finished).await;
        }
    }

    /// Salta el track actual
    pub async fn skip(&self) -> Result<bool> {
        let _guard = self.tasks.acquire().wait().await;
        if self.is_destroyed() {
            return Ok(false);
        }
        let Some(stream) = self.inner.lock().stream.take() else {
            return Ok(false);
        };
        info!("⏭️ Saltando: {}", stream.track.title());
        self.emit(PlayerEvent::TrackSkip {
            guild_id: self.guild_id,
            track: stream.track,
        });
        self.advance(Advance::Skipped).await;
        Ok(true)
    }

    /// Salta directamente a la posición `index` de la cola
    pub async fn skip_to(&self, index: usize) -> Result<()> {
        let _guard = self.tasks.acquire().wait().await;
        if self.is_destroyed() {
            return Ok(());
        }
        let skipped = {
            let mut inner = self.inner.lock();
            inner.list.skip_to(index)?;
            inner.stream.take()
        };
        if let Some(stream) = skipped {
            self.emit(PlayerEvent::TrackSkip {
                guild_id: self.guild_id,
                track: stream.track,
            });
        }
        self.advance(Advance::Skipped).await;
        Ok(())
    }

    /// Vuelve a reproducir el track anterior del historial
    pub async fn back(&self) -> Result<bool> {
        let _guard = self.tasks.acquire().wait().await;
        if self.is_destroyed() {
            return Ok(false);
        }
        let previous = {
            let mut inner = self.inner.lock();
            let previous = inner.list.rewind();
            if previous.is_some() {
                inner.stream = None;
            }
            previous
        };
        let Some(previous) = previous else {
            return Ok(false);
        };

        info!("⏮️ Volviendo a: {}", previous.title());
        if let Err(e) = self.start_stream(previous, Duration::ZERO, false).await {
            warn!("⚠️ No se pudo volver al track anterior: {}", e);
            self.advance(Advance::Failed).await;
        }
        Ok(true)
    }

    /// Vacía la cola y detiene el stream, manteniendo la conexión
    pub async fn stop(&self) {
        let _guard = self.tasks.acquire().wait().await;
        if self.is_destroyed() {
            return;
        }
        {
            let mut inner = self.inner.lock();
            inner.list.reset();
            inner.stream = None;
        }
        info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
        self.finish().await;
    }

    /// Pausa o reanuda; `false` si no hubo cambio
    pub async fn set_paused(&self, paused: bool) -> Result<bool> {
        self.inner.lock().paused_by_empty = false;
        self.apply_pause(paused).await
    }

    async fn apply_pause(&self, paused: bool) -> Result<bool> {
        if self.is_destroyed() {
            return Ok(false);
        }
        let connection = {
            let mut inner = self.inner.lock();
            let Some(stream) = inner.stream.as_mut() else {
                return Ok(false);
            };
            if stream.is_paused() == paused {
                return Ok(false);
            }
            stream.set_paused(paused);
            inner.status = if paused {
                QueueStatus::Paused
            } else {
                QueueStatus::Playing
            };
            inner.connection.clone()
        };

        if let Some(connection) = connection {
            if paused {
                connection.pause().await?;
            } else {
                connection.resume().await?;
            }
        }

        if paused {
            info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
            self.emit(PlayerEvent::PlayerPause {
                guild_id: self.guild_id,
            });
        } else {
            info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
            self.emit(PlayerEvent::PlayerResume {
                guild_id: self.guild_id,
            });
        }
        Ok(true)
    }

    pub(crate) fn mark_channel_empty(&self, empty: bool) -> bool {
        let mut inner = self.inner.lock();
        let changed = inner.channel_empty != empty;
        inner.channel_empty = empty;
        changed
    }

    pub(crate) async fn pause_for_empty(&self) {
        if let Ok(true) = self.apply_pause(true).await {
            self.inner.lock().paused_by_empty = true;
        }
    }

    pub(crate) async fn resume_after_empty(&self) {
        let paused_by_empty = std::mem::take(&mut self.inner.lock().paused_by_empty);
        if paused_by_empty {
            let _ = self.apply_pause(false).await;
        }
    }

    /// Posición del track actual, sin contar pausas
    pub async fn elapsed(&self) -> Duration {
        let (clock, connection) = {
            let inner = self.inner.lock();
            (
                inner.stream.as_ref().map(ActiveStream::elapsed),
                inner.connection.clone(),
            )
        };
        let Some(clock) = clock else {
            return Duration::ZERO;
        };
        match connection {
            Some(connection) => connection.position().await.unwrap_or(clock),
            None => clock,
        }
    }

    pub fn volume(&self) -> f32 {
        self.filters.lock().volume()
    }

    /// Ajusta el volumen (0.0 - 2.0); devuelve el valor aplicado
    pub async fn set_volume(&self, volume: f32) -> Result<f32> {
        let _guard = self.tasks.acquire().wait().await;
        if self.is_destroyed() {
            return Ok(self.volume());
        }
        let (old, new) = self.filters.lock().set_volume(volume);
        if (old - new).abs() < f32::EPSILON {
            return Ok(new);
        }

        let connection = self.inner.lock().connection.clone();
        if let Some(connection) = connection {
            connection.set_volume(new).await?;
        }

        info!("🔊 Volumen ajustado a {}%", (new * 100.0).round());
        self.emit(PlayerEvent::VolumeChange {
            guild_id: self.guild_id,
            old,
            new,
        });
        Ok(new)
    }

    // ---- filtros ----

    /// Reemplaza los presets FFmpeg; reinicia el stream si cambió algo
    pub async fn set_filters(&self, selection: impl Into<FilterSelection>) -> Result<bool> {
        let _guard = self.tasks.acquire().wait().await;
        if self.is_destroyed() {
            return Ok(false);
        }
        let change = self.filters.lock().set_filters(selection)?;
        self.apply_filter_change(change).await
    }

    pub async fn toggle_filters(&self, names: &[&str]) -> Result<bool> {
        let _guard = self.tasks.acquire().wait().await;
        if self.is_destroyed() {
            return Ok(false);
        }
        let change = self.filters.lock().toggle_filters(names)?;
        self.apply_filter_change(change).await
    }

    pub async fn set_equalizer(&self, gains: [f32; EQ_BANDS]) -> Result<bool> {
        let _guard = self.tasks.acquire().wait().await;
        if self.is_destroyed() {
            return Ok(false);
        }
        let change = self.filters.lock().set_equalizer(gains)?;
        self.apply_filter_change(change).await
    }

    pub async fn set_equalizer_preset(&self, name: &str) -> Result<bool> {
        let _guard = self.tasks.acquire().wait().await;
        if self.is_destroyed() {
            return Ok(false);
        }
        let change = self.filters.lock().set_equalizer_preset(name)?;
        self.apply_filter_change(change).await
    }

    pub async fn set_biquad(&self, filter: Option<BiquadFilter>) -> Result<bool> {
        let _guard = self.tasks.acquire().wait().await;
        if self.is_destroyed() {
            return Ok(false);
        }
        let change = self.filters.lock().set_biquad(filter)?;
        self.apply_filter_change(change).await
    }

    pub async fn set_pcm(&self, name: &str, enabled: bool) -> Result<bool> {
        let _guard = self.tasks.acquire().wait().await;
        if self.is_destroyed() {
            return Ok(false);
        }
        let change = self.filters.lock().set_pcm(name, enabled)?;
        self.apply_filter_change(change).await
    }

    pub async fn toggle_pcm(&self, name: &str) -> Result<bool> {
        let _guard = self.tasks.acquire().wait().await;
        if self.is_destroyed() {
            return Ok(false);
        }
        let change = self.filters.lock().toggle_pcm(name)?;
        self.apply_filter_change(change).await
    }

    pub async fn set_sample_rate(&self, rate: Option<u32>) -> Result<bool> {
        let _guard = self.tasks.acquire().wait().await;
        if self.is_destroyed() {
            return Ok(false);
        }
        let change = self.filters.lock().set_sample_rate(rate)?;
        self.apply_filter_change(change).await
    }

    /// Estado de todos los filtros (en vivo si hay stream activo)
    pub fn filters(&self) -> FilterState {
        self.filters.lock().dump()
    }

    pub fn enabled_filters(&self) -> Vec<String> {
        self.filters.lock().enabled_filters()
    }

    pub fn disabled_filters(&self) -> Vec<&'static str> {
        self.filters.lock().disabled_filters()
    }

    pub fn is_filter_enabled(&self, name: &str) -> bool {
        self.filters.lock().is_filter_enabled(name)
    }

    /// Publica el cambio y reinicia el stream si hace falta. El llamador tiene el ticket.
    async fn apply_filter_change(&self, change: Option<FilterChange>) -> Result<bool> {
        let Some(change) = change else {
            return Ok(false);
        };
        info!("🎛️ Filtros actualizados en guild {}: {:?}", self.guild_id, change.new.ffmpeg);

        let (replay, pitch_changed) = (change.replay, change.pitch_changed);
        self.emit(PlayerEvent::AudioFiltersUpdate {
            guild_id: self.guild_id,
            old: change.old,
            new: change.new,
        });
        if replay {
            self.replay(pitch_changed).await?;
        }
        Ok(true)
    }

    /// Reinicia el stream actual con la configuración nueva
    async fn replay(&self, pitch_changed: bool) -> Result<()> {
        if self.is_destroyed() {
            return Ok(());
        }
        let Some(track) = self.inner.lock().stream.as_ref().map(|s| s.track.clone()) else {
            return Ok(());
        };

        let seek = if pitch_changed {
            Duration::ZERO
        } else {
            self.elapsed().await
        };
        debug!("🔄 Replay de '{}' desde {:?}", track.title(), seek);
        self.start_stream(track, seek, true).await
    }

    // ---- internos ----

    /// Deja el track actual y arranca el siguiente candidato
    async fn advance(&self, reason: Advance) {
        let mut reason = reason;
        loop {
            if self.is_destroyed() || !self.is_connected() {
                return;
            }

            let next = self.inner.lock().list.advance(reason);
            let next = match next {
                Some(track) => track,
                None => {
                    let candidate = self.autoplay_candidate().await;
                    if self.is_destroyed() {
                        return;
                    }
                    match candidate {
                        Some(track) => {
                            self.inner.lock().list.set_current(track.clone());
                            self.emit(PlayerEvent::TrackAdd {
                                guild_id: self.guild_id,
                                track: track.clone(),
                            });
                            track
                        }
                        None => {
                            self.finish().await;
                            return;
                        }
                    }
                }
            };

            match self.start_stream(next, Duration::ZERO, false).await {
                Ok(()) => return,
                Err(PlayerError::NotConnected) => return,
                Err(e) => {
                    warn!("⚠️ Saltando track que no se pudo reproducir: {}", e);
                    reason = Advance::Failed;
                }
            }
        }
    }

    async fn autoplay_candidate(&self) -> Option<Track> {
        let (seed, history) = {
            let inner = self.inner.lock();
            if inner.list.repeat_mode() != RepeatMode::Autoplay {
                return None;
            }
            let history = inner.list.history();
            (history.last().cloned()?, history)
        };

        let related = self.ctx.pipeline.related_tracks(&seed, &history).await;
        let candidate = related
            .tracks
            .into_iter()
            .find(|track| !history.iter().any(|played| played.url() == track.url()));
        if let Some(track) = &candidate {
            info!("📻 Autoplay: {}", track.title());
        }
        candidate
    }

    /// Abre el stream de `track` en la conexión actual
    async fn start_stream(&self, track: Track, seek: Duration, transition: bool) -> Result<()> {
        if self.is_destroyed() {
            return Ok(());
        }
        let connection = self
            .inner
            .lock()
            .connection
            .clone()
            .ok_or(PlayerError::NotConnected)?;

        let source = match self.ctx.pipeline.stream(&track).await {
            Ok(source) => source,
            Err(e) => {
                error!("❌ No se pudo obtener el stream de '{}': {}", track.title(), e);
                self.emit(PlayerEvent::PlayerError {
                    guild_id: self.guild_id,
                    track,
                    message: e.to_string(),
                });
                return Err(e);
            }
        };
        if self.is_destroyed() {
            return Ok(());
        }

        let (dsp, ffmpeg_args, volume) = {
            let mut filters = self.filters.lock();
            (filters.rebuild_dispatcher()?, filters.ffmpeg_args(), filters.volume())
        };
        let (stream_id, was_paused) = {
            let mut inner = self.inner.lock();
            inner.next_stream_id += 1;
            let id = inner.next_stream_id;
            let was_paused = inner.status == QueueStatus::Paused;
            inner.stream = Some(ActiveStream::new(id, track.clone(), seek));
            (id, was_paused)
        };

        let prepared = PreparedStream {
            stream_id,
            track: track.clone(),
            source,
            seek,
            ffmpeg_args,
            dsp,
            volume,
        };
        if let Err(e) = connection.play(prepared).await {
            error!("❌ Error al reproducir '{}': {}", track.title(), e);
            {
                let mut inner = self.inner.lock();
                if inner.stream.as_ref().map(|s| s.id) == Some(stream_id) {
                    inner.stream = None;
                }
            }
            self.emit(PlayerEvent::PlayerError {
                guild_id: self.guild_id,
                track,
                message: e.to_string(),
            });
            return Err(e.into());
        }

        let keep_paused = transition && was_paused;
        if keep_paused {
            let _ = connection.pause().await;
        }
        {
            let mut inner = self.inner.lock();
            if let Some(stream) = inner.stream.as_mut().filter(|s| s.id == stream_id) {
                stream.set_paused(keep_paused);
            }
            inner.status = if keep_paused {
                QueueStatus::Paused
            } else {
                QueueStatus::Playing
            };
        }
        self.cancel_end_timer();

        if !transition {
            info!("🎵 Reproduciendo: {} en guild {}", track, self.guild_id);
            self.emit(PlayerEvent::TrackStart {
                guild_id: self.guild_id,
                track,
            });
        }
        Ok(())
    }

    /// La cola se quedó sin tracks
    async fn finish(&self) {
        if self.is_destroyed() {
            return;
        }
        let connection = {
            let mut inner = self.inner.lock();
            inner.stream = None;
            if inner.status != QueueStatus::Destroyed {
                inner.status = QueueStatus::Idle;
            }
            inner.connection.clone()
        };
        self.filters.lock().clear_dispatcher();
        if let Some(connection) = connection {
            let _ = connection.stop().await;
        }

        info!("📭 Cola vacía en guild {}", self.guild_id);
        self.emit(PlayerEvent::QueueEmpty {
            guild_id: self.guild_id,
        });
        if self.options.leave_on_end {
            self.start_end_timer();
        }
    }

    /// Destruye la cola: desconecta, cancela timers y la saca del registro
    pub async fn delete(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("🗑️ Destruyendo cola de guild {}", self.guild_id);

        self.shutdown.send_replace(true);
        self.cancel_timers();
        let connection = {
            let mut inner = self.inner.lock();
            inner.status = QueueStatus::Destroyed;
            inner.stream = None;
            inner.list.reset();
            inner.connection.take()
        };
        self.filters.lock().clear_dispatcher();

        if let Some(registry) = self.ctx.registry.upgrade() {
            registry.remove_if(&self.guild_id, |_, queue| std::ptr::eq(Arc::as_ptr(queue), self));
        }

        if let Some(connection) = connection {
            let _ = connection.stop().await;
            if let Err(e) = connection.disconnect().await {
                warn!("⚠️ Error al desconectar guild {}: {}", self.guild_id, e);
            }
            self.emit(PlayerEvent::Disconnect {
                guild_id: self.guild_id,
            });
        }
        self.emit(PlayerEvent::QueueDelete {
            guild_id: self.guild_id,
        });
    }

    pub(crate) fn emit(&self, event: PlayerEvent) {
        self.ctx.events.emit(event);
    }

    // ---- timers ----

    pub(crate) fn start_empty_timer(&self) {
        let cooldown = self.options.leave_on_empty_cooldown;
        let queue = self.me.clone();
        let mut timers = self.timers.lock();
        if let Some(previous) = timers.empty.take() {
            previous.abort();
        }
        debug!("⏰ Saliendo en {:?} si el canal sigue vacío", cooldown);
        timers.empty = Some(tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            if let Some(queue) = queue.upgrade() {
                queue.timers.lock().empty.take();
                info!("⏰ Canal vacío por {:?}, saliendo de guild {}", cooldown, queue.guild_id);
                queue.delete().await;
            }
        }));
    }

    pub(crate) fn cancel_empty_timer(&self) -> bool {
        match self.timers.lock().empty.take() {
            Some(timer) => {
                timer.abort();
                debug!("⏰ Timer de canal vacío cancelado en guild {}", self.guild_id);
                true
            }
            None => false,
        }
    }

    fn start_end_timer(&self) {
        let cooldown = self.options.leave_on_end_cooldown;
        let queue = self.me.clone();
        let mut timers = self.timers.lock();
        if let Some(previous) = timers.end.take() {
            previous.abort();
        }
        timers.end = Some(tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            if let Some(queue) = queue.upgrade() {
                queue.timers.lock().end.take();
                info!("⏰ Cola terminada hace {:?}, saliendo de guild {}", cooldown, queue.guild_id);
                queue.delete().await;
            }
        }));
    }

    fn cancel_end_timer(&self) {
        if let Some(timer) = self.timers.lock().end.take() {
            timer.abort();
        }
    }

    fn cancel_timers(&self) {
        let mut timers = self.timers.lock();
        for timer in [timers.empty.take(), timers.end.take()].into_iter().flatten() {
            timer.abort();
        }
    }
}

impl std::fmt::Debug for GuildQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuildQueue")
            .field("guild_id", &self.guild_id)
            .field("status", &self.status())
            .field("size", &self.size())
            .finish()
    }
}

/// Reenvía los eventos de la conexión a la cola hasta que se destruya
async fn run_connection_events(
    queue: Weak<GuildQueue>,
    mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
    generation: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.changed() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        let Some(queue) = queue.upgrade() else {
            break;
        };
        queue.on_connection_event(event, generation).await;
    }
    debug!("Bucle de eventos de conexión {} terminado", generation);
}
