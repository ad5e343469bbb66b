//! In-memory transport and extractor shared by the integration tests.

#![allow(dead_code)]

use anyhow::bail;
use async_trait::async_trait;
use guild_player::{
    error::TransportError,
    extractor::{Extractor, ExtractorContext, ExtractorInfo, StreamSource},
    search::QueryType,
    transport::{ConnectionEvent, PreparedStream, VoiceConnection, VoiceTransport},
    Player, PlayerEvent, PlayerOptions, Playlist, PlaylistKind, Track,
};
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{broadcast, mpsc};

pub const GUILD: GuildId = GuildId::new(1);
pub const CHANNEL: ChannelId = ChannelId::new(10);
pub const OTHER_CHANNEL: ChannelId = ChannelId::new(11);

/// What the mock connection was asked to play.
#[derive(Debug, Clone)]
pub struct Played {
    pub stream_id: u64,
    pub title: String,
    pub seek: Duration,
    pub ffmpeg_args: Option<String>,
}

#[derive(Default)]
struct Recorded {
    plays: Vec<Played>,
    events: Option<mpsc::UnboundedSender<ConnectionEvent>>,
    connects: usize,
    disconnects: usize,
    paused: bool,
    volume: f32,
}

#[derive(Clone, Default)]
pub struct MockTransport {
    recorded: Arc<Mutex<Recorded>>,
    fail_connect: Arc<AtomicBool>,
    connect_delay: Arc<Mutex<Option<Duration>>>,
    play_delay: Arc<Mutex<Option<Duration>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock() = Some(delay);
    }

    pub fn set_play_delay(&self, delay: Duration) {
        *self.play_delay.lock() = Some(delay);
    }

    pub fn plays(&self) -> Vec<Played> {
        self.recorded.lock().plays.clone()
    }

    pub fn played_titles(&self) -> Vec<String> {
        self.plays().into_iter().map(|p| p.title).collect()
    }

    pub fn last_play(&self) -> Option<Played> {
        self.recorded.lock().plays.last().cloned()
    }

    pub fn connects(&self) -> usize {
        self.recorded.lock().connects
    }

    pub fn disconnects(&self) -> usize {
        self.recorded.lock().disconnects
    }

    pub fn is_paused(&self) -> bool {
        self.recorded.lock().paused
    }

    /// Simula el fin natural del stream más reciente
    pub fn finish_current(&self) {
        let recorded = self.recorded.lock();
        if let (Some(tx), Some(last)) = (&recorded.events, recorded.plays.last()) {
            let _ = tx.send(ConnectionEvent::TrackEnd {
                stream_id: last.stream_id,
            });
        }
    }

    pub fn fail_current(&self, message: &str) {
        let recorded = self.recorded.lock();
        if let (Some(tx), Some(last)) = (&recorded.events, recorded.plays.last()) {
            let _ = tx.send(ConnectionEvent::TrackError {
                stream_id: last.stream_id,
                message: message.to_string(),
            });
        }
    }

    pub fn send(&self, event: ConnectionEvent) {
        if let Some(tx) = &self.recorded.lock().events {
            let _ = tx.send(event);
        }
    }
}

#[async_trait]
impl VoiceTransport for MockTransport {
    async fn connect(
        &self,
        _guild_id: GuildId,
        channel_id: ChannelId,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<Arc<dyn VoiceConnection>, TransportError> {
        let delay = *self.connect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("gateway timeout".to_string()));
        }
        let mut recorded = self.recorded.lock();
        recorded.connects += 1;
        recorded.events = Some(events);
        Ok(Arc::new(MockConnection {
            channel_id,
            recorded: Arc::clone(&self.recorded),
            play_delay: Arc::clone(&self.play_delay),
        }))
    }
}

struct MockConnection {
    channel_id: ChannelId,
    recorded: Arc<Mutex<Recorded>>,
    play_delay: Arc<Mutex<Option<Duration>>>,
}

#[async_trait]
impl VoiceConnection for MockConnection {
    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    async fn play(&self, stream: PreparedStream) -> Result<(), TransportError> {
        let delay = *self.play_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut recorded = self.recorded.lock();
        recorded.paused = false;
        recorded.volume = stream.volume;
        recorded.plays.push(Played {
            stream_id: stream.stream_id,
            title: stream.track.title().to_string(),
            seek: stream.seek,
            ffmpeg_args: stream.ffmpeg_args,
        });
        Ok(())
    }

    async fn pause(&self) -> Result<(), TransportError> {
        self.recorded.lock().paused = true;
        Ok(())
    }

    async fn resume(&self) -> Result<(), TransportError> {
        self.recorded.lock().paused = false;
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> Result<(), TransportError> {
        self.recorded.lock().volume = volume;
        Ok(())
    }

    async fn position(&self) -> Option<Duration> {
        None
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.recorded.lock().disconnects += 1;
        Ok(())
    }
}

/// Resuelve cualquier texto a un track `mock://`.
///
/// - `playlist:<name>:<n>` devuelve una playlist de `n` tracks `<name>-1..n`
/// - `list:<a>,<b>,...` devuelve esos tracks en orden, sin playlist
/// - `nothing` no devuelve nada
/// - los títulos que contienen `broken` fallan al abrir el stream
/// - los relacionados de un título con `slow` tardan cinco segundos
#[derive(Debug, Default)]
pub struct MockExtractor;

impl MockExtractor {
    pub const IDENTIFIER: &'static str = "mock";

    fn track(title: &str) -> Track {
        Track::new(title, format!("mock://{}", title)).with_duration(Duration::from_secs(180))
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    fn identifier(&self) -> &str {
        Self::IDENTIFIER
    }

    async fn validate(&self, _query: &str, _query_type: &QueryType) -> bool {
        true
    }

    async fn handle(&self, query: &str, _context: &ExtractorContext) -> anyhow::Result<ExtractorInfo> {
        if query == "nothing" {
            return Ok(ExtractorInfo::empty());
        }
        if let Some(spec) = query.strip_prefix("playlist:") {
            let (name, count) = spec.split_once(':').unwrap_or((spec, "3"));
            let count: usize = count.parse()?;
            let tracks: Vec<Track> = (1..=count).map(|i| Self::track(&format!("{}-{}", name, i))).collect();
            let playlist = Playlist::new(name, format!("mock://playlist/{}", name), PlaylistKind::Playlist)
                .with_tracks(tracks.clone());
            return Ok(ExtractorInfo::new(Some(playlist), tracks));
        }
        if let Some(list) = query.strip_prefix("list:") {
            return Ok(ExtractorInfo::new(None, list.split(',').map(Self::track).collect()));
        }
        Ok(ExtractorInfo::new(None, vec![Self::track(query)]))
    }

    async fn stream(&self, track: &Track) -> anyhow::Result<StreamSource> {
        if track.title().contains("broken") {
            bail!("stream unavailable for {}", track.title());
        }
        Ok(StreamSource::Url(track.url().to_string()))
    }

    async fn related_tracks(&self, track: &Track, _history: &[Track]) -> anyhow::Result<ExtractorInfo> {
        if track.title().contains("slow") {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        Ok(ExtractorInfo::new(
            None,
            vec![Self::track(&format!("{} (related)", track.title()))],
        ))
    }
}

pub async fn setup(options: PlayerOptions) -> (Arc<Player>, MockTransport) {
    let transport = MockTransport::new();
    let player = Arc::new(Player::new(Arc::new(transport.clone()), options));
    player
        .extractors()
        .register(Arc::new(MockExtractor))
        .await
        .expect("register mock extractor");
    (player, transport)
}

/// Options with the leave timers far enough away not to interfere.
pub fn quiet_options() -> PlayerOptions {
    let mut options = PlayerOptions::default();
    options.queue.leave_on_end = false;
    options.queue.leave_on_empty = false;
    options
}

/// Lets spawned tasks (connection event loop, timers) catch up.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

pub fn drain(events: &mut broadcast::Receiver<PlayerEvent>) -> Vec<PlayerEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

pub fn titles(tracks: &[Track]) -> Vec<String> {
    tracks.iter().map(|t| t.title().to_string()).collect()
}
