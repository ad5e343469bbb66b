//! Voice transport seam
//!
//! The queue never talks to a voice library directly. It asks a
//! [`VoiceTransport`] for a [`VoiceConnection`] and hands it
//! [`PreparedStream`]s; the connection reports back through the
//! [`ConnectionEvent`] channel it was given at connect time.

pub mod songbird;

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;

use crate::{error::TransportError, extractor::StreamSource, filters::DspChain, track::Track};

pub use self::songbird::SongbirdTransport;

/// Eventos que la conexión envía a la cola
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The stream with this id finished on its own
    TrackEnd { stream_id: u64 },
    /// The stream with this id failed mid-playback
    TrackError { stream_id: u64, message: String },
    /// The voice session is gone
    Disconnected,
}

/// Everything a connection needs to start one stream.
#[derive(Debug, Clone)]
pub struct PreparedStream {
    /// Monotonic per queue; events for older ids are ignored.
    pub stream_id: u64,
    pub track: Track,
    pub source: StreamSource,
    /// Offset to start at, non-zero on filter replays
    pub seek: Duration,
    /// `-af` chain for transports that spawn FFmpeg
    pub ffmpeg_args: Option<String>,
    /// Live PCM stages for transports that feed raw samples
    pub dsp: Arc<Mutex<DspChain>>,
    pub volume: f32,
}

/// Abre sesiones de voz
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<Arc<dyn VoiceConnection>, TransportError>;
}

/// Una sesión de voz abierta
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    fn channel_id(&self) -> ChannelId;

    /// Replaces whatever is playing.
    async fn play(&self, stream: PreparedStream) -> Result<(), TransportError>;

    async fn pause(&self) -> Result<(), TransportError>;

    async fn resume(&self) -> Result<(), TransportError>;

    async fn stop(&self) -> Result<(), TransportError>;

    async fn set_volume(&self, volume: f32) -> Result<(), TransportError>;

    /// Position inside the current stream, seek offset included.
    async fn position(&self) -> Option<Duration>;

    async fn disconnect(&self) -> Result<(), TransportError>;
}
