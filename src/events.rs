//! Player events
//!
//! Every guild queue publishes onto one broadcast bus owned by the
//! [`Player`](crate::player::Player). Subscribers that fall behind lose the
//! oldest events (tokio broadcast semantics); playback never waits on them.

use serenity::model::id::{ChannelId, GuildId};
use tokio::sync::broadcast;
use tracing::trace;

use crate::{filters::FilterState, track::Track};

/// Eventos emitidos por las colas
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    QueueCreate { guild_id: GuildId },
    QueueDelete { guild_id: GuildId },
    Connection { guild_id: GuildId, channel_id: ChannelId },
    Disconnect { guild_id: GuildId },
    TrackStart { guild_id: GuildId, track: Track },
    TrackEnd { guild_id: GuildId, track: Track },
    TrackAdd { guild_id: GuildId, track: Track },
    TracksAdd { guild_id: GuildId, tracks: Vec<Track> },
    TrackSkip { guild_id: GuildId, track: Track },
    QueueEmpty { guild_id: GuildId },
    EmptyChannel { guild_id: GuildId },
    ChannelPopulate { guild_id: GuildId },
    PlayerPause { guild_id: GuildId },
    PlayerResume { guild_id: GuildId },
    VolumeChange { guild_id: GuildId, old: f32, new: f32 },
    AudioFiltersUpdate {
        guild_id: GuildId,
        old: FilterState,
        new: FilterState,
    },
    /// Queue-level failure (connection, transport)
    Error { guild_id: GuildId, message: String },
    /// Failure while streaming a specific track
    PlayerError {
        guild_id: GuildId,
        track: Track,
        message: String,
    },
}

impl PlayerEvent {
    pub fn guild_id(&self) -> GuildId {
        match self {
            Self::QueueCreate { guild_id }
            | Self::QueueDelete { guild_id }
            | Self::Connection { guild_id, .. }
            | Self::Disconnect { guild_id }
            | Self::TrackStart { guild_id, .. }
            | Self::TrackEnd { guild_id, .. }
            | Self::TrackAdd { guild_id, .. }
            | Self::TracksAdd { guild_id, .. }
            | Self::TrackSkip { guild_id, .. }
            | Self::QueueEmpty { guild_id }
            | Self::EmptyChannel { guild_id }
            | Self::ChannelPopulate { guild_id }
            | Self::PlayerPause { guild_id }
            | Self::PlayerResume { guild_id }
            | Self::VolumeChange { guild_id, .. }
            | Self::AudioFiltersUpdate { guild_id, .. }
            | Self::Error { guild_id, .. }
            | Self::PlayerError { guild_id, .. } => *guild_id,
        }
    }
}

/// Cheap-to-clone handle on the event bus.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: PlayerEvent) {
        trace!("📣 {:?}", event);
        // no subscribers is fine
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
