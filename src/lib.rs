//! # Guild Player
//!
//! Per-guild voice playback engine for Discord bots.
//!
//! - [`Player`] is the entry point: it owns the extractor pipeline, the event
//!   bus and one [`GuildQueue`] per guild.
//! - [`extractor`] holds the pluggable resolvers that turn queries into
//!   [`Track`]s; [`search`] runs them with caching and fallbacks.
//! - [`filters`] is the hot-swappable audio filter graph.
//! - [`transport`] is the seam to the voice library (songbird by default).
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use guild_player::{extractor::DirectUrlExtractor, Player, PlayerOptions, PlayOptions};
//! # async fn example(transport: Arc<dyn guild_player::transport::VoiceTransport>) -> anyhow::Result<()> {
//! let player = Player::new(transport, PlayerOptions::default());
//! player.extractors().register(Arc::new(DirectUrlExtractor::new())).await?;
//!
//! let guild = serenity::model::id::GuildId::new(1);
//! let channel = serenity::model::id::ChannelId::new(2);
//! let outcome = player
//!     .play(guild, channel, "https://example.com/song.mp3", PlayOptions::default())
//!     .await?;
//! println!("Encolado: {}", outcome.track);
//! # Ok(())
//! # }
//! ```

pub mod bot;
pub mod config;
pub mod error;
pub mod events;
pub mod extractor;
pub mod filters;
pub mod player;
pub mod queue;
pub mod search;
pub mod task_queue;
pub mod track;
pub mod transport;

pub use error::{PlayerError, Result};
pub use events::{EventBus, PlayerEvent};
pub use player::{PlayOptions, PlayOutcome, Player, PlayerOptions};
pub use queue::{GuildQueue, GuildQueueOptions, QueueStatus, RepeatMode, TrackPlayOptions};
pub use search::{SearchOptions, SearchQuery, SearchResult};
pub use track::{Playlist, PlaylistKind, Track};
