//! # Player
//!
//! Entry point of the library. A [`Player`] owns the extractor pipeline, the
//! voice transport, the event bus and one [`GuildQueue`] per guild. It is
//! shared as `Arc<Player>`; nothing in the crate is global.

use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    error::{PlayerError, Result},
    events::{EventBus, PlayerEvent},
    extractor::ExtractorRegistry,
    queue::{GuildQueue, GuildQueueOptions, QueueContext, QueueRegistry, VoiceStateDiff, VoiceStateHandler},
    search::{ExtractorPipeline, MemoryQueryCache, QueryCache, SearchOptions, SearchQuery, SearchResult},
    track::Track,
    transport::VoiceTransport,
};

/// Opciones globales del reproductor
#[derive(Debug, Clone)]
pub struct PlayerOptions {
    /// Defaults for every queue created without explicit options.
    pub queue: GuildQueueOptions,
    pub enable_query_cache: bool,
    pub cache_size: usize,
    pub cache_ttl: Option<Duration>,
    pub event_capacity: usize,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            queue: GuildQueueOptions::default(),
            enable_query_cache: true,
            cache_size: 100,
            cache_ttl: Some(Duration::from_secs(3600)),
            event_capacity: 256,
        }
    }
}

/// Opciones de `Player::play`
#[derive(Debug, Clone, Default)]
pub struct PlayOptions {
    pub search: SearchOptions,
    /// Used only when the call creates the queue.
    pub queue: Option<GuildQueueOptions>,
}

/// Resultado de `Player::play`
#[derive(Debug, Clone)]
pub struct PlayOutcome {
    /// First track that was enqueued
    pub track: Track,
    pub result: SearchResult,
    pub queue: Arc<GuildQueue>,
}

struct RegisteredHandler {
    handler: Arc<dyn VoiceStateHandler>,
    also_run_default: bool,
}

/// Reproductor multi-guild
pub struct Player {
    pipeline: Arc<ExtractorPipeline>,
    transport: Arc<dyn VoiceTransport>,
    events: EventBus,
    nodes: Arc<QueueRegistry>,
    options: PlayerOptions,
    voice_handler: RwLock<Option<RegisteredHandler>>,
}

impl Player {
    pub fn new(transport: Arc<dyn VoiceTransport>, options: PlayerOptions) -> Self {
        let cache: Option<Arc<dyn QueryCache>> = if options.enable_query_cache {
            Some(Arc::new(MemoryQueryCache::new(options.cache_size, options.cache_ttl)))
        } else {
            None
        };
        Self::with_cache(transport, options, cache)
    }

    /// Igual que `new` pero con una caché de consultas propia
    pub fn with_cache(
        transport: Arc<dyn VoiceTransport>,
        options: PlayerOptions,
        cache: Option<Arc<dyn QueryCache>>,
    ) -> Self {
        info!(
            "🎵 Reproductor inicializado (caché de consultas: {})",
            if cache.is_some() { "activa" } else { "desactivada" }
        );
        Self {
            pipeline: Arc::new(ExtractorPipeline::new(cache)),
            transport,
            events: EventBus::new(options.event_capacity),
            nodes: Arc::new(DashMap::new()),
            options,
            voice_handler: RwLock::new(None),
        }
    }

    pub fn options(&self) -> &PlayerOptions {
        &self.options
    }

    pub fn pipeline(&self) -> &ExtractorPipeline {
        &self.pipeline
    }

    pub fn extractors(&self) -> &ExtractorRegistry {
        self.pipeline.registry()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    pub async fn search(&self, query: impl Into<SearchQuery>, options: &SearchOptions) -> SearchResult {
        self.pipeline.search(query, options).await
    }

    /// Obtiene la cola de una guild, creándola si no existe
    pub fn create_queue(&self, guild_id: GuildId, options: Option<GuildQueueOptions>) -> Arc<GuildQueue> {
        if let Some(queue) = self.get_queue(guild_id) {
            return queue;
        }

        let mut created = false;
        let queue = self
            .nodes
            .entry(guild_id)
            .or_insert_with(|| {
                created = true;
                GuildQueue::new(
                    guild_id,
                    options.unwrap_or_else(|| self.options.queue.clone()),
                    QueueContext {
                        pipeline: Arc::clone(&self.pipeline),
                        transport: Arc::clone(&self.transport),
                        events: self.events.clone(),
                        registry: Arc::downgrade(&self.nodes),
                    },
                )
            })
            .value()
            .clone();

        if created {
            info!("📋 Cola creada para guild {}", guild_id);
            self.events.emit(PlayerEvent::QueueCreate { guild_id });
        }
        queue
    }

    pub fn get_queue(&self, guild_id: GuildId) -> Option<Arc<GuildQueue>> {
        self.nodes.get(&guild_id).map(|queue| Arc::clone(queue.value()))
    }

    pub fn has_queue(&self, guild_id: GuildId) -> bool {
        self.nodes.contains_key(&guild_id)
    }

    pub fn queue_count(&self) -> usize {
        self.nodes.len()
    }

    /// Destruye la cola de una guild; `false` si no había
    pub async fn delete_queue(&self, guild_id: GuildId) -> bool {
        match self.get_queue(guild_id) {
            Some(queue) => {
                queue.delete().await;
                true
            }
            None => false,
        }
    }

    /// Busca, conecta, encola y arranca la reproducción si hace falta
    pub async fn play(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        query: impl Into<SearchQuery>,
        options: PlayOptions,
    ) -> Result<PlayOutcome> {
        let result = self.search(query, &options.search).await;
        let Some(first) = result.first().cloned() else {
            warn!("🔍 Sin resultados para: {}", result.query());
            return Err(PlayerError::NoResult(result.query().to_string()));
        };

        let queue = self.create_queue(guild_id, options.queue);
        let _guard = queue.tasks().acquire().wait().await;
        if queue.is_destroyed() {
            debug!("Cola de guild {} destruida antes de encolar", guild_id);
            return Ok(PlayOutcome {
                track: first,
                result,
                queue,
            });
        }
        if queue.channel_id() != Some(channel_id) || !queue.is_connected() {
            queue.connect_locked(channel_id).await?;
        }

        if result.tracks().len() == 1 && !result.has_playlist() {
            queue.add_track(first.clone())?;
        } else {
            let added = queue.add_tracks(result.tracks().to_vec());
            if let Some(playlist) = result.playlist() {
                info!("📃 Playlist '{}': {} canciones encoladas", playlist.title, added.len());
            }
            if added.is_empty() {
                return Err(PlayerError::QueueFull(queue.options().max_queue_size));
            }
        }

        queue.ensure_playing().await;

        Ok(PlayOutcome {
            track: first,
            result,
            queue,
        })
    }

    /// Entrada para las actualizaciones de estado de voz del gateway
    pub async fn handle_voice_state_update(&self, diff: VoiceStateDiff) {
        let Some(queue) = self.get_queue(diff.guild_id) else {
            return;
        };

        let custom = self
            .voice_handler
            .read()
            .as_ref()
            .map(|registered| (Arc::clone(&registered.handler), registered.also_run_default));

        if let Some((handler, also_run_default)) = custom {
            handler.handle(Arc::clone(&queue), &diff).await;
            if !also_run_default {
                return;
            }
        }
        queue.handle_voice_state(&diff).await;
    }

    /// Registra un handler propio para los cambios de estado de voz
    pub fn set_voice_state_handler(&self, handler: Arc<dyn VoiceStateHandler>, also_run_default: bool) {
        *self.voice_handler.write() = Some(RegisteredHandler {
            handler,
            also_run_default,
        });
    }

    pub fn clear_voice_state_handler(&self) {
        self.voice_handler.write().take();
    }

    /// Destruye todas las colas (apagado)
    pub async fn destroy_all(&self) {
        let queues: Vec<Arc<GuildQueue>> = self
            .nodes
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        info!("🛑 Destruyendo {} colas", queues.len());
        join_all(queues.iter().map(|queue| queue.delete())).await;
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("queues", &self.nodes.len())
            .field("pipeline", &self.pipeline)
            .finish()
    }
}
