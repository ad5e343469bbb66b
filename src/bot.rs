//! # Bot
//!
//! Serenity glue for the binary. [`Handler`] forwards voice state updates to
//! [`Player::handle_voice_state_update`] and answers a small set of prefix
//! commands (`!play`, `!skip`, `!pause`, `!resume`, `!stop`, `!loop`,
//! `!filters`, `!volume`, `!queue`).

use anyhow::{Context as _, Result};
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Message, Ready, UserId, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    events::PlayerEvent,
    player::{PlayOptions, Player},
    queue::{GuildQueue, RepeatMode, VoiceSnapshot, VoiceStateDiff},
    search::SearchOptions,
};

const QUEUE_PAGE_SIZE: usize = 10;

/// Comandos de texto soportados
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play(String),
    Skip,
    Pause,
    Resume,
    Stop,
    Loop(Option<String>),
    /// Empty list shows the current filters
    Filters(Vec<String>),
    Volume(Option<String>),
    Queue(usize),
}

impl Command {
    /// Parsea un mensaje; `None` si no es un comando
    pub fn parse(prefix: &str, content: &str) -> Option<Self> {
        let rest = content.trim().strip_prefix(prefix)?;
        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };
        let arg = (!args.is_empty()).then(|| args.to_string());

        let command = match name.to_lowercase().as_str() {
            "play" | "p" => Self::Play(arg?),
            "skip" | "s" => Self::Skip,
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "stop" => Self::Stop,
            "loop" | "repeat" => Self::Loop(arg),
            "filters" | "filter" => Self::Filters(args.split_whitespace().map(str::to_string).collect()),
            "volume" | "vol" => Self::Volume(arg),
            "queue" | "q" => Self::Queue(args.parse().unwrap_or(1)),
            _ => return None,
        };
        Some(command)
    }
}

/// Handler de eventos de Discord
pub struct Handler {
    player: Arc<Player>,
    config: Arc<Config>,
}

impl Handler {
    pub fn new(player: Arc<Player>, config: Config) -> Self {
        Self {
            player,
            config: Arc::new(config),
        }
    }

    async fn run_command(&self, ctx: &Context, msg: &Message, guild_id: GuildId, command: Command) -> Result<String> {
        let queue = || {
            self.player
                .get_queue(guild_id)
                .context("No hay nada reproduciéndose")
        };

        let reply = match command {
            Command::Play(query) => self.play(ctx, msg, guild_id, query).await?,
            Command::Skip => {
                if queue()?.skip().await? {
                    "⏭️ Canción saltada".to_string()
                } else {
                    "No hay nada que saltar".to_string()
                }
            }
            Command::Pause => {
                if queue()?.set_paused(true).await? {
                    "⏸️ Pausado".to_string()
                } else {
                    "Ya estaba pausado".to_string()
                }
            }
            Command::Resume => {
                if queue()?.set_paused(false).await? {
                    "▶️ Reanudado".to_string()
                } else {
                    "No estaba pausado".to_string()
                }
            }
            Command::Stop => {
                queue()?.stop().await;
                "⏹️ Reproducción detenida".to_string()
            }
            Command::Loop(mode) => {
                let queue = queue()?;
                let mode = match mode {
                    Some(mode) => mode.parse::<RepeatMode>()?,
                    None => match queue.repeat_mode() {
                        RepeatMode::Off => RepeatMode::Track,
                        RepeatMode::Track => RepeatMode::Queue,
                        RepeatMode::Queue => RepeatMode::Autoplay,
                        RepeatMode::Autoplay => RepeatMode::Off,
                    },
                };
                queue.set_repeat_mode(mode);
                format!("🔁 Repetición: {}", mode)
            }
            Command::Filters(names) => filters_reply(&*queue()?, names).await?,
            Command::Volume(value) => {
                let queue = queue()?;
                match value {
                    Some(value) => {
                        let percent: f32 = value
                            .trim_end_matches('%')
                            .parse()
                            .with_context(|| format!("Volumen inválido: {}", value))?;
                        let applied = queue.set_volume(percent / 100.0).await?;
                        format!("🔊 Volumen: {}%", (applied * 100.0).round())
                    }
                    None => format!("🔊 Volumen: {}%", (queue.volume() * 100.0).round()),
                }
            }
            Command::Queue(page) => queue_reply(&*queue()?, page),
        };
        Ok(reply)
    }

    async fn play(&self, ctx: &Context, msg: &Message, guild_id: GuildId, query: String) -> Result<String> {
        let channel_id =
            user_voice_channel(ctx, guild_id, msg.author.id).context("Debes estar en un canal de voz")?;

        let options = PlayOptions {
            search: SearchOptions::default().requested_by(msg.author.id),
            queue: Some(self.config.queue_options()),
        };
        let outcome = self.player.play(guild_id, channel_id, query, options).await?;

        Ok(match outcome.result.playlist() {
            Some(playlist) => format!(
                "📃 Playlist **{}** agregada ({} canciones)",
                playlist.title,
                outcome.result.tracks().len()
            ),
            None => format!("🎵 Agregado: **{}** [{}]", outcome.track, outcome.track.formatted_duration()),
        })
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("✅ {} conectado ({} guilds)", ready.user.name, ready.guilds.len());
        info!("{}", self.config.summary());
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        let Some(command) = Command::parse(&self.config.command_prefix, &msg.content) else {
            return;
        };

        debug!("📨 Comando {:?} de {} en guild {}", command, msg.author.id, guild_id);
        let reply = match self.run_command(&ctx, &msg, guild_id, command).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Error en comando: {:?}", e);
                format!("❌ {}", e)
            }
        };

        if let Err(e) = msg.channel_id.say(&ctx.http, reply).await {
            error!("Error al enviar respuesta: {:?}", e);
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let Some(queue) = self.player.get_queue(guild_id) else {
            return;
        };

        let bot_id = ctx.cache.current_user().id;
        let is_self = new.user_id == bot_id;
        // the channel the bot ends up in after this update
        let watched = if is_self { new.channel_id } else { queue.channel_id() };
        let channel_members = watched
            .map(|channel| count_listeners(&ctx, guild_id, channel, bot_id))
            .unwrap_or(0);

        let diff = VoiceStateDiff {
            guild_id,
            user_id: new.user_id,
            is_self,
            old: old.as_ref().map(snapshot),
            new: snapshot(&new),
            channel_members,
        };
        self.player.handle_voice_state_update(diff).await;
    }
}

fn snapshot(state: &VoiceState) -> VoiceSnapshot {
    VoiceSnapshot {
        channel_id: state.channel_id,
        mute: state.mute,
        suppress: state.suppress,
    }
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

/// Usuarios humanos en `channel_id`
fn count_listeners(ctx: &Context, guild_id: GuildId, channel_id: ChannelId, bot_id: UserId) -> usize {
    let Some(guild) = guild_id.to_guild_cached(&ctx.cache) else {
        return 0;
    };
    guild
        .voice_states
        .values()
        .filter(|state| state.channel_id == Some(channel_id) && state.user_id != bot_id)
        .filter(|state| !state.member.as_ref().map(|member| member.user.bot).unwrap_or(false))
        .count()
}

async fn filters_reply(queue: &GuildQueue, names: Vec<String>) -> Result<String> {
    match names.first().map(String::as_str) {
        None => {
            let enabled = queue.enabled_filters();
            Ok(if enabled.is_empty() {
                "🎛️ Sin filtros activos".to_string()
            } else {
                format!("🎛️ Filtros activos: {}", enabled.join(", "))
            })
        }
        Some("off" | "clear") => {
            queue.set_filters(false).await?;
            Ok("🎛️ Filtros desactivados".to_string())
        }
        Some(_) => {
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            queue.toggle_filters(&names).await?;
            Ok(format!("🎛️ Filtros activos: {}", queue.enabled_filters().join(", ")))
        }
    }
}

fn queue_reply(queue: &GuildQueue, page: usize) -> String {
    let page = queue.page(page, QUEUE_PAGE_SIZE);
    let mut reply = match queue.current_track() {
        Some(track) => format!("🎵 Ahora: **{}** [{}]\n", track, track.formatted_duration()),
        None => String::new(),
    };
    if page.tracks.is_empty() {
        reply.push_str("📭 La cola está vacía");
        return reply;
    }

    let offset = (page.current_page - 1) * QUEUE_PAGE_SIZE;
    for (index, track) in page.tracks.iter().enumerate() {
        reply.push_str(&format!("`{}.` {} [{}]\n", offset + index + 1, track, track.formatted_duration()));
    }
    reply.push_str(&format!(
        "Página {}/{} · {} canciones · {}",
        page.current_page,
        page.total_pages,
        page.total_tracks,
        humantime::format_duration(queue.total_duration())
    ));
    reply
}

/// Registra en el log los eventos del reproductor
pub async fn log_events(player: Arc<Player>) {
    let mut events = player.subscribe();
    loop {
        match events.recv().await {
            Ok(PlayerEvent::TrackStart { guild_id, track }) => {
                info!("▶️ [{}] Empezó: {}", guild_id, track);
            }
            Ok(PlayerEvent::PlayerError { guild_id, track, message }) => {
                warn!("❌ [{}] Falló '{}': {}", guild_id, track, message);
            }
            Ok(PlayerEvent::Error { guild_id, message }) => {
                error!("❌ [{}] {}", guild_id, message);
            }
            Ok(event) => debug!("📡 {:?}", event),
            Err(RecvError::Lagged(skipped)) => warn!("⚠️ {} eventos perdidos", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}
