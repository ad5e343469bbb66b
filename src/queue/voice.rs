//! Voice-state reconciliation
//!
//! The gateway layer turns each voice state update into a
//! [`VoiceStateDiff`]. The queue owning the guild reacts to it: the bot being
//! kicked destroys the queue, a server mute pauses it, and an empty channel
//! pauses and/or starts the leave-on-empty countdown until somebody rejoins.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::GuildQueue;
use crate::events::PlayerEvent;

/// Estado de voz de un usuario en un instante
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoiceSnapshot {
    pub channel_id: Option<ChannelId>,
    /// Server mute
    pub mute: bool,
    pub suppress: bool,
}

impl VoiceSnapshot {
    pub fn silenced(&self) -> bool {
        self.mute || self.suppress
    }
}

/// Cambio de estado de voz ya resuelto por la capa de gateway
#[derive(Debug, Clone)]
pub struct VoiceStateDiff {
    pub guild_id: GuildId,
    pub user_id: UserId,
    /// The update concerns the bot itself.
    pub is_self: bool,
    pub old: Option<VoiceSnapshot>,
    pub new: VoiceSnapshot,
    /// Humans left in the queue's channel after the change.
    pub channel_members: usize,
}

impl VoiceStateDiff {
    pub fn old_channel(&self) -> Option<ChannelId> {
        self.old.and_then(|old| old.channel_id)
    }
}

/// Reemplaza (o complementa) la reconciliación por defecto
#[async_trait]
pub trait VoiceStateHandler: Send + Sync {
    async fn handle(&self, queue: Arc<GuildQueue>, diff: &VoiceStateDiff);
}

impl GuildQueue {
    /// Reconciliación por defecto de un cambio de estado de voz
    pub async fn handle_voice_state(&self, diff: &VoiceStateDiff) {
        if self.is_destroyed() || diff.guild_id != self.guild_id() {
            return;
        }

        if diff.is_self {
            self.reconcile_self(diff).await;
        } else {
            self.reconcile_member(diff).await;
        }
    }

    async fn reconcile_self(&self, diff: &VoiceStateDiff) {
        let Some(new_channel) = diff.new.channel_id else {
            if diff.old_channel().is_some() {
                warn!("🔌 Bot desconectado del canal de voz en guild {}", self.guild_id());
                self.delete().await;
            }
            return;
        };

        if self.channel_id() != Some(new_channel) {
            info!("🔀 Bot movido al canal {} en guild {}", new_channel, self.guild_id());
            self.set_channel(new_channel);
            self.reconcile_occupancy(diff.channel_members).await;
        }

        let was_silenced = diff.old.map(|old| old.silenced()).unwrap_or(false);
        let silenced = diff.new.silenced();
        if silenced && !was_silenced {
            info!("🔇 Bot silenciado en guild {}, pausando", self.guild_id());
            let _ = self.set_paused(true).await;
        } else if !silenced && was_silenced {
            info!("🔊 Bot sin silenciar en guild {}, reanudando", self.guild_id());
            let _ = self.set_paused(false).await;
        }
    }

    async fn reconcile_member(&self, diff: &VoiceStateDiff) {
        let Some(channel) = self.channel_id() else {
            return;
        };

        let left = diff.old_channel() == Some(channel);
        let joined = diff.new.channel_id == Some(channel);
        if left == joined {
            return;
        }

        debug!(
            "👥 Usuario {} {} el canal de la cola ({} presentes)",
            diff.user_id,
            if joined { "entró a" } else { "salió de" },
            diff.channel_members
        );
        self.reconcile_occupancy(diff.channel_members).await;
    }

    async fn reconcile_occupancy(&self, members: usize) {
        let options = self.options().clone();

        if members == 0 {
            if !self.mark_channel_empty(true) {
                return;
            }
            info!("👻 Canal vacío en guild {}", self.guild_id());
            self.emit(PlayerEvent::EmptyChannel {
                guild_id: self.guild_id(),
            });
            if options.pause_on_empty {
                self.pause_for_empty().await;
            }
            if options.leave_on_empty {
                self.start_empty_timer();
            }
        } else if self.mark_channel_empty(false) {
            self.cancel_empty_timer();
            info!("👥 Canal con oyentes de nuevo en guild {}", self.guild_id());
            self.emit(PlayerEvent::ChannelPopulate {
                guild_id: self.guild_id(),
            });
            self.resume_after_empty().await;
        }
    }
}
