mod common;

use async_trait::async_trait;
use common::*;
use guild_player::{
    queue::{VoiceSnapshot, VoiceStateDiff, VoiceStateHandler},
    GuildQueue, PlayOptions, PlayerEvent, PlayerOptions, QueueStatus,
};
use pretty_assertions::assert_eq;
use serenity::model::id::UserId;
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

const BOT: UserId = UserId::new(100);
const LISTENER: UserId = UserId::new(200);

fn in_channel(channel: Option<serenity::model::id::ChannelId>) -> VoiceSnapshot {
    VoiceSnapshot {
        channel_id: channel,
        ..VoiceSnapshot::default()
    }
}

fn member_left(members: usize) -> VoiceStateDiff {
    VoiceStateDiff {
        guild_id: GUILD,
        user_id: LISTENER,
        is_self: false,
        old: Some(in_channel(Some(CHANNEL))),
        new: in_channel(None),
        channel_members: members,
    }
}

fn member_joined(members: usize) -> VoiceStateDiff {
    VoiceStateDiff {
        guild_id: GUILD,
        user_id: LISTENER,
        is_self: false,
        old: None,
        new: in_channel(Some(CHANNEL)),
        channel_members: members,
    }
}

fn empty_channel_options() -> PlayerOptions {
    let mut options = quiet_options();
    options.queue.leave_on_empty = true;
    options.queue.leave_on_empty_cooldown = Duration::from_secs(60);
    options
}

#[tokio::test(start_paused = true)]
async fn empty_channel_pauses_and_leaves_after_cooldown() {
    let (player, transport) = setup(empty_channel_options()).await;
    let queue = player
        .play(GUILD, CHANNEL, "song", PlayOptions::default())
        .await
        .unwrap()
        .queue;
    let mut events = player.subscribe();

    player.handle_voice_state_update(member_left(0)).await;
    assert_eq!(queue.status(), QueueStatus::Paused);
    assert!(transport.is_paused());

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert!(player.has_queue(GUILD));

    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;
    assert!(!player.has_queue(GUILD));
    assert_eq!(queue.status(), QueueStatus::Destroyed);

    let events = drain(&mut events);
    assert!(matches!(events.first(), Some(PlayerEvent::EmptyChannel { .. })));
    assert!(matches!(events.last(), Some(PlayerEvent::QueueDelete { .. })));
}

#[tokio::test(start_paused = true)]
async fn rejoining_cancels_the_leave_timer_and_resumes() {
    let (player, transport) = setup(empty_channel_options()).await;
    let queue = player
        .play(GUILD, CHANNEL, "song", PlayOptions::default())
        .await
        .unwrap()
        .queue;
    let mut events = player.subscribe();

    player.handle_voice_state_update(member_left(0)).await;
    tokio::time::sleep(Duration::from_secs(30)).await;
    player.handle_voice_state_update(member_joined(1)).await;

    assert!(queue.is_playing());
    assert!(!transport.is_paused());

    tokio::time::sleep(Duration::from_secs(120)).await;
    settle().await;
    assert!(player.has_queue(GUILD));

    let kinds: Vec<bool> = drain(&mut events)
        .iter()
        .map(|e| matches!(e, PlayerEvent::ChannelPopulate { .. }))
        .collect();
    assert!(kinds.contains(&true));
}

#[tokio::test(start_paused = true)]
async fn manual_pause_survives_the_channel_refilling() {
    let (player, _transport) = setup(empty_channel_options()).await;
    let queue = player
        .play(GUILD, CHANNEL, "song", PlayOptions::default())
        .await
        .unwrap()
        .queue;

    queue.set_paused(true).await.unwrap();
    player.handle_voice_state_update(member_left(0)).await;
    player.handle_voice_state_update(member_joined(1)).await;

    assert!(queue.is_paused());
}

#[tokio::test(start_paused = true)]
async fn other_channels_are_ignored() {
    let (player, _transport) = setup(empty_channel_options()).await;
    let queue = player
        .play(GUILD, CHANNEL, "song", PlayOptions::default())
        .await
        .unwrap()
        .queue;

    let mut diff = member_left(0);
    diff.old = Some(in_channel(Some(OTHER_CHANNEL)));
    player.handle_voice_state_update(diff).await;

    assert!(queue.is_playing());
}

#[tokio::test(start_paused = true)]
async fn bot_kicked_destroys_the_queue() {
    let (player, transport) = setup(quiet_options()).await;
    player.play(GUILD, CHANNEL, "song", PlayOptions::default()).await.unwrap();

    player
        .handle_voice_state_update(VoiceStateDiff {
            guild_id: GUILD,
            user_id: BOT,
            is_self: true,
            old: Some(in_channel(Some(CHANNEL))),
            new: in_channel(None),
            channel_members: 0,
        })
        .await;

    assert!(!player.has_queue(GUILD));
    assert_eq!(transport.disconnects(), 1);
}

#[tokio::test(start_paused = true)]
async fn server_mute_pauses_and_unmute_resumes() {
    let (player, _transport) = setup(quiet_options()).await;
    let queue = player
        .play(GUILD, CHANNEL, "song", PlayOptions::default())
        .await
        .unwrap()
        .queue;

    let muted = VoiceSnapshot {
        channel_id: Some(CHANNEL),
        mute: true,
        suppress: false,
    };
    let diff = |old: VoiceSnapshot, new: VoiceSnapshot| VoiceStateDiff {
        guild_id: GUILD,
        user_id: BOT,
        is_self: true,
        old: Some(old),
        new,
        channel_members: 1,
    };

    player.handle_voice_state_update(diff(in_channel(Some(CHANNEL)), muted)).await;
    assert!(queue.is_paused());

    player.handle_voice_state_update(diff(muted, in_channel(Some(CHANNEL)))).await;
    assert!(queue.is_playing());
}

#[tokio::test(start_paused = true)]
async fn bot_moved_follows_the_new_channel() {
    let (player, _transport) = setup(quiet_options()).await;
    let queue = player
        .play(GUILD, CHANNEL, "song", PlayOptions::default())
        .await
        .unwrap()
        .queue;

    player
        .handle_voice_state_update(VoiceStateDiff {
            guild_id: GUILD,
            user_id: BOT,
            is_self: true,
            old: Some(in_channel(Some(CHANNEL))),
            new: in_channel(Some(OTHER_CHANNEL)),
            channel_members: 2,
        })
        .await;

    assert_eq!(queue.channel_id(), Some(OTHER_CHANNEL));
    assert!(queue.is_playing());
}

struct CountingHandler {
    calls: AtomicUsize,
}

#[async_trait]
impl VoiceStateHandler for CountingHandler {
    async fn handle(&self, _queue: Arc<GuildQueue>, _diff: &VoiceStateDiff) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test(start_paused = true)]
async fn custom_handler_replaces_the_default() {
    let (player, _transport) = setup(empty_channel_options()).await;
    let queue = player
        .play(GUILD, CHANNEL, "song", PlayOptions::default())
        .await
        .unwrap()
        .queue;

    let handler = Arc::new(CountingHandler {
        calls: AtomicUsize::new(0),
    });
    player.set_voice_state_handler(handler.clone(), false);
    player.handle_voice_state_update(member_left(0)).await;

    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    assert!(queue.is_playing());

    player.set_voice_state_handler(handler.clone(), true);
    player.handle_voice_state_update(member_left(0)).await;

    assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    assert!(queue.is_paused());
}
