mod common;

use common::*;
use guild_player::{
    filters::{BiquadFilter, BiquadKind, FilterSelection},
    PlayOptions, PlayerError, PlayerEvent,
};
use pretty_assertions::assert_eq;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn clearing_filters_twice_only_replays_once() {
    let (player, transport) = setup(quiet_options()).await;
    let queue = player
        .play(GUILD, CHANNEL, "song", PlayOptions::default())
        .await
        .unwrap()
        .queue;

    assert!(queue.set_filters(vec!["bassboost"]).await.unwrap());
    assert_eq!(transport.plays().len(), 2);

    assert!(queue.set_filters(Vec::<String>::new()).await.unwrap());
    assert_eq!(transport.plays().len(), 3);

    assert!(!queue.set_filters(Vec::<String>::new()).await.unwrap());
    assert_eq!(transport.plays().len(), 3);
    assert!(queue.enabled_filters().is_empty());
}

#[tokio::test(start_paused = true)]
async fn replay_resumes_at_the_elapsed_position() {
    let (player, transport) = setup(quiet_options()).await;
    let queue = player
        .play(GUILD, CHANNEL, "song", PlayOptions::default())
        .await
        .unwrap()
        .queue;

    tokio::time::advance(Duration::from_secs(30)).await;
    queue.set_filters(vec!["bassboost"]).await.unwrap();

    let replay = transport.last_play().unwrap();
    assert_eq!(replay.title, "song");
    assert_eq!(replay.seek, Duration::from_secs(30));
    assert_eq!(replay.ffmpeg_args.as_deref(), Some("bass=g=20:f=110:w=0.3"));

    // the position keeps counting from the resumed offset
    tokio::time::advance(Duration::from_secs(5)).await;
    assert_eq!(queue.elapsed().await, Duration::from_secs(35));
}

#[tokio::test(start_paused = true)]
async fn pitch_change_restarts_from_zero() {
    let (player, transport) = setup(quiet_options()).await;
    let queue = player
        .play(GUILD, CHANNEL, "song", PlayOptions::default())
        .await
        .unwrap()
        .queue;

    tokio::time::advance(Duration::from_secs(30)).await;
    queue.set_filters(vec!["nightcore"]).await.unwrap();
    assert_eq!(transport.last_play().unwrap().seek, Duration::ZERO);

    tokio::time::advance(Duration::from_secs(10)).await;
    queue.toggle_filters(&["treble"]).await.unwrap();
    assert_eq!(transport.last_play().unwrap().seek, Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn replay_is_silent_and_keeps_the_queue() {
    let (player, transport) = setup(quiet_options()).await;
    let queue = player
        .play(GUILD, CHANNEL, "list:a,b", PlayOptions::default())
        .await
        .unwrap()
        .queue;
    let mut events = player.subscribe();

    queue.set_filters(vec!["treble"]).await.unwrap();

    let events = drain(&mut events);
    assert!(matches!(
        events.as_slice(),
        [PlayerEvent::AudioFiltersUpdate { old, new, .. }] if old.ffmpeg.is_empty() && new.ffmpeg == vec!["treble".to_string()]
    ));
    assert_eq!(transport.played_titles(), vec!["a", "a"]);
    assert_eq!(titles(&queue.tracks()), vec!["b"]);
    assert!(queue.history().is_empty());
}

#[tokio::test(start_paused = true)]
async fn replay_keeps_a_paused_stream_paused() {
    let (player, transport) = setup(quiet_options()).await;
    let queue = player
        .play(GUILD, CHANNEL, "song", PlayOptions::default())
        .await
        .unwrap()
        .queue;

    queue.set_paused(true).await.unwrap();
    queue.set_filters(vec!["treble"]).await.unwrap();

    assert!(queue.is_paused());
    assert!(transport.is_paused());
}

#[tokio::test(start_paused = true)]
async fn filters_without_a_stream_do_not_replay() {
    let (player, transport) = setup(quiet_options()).await;
    let queue = player.create_queue(GUILD, None);

    assert!(queue.set_filters(FilterSelection::All(true)).await.unwrap());
    assert!(queue.disabled_filters().is_empty());
    assert!(transport.plays().is_empty());

    player.play(GUILD, CHANNEL, "song", PlayOptions::default()).await.unwrap();
    let played = transport.last_play().unwrap();
    assert!(played.ffmpeg_args.unwrap().contains("asetrate"));
}

#[tokio::test(start_paused = true)]
async fn unknown_filters_are_rejected_without_side_effects() {
    let (player, transport) = setup(quiet_options()).await;
    let queue = player
        .play(GUILD, CHANNEL, "song", PlayOptions::default())
        .await
        .unwrap()
        .queue;

    let err = queue.set_filters(vec!["bassboost", "wobble"]).await.unwrap_err();
    assert!(matches!(err, PlayerError::UnknownFilter(ref name) if name == "wobble"));
    assert!(queue.enabled_filters().is_empty());
    assert_eq!(transport.plays().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn dsp_stages_are_reported_live() {
    let (player, _transport) = setup(quiet_options()).await;
    let queue = player
        .play(GUILD, CHANNEL, "song", PlayOptions::default())
        .await
        .unwrap()
        .queue;

    queue.set_equalizer_preset("bass").await.unwrap();
    queue
        .set_biquad(Some(BiquadFilter::new(BiquadKind::LowPass, 800.0)))
        .await
        .unwrap();
    queue.set_pcm("karaoke", true).await.unwrap();
    queue.set_sample_rate(Some(44_100)).await.unwrap();

    let state = queue.filters();
    assert!(state.equalizer[0] > 0.0);
    assert_eq!(state.biquad.map(|b| b.kind), Some(BiquadKind::LowPass));
    assert_eq!(state.pcm.get("karaoke"), Some(&true));
    assert_eq!(state.sample_rate, Some(44_100));

    assert!(queue.set_sample_rate(Some(1)).await.is_err());
    assert!(queue.set_pcm("wobble", true).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn filter_change_waits_for_a_running_skip() {
    let (player, transport) = setup(quiet_options()).await;
    let queue = player
        .play(GUILD, CHANNEL, "list:a,b", PlayOptions::default())
        .await
        .unwrap()
        .queue;
    transport.set_play_delay(Duration::from_millis(50));
    let mut events = player.subscribe();

    let (skipped, changed) = tokio::join!(queue.skip(), queue.set_filters(vec!["treble"]));
    assert!(skipped.unwrap());
    assert!(changed.unwrap());

    let plays = transport.plays();
    assert_eq!(transport.played_titles(), vec!["a", "b", "b"]);
    assert_eq!(plays[1].ffmpeg_args, None);
    assert_eq!(plays[2].ffmpeg_args.as_deref(), Some("treble=g=5"));

    let events = drain(&mut events);
    assert!(matches!(
        events.as_slice(),
        [
            PlayerEvent::TrackSkip { .. },
            PlayerEvent::TrackStart { .. },
            PlayerEvent::AudioFiltersUpdate { .. }
        ]
    ));
}

#[tokio::test(start_paused = true)]
async fn sample_rate_change_restarts_the_stream() {
    let (player, transport) = setup(quiet_options()).await;
    let queue = player
        .play(GUILD, CHANNEL, "song", PlayOptions::default())
        .await
        .unwrap()
        .queue;

    tokio::time::advance(Duration::from_secs(12)).await;
    assert!(queue.set_sample_rate(Some(24_000)).await.unwrap());
    assert_eq!(transport.plays().len(), 2);
    assert_eq!(transport.last_play().unwrap().seek, Duration::from_secs(12));

    // live stages keep the running stream
    assert!(queue.set_pcm("mono", true).await.unwrap());
    assert_eq!(transport.plays().len(), 2);
}
