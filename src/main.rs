use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::{sync::Arc, time::Duration};
use tracing::{error, info};

use guild_player::{
    bot::{self, Handler},
    config::Config,
    extractor::{DirectUrlExtractor, FileExtractor},
    Player,
};

fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_player=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Guild Player v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    // Reproductor con transporte songbird
    let songbird = Songbird::serenity();
    let transport = Arc::new(guild_player::transport::SongbirdTransport::new(Arc::clone(&songbird)));
    let player = Arc::new(Player::new(transport, config.player_options()));

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(20))
        .build()?;
    player
        .extractors()
        .register(Arc::new(DirectUrlExtractor::with_probe(http)))
        .await?;
    player.extractors().register(Arc::new(FileExtractor::new())).await?;
    info!("🧩 Extractores: {:?}", player.extractors().identifiers());

    tokio::spawn(bot::log_events(Arc::clone(&player)));

    // Construir cliente
    let handler = Handler::new(Arc::clone(&player), config.clone());
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = Arc::clone(&client.shard_manager);
    let shutdown_player = Arc::clone(&player);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shutdown_player.destroy_all().await;
        shutdown_player.extractors().unregister_all().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}
