use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};

use crate::{player::PlayerOptions, queue::GuildQueueOptions};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub max_history: usize,

    // Comportamiento de la cola
    pub leave_on_empty: bool,
    pub leave_on_empty_cooldown: Duration,
    pub leave_on_end: bool,
    pub leave_on_end_cooldown: Duration,
    pub pause_on_empty: bool,

    // Caché de búsquedas
    pub enable_query_cache: bool,
    pub cache_size: usize,
    pub cache_ttl: Duration,

    // Rendimiento
    pub worker_threads: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Construye la configuración a partir de una función de búsqueda de variables
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let config = Self {
            // Discord
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            command_prefix: var("COMMAND_PREFIX").unwrap_or(defaults.command_prefix),

            // Audio
            default_volume: parse_or(var("DEFAULT_VOLUME"), "DEFAULT_VOLUME", defaults.default_volume)?,
            max_queue_size: parse_or(var("MAX_QUEUE_SIZE"), "MAX_QUEUE_SIZE", defaults.max_queue_size)?,
            max_history: parse_or(var("MAX_HISTORY"), "MAX_HISTORY", defaults.max_history)?,

            // Cola
            leave_on_empty: parse_or(var("LEAVE_ON_EMPTY"), "LEAVE_ON_EMPTY", defaults.leave_on_empty)?,
            leave_on_empty_cooldown: duration_or(
                var("LEAVE_ON_EMPTY_COOLDOWN"),
                "LEAVE_ON_EMPTY_COOLDOWN",
                defaults.leave_on_empty_cooldown,
            )?,
            leave_on_end: parse_or(var("LEAVE_ON_END"), "LEAVE_ON_END", defaults.leave_on_end)?,
            leave_on_end_cooldown: duration_or(
                var("LEAVE_ON_END_COOLDOWN"),
                "LEAVE_ON_END_COOLDOWN",
                defaults.leave_on_end_cooldown,
            )?,
            pause_on_empty: parse_or(var("PAUSE_ON_EMPTY"), "PAUSE_ON_EMPTY", defaults.pause_on_empty)?,

            // Caché
            enable_query_cache: parse_or(
                var("ENABLE_QUERY_CACHE"),
                "ENABLE_QUERY_CACHE",
                defaults.enable_query_cache,
            )?,
            cache_size: parse_or(var("CACHE_SIZE"), "CACHE_SIZE", defaults.cache_size)?,
            cache_ttl: duration_or(var("CACHE_TTL"), "CACHE_TTL", defaults.cache_ttl)?,

            // Rendimiento
            worker_threads: parse_or(var("WORKER_THREADS"), "WORKER_THREADS", defaults.worker_threads)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Queue, history and cache sizes must be greater than 0
    /// - At least one worker thread
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 0.0 and 2.0, got: {}", self.default_volume);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_history == 0 {
            anyhow::bail!("Max history must be greater than 0");
        }

        if self.enable_query_cache && self.cache_size == 0 {
            anyhow::bail!("Cache size must be greater than 0");
        }

        if self.worker_threads == 0 {
            anyhow::bail!("Worker threads must be greater than 0");
        }

        if self.command_prefix.is_empty() {
            anyhow::bail!("Command prefix cannot be empty");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Prefix: {}\n  \
            Audio: {}% vol, {} queue, {} history\n  \
            Leave: empty={} ({}), end={} ({}), pause_on_empty={}\n  \
            Cache: enabled={}, {} entries, ttl {}\n  \
            Workers: {}",
            self.command_prefix,
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            self.max_history,
            self.leave_on_empty,
            humantime::format_duration(self.leave_on_empty_cooldown),
            self.leave_on_end,
            humantime::format_duration(self.leave_on_end_cooldown),
            self.pause_on_empty,
            self.enable_query_cache,
            self.cache_size,
            humantime::format_duration(self.cache_ttl),
            self.worker_threads
        )
    }

    pub fn queue_options(&self) -> GuildQueueOptions {
        GuildQueueOptions {
            volume: self.default_volume,
            max_queue_size: self.max_queue_size,
            max_history: self.max_history,
            leave_on_empty: self.leave_on_empty,
            leave_on_empty_cooldown: self.leave_on_empty_cooldown,
            leave_on_end: self.leave_on_end,
            leave_on_end_cooldown: self.leave_on_end_cooldown,
            pause_on_empty: self.pause_on_empty,
            ..GuildQueueOptions::default()
        }
    }

    pub fn player_options(&self) -> PlayerOptions {
        PlayerOptions {
            queue: self.queue_options(),
            enable_query_cache: self.enable_query_cache,
            cache_size: self.cache_size,
            cache_ttl: Some(self.cache_ttl),
            ..PlayerOptions::default()
        }
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Valor inválido para {}: '{}'", key, raw)),
        None => Ok(default),
    }
}

/// Acepta `90`, `90s`, `5m`, `1h 30m`...
fn duration_or(value: Option<String>, key: &str, default: Duration) -> Result<Duration> {
    match value {
        Some(raw) => {
            let raw = raw.trim();
            if let Ok(secs) = raw.parse::<u64>() {
                return Ok(Duration::from_secs(secs));
            }
            humantime::parse_duration(raw).with_context(|| format!("Duración inválida para {}: '{}'", key, raw))
        }
        None => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        let queue = GuildQueueOptions::default();
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            command_prefix: "!".to_string(),

            // Audio defaults
            default_volume: queue.volume,
            max_queue_size: queue.max_queue_size,
            max_history: queue.max_history,

            // Queue defaults
            leave_on_empty: queue.leave_on_empty,
            leave_on_empty_cooldown: queue.leave_on_empty_cooldown,
            leave_on_end: queue.leave_on_end,
            leave_on_end_cooldown: queue.leave_on_end_cooldown,
            pause_on_empty: queue.pause_on_empty,

            // Cache defaults
            enable_query_cache: true,
            cache_size: 100,
            cache_ttl: Duration::from_secs(3600),

            // Performance defaults
            worker_threads: num_cpus::get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn loads_defaults_with_only_a_token() {
        let config = Config::from_lookup(lookup(&[("DISCORD_TOKEN", "abc")])).unwrap();
        assert_eq!(config.command_prefix, "!");
        assert_eq!(config.max_history, 50);
        assert_eq!(config.leave_on_empty_cooldown, Duration::from_secs(60));
        assert!(config.summary().contains("Prefix: !"));
        assert!(!config.summary().contains("abc"));
    }

    #[test]
    fn token_is_required() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
    }

    #[test]
    fn parses_durations_and_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "abc"),
            ("LEAVE_ON_EMPTY_COOLDOWN", "5m"),
            ("LEAVE_ON_END_COOLDOWN", "30"),
            ("CACHE_TTL", "1h 30m"),
            ("PAUSE_ON_EMPTY", "false"),
            ("DEFAULT_VOLUME", "1.5"),
        ]))
        .unwrap();

        assert_eq!(config.leave_on_empty_cooldown, Duration::from_secs(300));
        assert_eq!(config.leave_on_end_cooldown, Duration::from_secs(30));
        assert_eq!(config.cache_ttl, Duration::from_secs(5400));
        assert!(!config.pause_on_empty);

        let options = config.player_options();
        assert_eq!(options.queue.volume, 1.5);
        assert_eq!(options.cache_ttl, Some(Duration::from_secs(5400)));
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(Config::from_lookup(lookup(&[("DISCORD_TOKEN", "abc"), ("DEFAULT_VOLUME", "3")])).is_err());
        assert!(Config::from_lookup(lookup(&[("DISCORD_TOKEN", "abc"), ("MAX_QUEUE_SIZE", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("DISCORD_TOKEN", "abc"), ("CACHE_TTL", "soon")])).is_err());
    }
}
