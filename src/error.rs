//! Error types for the playback engine.

use thiserror::Error;

/// Errores del transporte de voz
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The voice session could not be established
    #[error("No se pudo conectar al canal de voz: {0}")]
    Connect(String),

    /// The session dropped while in use
    #[error("Conexión de voz perdida")]
    ConnectionLost,

    /// The sink refused the stream
    #[error("Error de reproducción: {0}")]
    Play(String),
}

/// Errores de extractores
#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("El extractor '{0}' ya está registrado")]
    AlreadyRegistered(String),

    #[error("El extractor '{0}' no está inicializado")]
    NotInitialized(String),

    #[error("El track no tiene extractor asociado")]
    MissingExtractor,

    #[error("Fallo al activar '{identifier}': {source}")]
    Activation {
        identifier: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Fallo de stream en '{identifier}': {source}")]
    Stream {
        identifier: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Top-level error returned by [`Player`](crate::player::Player) and
/// [`GuildQueue`](crate::queue::GuildQueue) operations.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("No se encontraron resultados para: {0}")]
    NoResult(String),

    #[error("La cola está llena (máximo {0} canciones)")]
    QueueFull(usize),

    #[error("Índice fuera de rango: {0}")]
    IndexOutOfBounds(usize),

    #[error("No hay conexión de voz activa")]
    NotConnected,

    #[error("Filtro desconocido: {0}")]
    UnknownFilter(String),

    #[error("Valor inválido: {0}")]
    InvalidValue(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Extractor(#[from] ExtractorError),
}

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, PlayerError>;
