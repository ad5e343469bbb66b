//! # Extractors
//!
//! Pluggable resolvers that turn a query into [`Track`]s and a [`Track`] into
//! something the transport can stream.
//!
//! Extractors are registered at runtime on the
//! [`ExtractorRegistry`](registry::ExtractorRegistry) and are consulted in
//! registration order by the search pipeline. Each one carries a static
//! identifier used to force it (`ext:<identifier>`) or to block it.

pub mod direct_url;
pub mod file;
pub mod registry;

use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::UserId;
use std::path::PathBuf;

use crate::{
    search::query::QueryType,
    track::{Playlist, Track},
};

pub use direct_url::DirectUrlExtractor;
pub use file::FileExtractor;
pub use registry::ExtractorRegistry;

/// Contexto pasado a `handle`
#[derive(Debug, Clone)]
pub struct ExtractorContext {
    pub query_type: QueryType,
    pub requested_by: Option<UserId>,
}

/// Lo que un extractor devuelve al resolver una consulta
#[derive(Debug, Clone, Default)]
pub struct ExtractorInfo {
    pub playlist: Option<Playlist>,
    pub tracks: Vec<Track>,
}

impl ExtractorInfo {
    pub fn new(playlist: Option<Playlist>, tracks: Vec<Track>) -> Self {
        Self { playlist, tracks }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Where the audio bytes of a track can be read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSource {
    /// Remote resource fetched over HTTP
    Url(String),
    /// Local file
    File(PathBuf),
}

/// Trait común para todas las fuentes de música
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Identificador único, usado por `ext:<id>` y las listas de bloqueo
    fn identifier(&self) -> &str;

    /// Called once when registered.
    async fn activate(&self) -> Result<()> {
        Ok(())
    }

    /// Called once when unregistered.
    async fn deactivate(&self) -> Result<()> {
        Ok(())
    }

    /// Verifica si este extractor puede resolver la consulta
    async fn validate(&self, query: &str, query_type: &QueryType) -> bool;

    /// Resuelve la consulta en tracks
    async fn handle(&self, query: &str, context: &ExtractorContext) -> Result<ExtractorInfo>;

    /// Obtiene la fuente de audio de un track resuelto por este extractor
    async fn stream(&self, track: &Track) -> Result<StreamSource>;

    /// Tracks relacionados, usados por el modo autoplay
    async fn related_tracks(&self, _track: &Track, _history: &[Track]) -> Result<ExtractorInfo> {
        Ok(ExtractorInfo::empty())
    }
}
