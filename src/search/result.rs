use serenity::model::id::UserId;

use super::{cache::QueryFingerprint, query::QueryType};
use crate::track::{Playlist, Track};

/// Resultado normalizado de una resolución
///
/// A result without tracks is a failed resolution, even when a playlist shell
/// is attached.
#[derive(Debug, Clone)]
pub struct SearchResult {
    query: String,
    query_type: QueryType,
    playlist: Option<Playlist>,
    tracks: Vec<Track>,
    extractor: Option<String>,
    requested_by: Option<UserId>,
}

impl SearchResult {
    pub fn new(
        query: impl Into<String>,
        query_type: QueryType,
        requested_by: Option<UserId>,
    ) -> Self {
        Self {
            query: query.into(),
            query_type,
            playlist: None,
            tracks: Vec::new(),
            extractor: None,
            requested_by,
        }
    }

    /// Empty result for a query nobody could resolve.
    pub fn empty(
        query: impl Into<String>,
        query_type: QueryType,
        requested_by: Option<UserId>,
        extractor: Option<String>,
    ) -> Self {
        Self {
            extractor,
            ..Self::new(query, query_type, requested_by)
        }
    }

    pub(crate) fn with_playlist(mut self, playlist: Option<Playlist>) -> Self {
        self.playlist = playlist;
        self
    }

    pub(crate) fn with_tracks(mut self, tracks: Vec<Track>) -> Self {
        self.tracks = tracks;
        self
    }

    pub(crate) fn with_extractor(mut self, extractor: Option<String>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }
    pub fn query_type(&self) -> &QueryType {
        &self.query_type
    }
    pub fn playlist(&self) -> Option<&Playlist> {
        self.playlist.as_ref()
    }
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }
    pub fn extractor(&self) -> Option<&str> {
        self.extractor.as_deref()
    }
    pub fn requested_by(&self) -> Option<UserId> {
        self.requested_by
    }

    pub fn has_tracks(&self) -> bool {
        !self.tracks.is_empty()
    }

    pub fn has_playlist(&self) -> bool {
        self.playlist.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn first(&self) -> Option<&Track> {
        self.tracks.first()
    }

    pub fn into_tracks(self) -> Vec<Track> {
        self.tracks
    }

    /// Cache key for this result.
    pub fn fingerprint(&self) -> QueryFingerprint {
        QueryFingerprint::new(&self.query, &self.query_type, self.requested_by)
    }
}
