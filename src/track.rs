use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serenity::model::id::UserId;
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

/// Representa un track de música ya resuelto
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    id: u64,
    title: String,
    author: Option<String>,
    duration: Option<Duration>,
    thumbnail: Option<String>,
    url: String,
    extractor: Option<String>,
    raw: serde_json::Value,
    requested_by: Option<UserId>,
    playlist: Option<String>,
    added_at: DateTime<Utc>,
}

impl Track {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed),
            title: title.into(),
            author: None,
            duration: None,
            thumbnail: None,
            url: url.into(),
            extractor: None,
            raw: serde_json::Value::Null,
            requested_by: None,
            playlist: None,
            added_at: Utc::now(),
        }
    }

    /// Copia con identidad nueva (mismo contenido)
    pub fn renewed(&self) -> Self {
        Self {
            id: NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed),
            added_at: Utc::now(),
            ..self.clone()
        }
    }

    // Getters
    pub fn id(&self) -> u64 {
        self.id
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }
    pub fn url(&self) -> &str {
        &self.url
    }
    /// Identifier of the extractor that resolved this track.
    pub fn extractor(&self) -> Option<&str> {
        self.extractor.as_deref()
    }
    pub fn raw(&self) -> &serde_json::Value {
        &self.raw
    }
    pub fn requested_by(&self) -> Option<UserId> {
        self.requested_by
    }
    pub fn playlist(&self) -> Option<&str> {
        self.playlist.as_deref()
    }
    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    // Setters
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    pub fn with_extractor(mut self, identifier: impl Into<String>) -> Self {
        self.extractor = Some(identifier.into());
        self
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = raw;
        self
    }

    pub fn with_requested_by(mut self, user_id: UserId) -> Self {
        self.requested_by = Some(user_id);
        self
    }

    pub(crate) fn with_playlist(mut self, name: impl Into<String>) -> Self {
        self.playlist = Some(name.into());
        self
    }

    /// Duración legible, p.ej. `3m 25s`
    pub fn formatted_duration(&self) -> String {
        match self.duration {
            Some(d) => humantime::format_duration(Duration::from_secs(d.as_secs())).to_string(),
            None => "live".to_string(),
        }
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Track {}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.author {
            Some(author) => write!(f, "{} - {}", self.title, author),
            None => write!(f, "{}", self.title),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaylistKind {
    Album,
    Playlist,
}

/// Grupo ordenado de tracks con metadata compartida
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub title: String,
    pub author: Option<String>,
    pub url: String,
    pub thumbnail: Option<String>,
    pub kind: PlaylistKind,
    pub source: Option<String>,
    pub tracks: Vec<Track>,
}

impl Playlist {
    pub fn new(title: impl Into<String>, url: impl Into<String>, kind: PlaylistKind) -> Self {
        Self {
            title: title.into(),
            author: None,
            url: url.into(),
            thumbnail: None,
            kind,
            source: None,
            tracks: Vec::new(),
        }
    }

    /// Adds tracks, tagging each with this playlist's title.
    pub fn with_tracks(mut self, tracks: impl IntoIterator<Item = Track>) -> Self {
        let title = self.title.clone();
        self.tracks
            .extend(tracks.into_iter().map(|t| t.with_playlist(title.clone())));
        self
    }

    pub fn total_duration(&self) -> Duration {
        self.tracks.iter().filter_map(Track::duration).sum()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
