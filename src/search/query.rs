use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::LazyLock};
use url::Url;

/// Clasificación de una consulta de búsqueda
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryType {
    Auto,
    AutoSearch,
    YouTube,
    YouTubePlaylist,
    YouTubeSearch,
    YouTubeVideo,
    SoundCloud,
    SoundCloudTrack,
    SoundCloudPlaylist,
    SoundCloudSearch,
    SpotifySong,
    SpotifyAlbum,
    SpotifyPlaylist,
    SpotifySearch,
    AppleMusicSong,
    AppleMusicAlbum,
    AppleMusicPlaylist,
    AppleMusicSearch,
    Vimeo,
    ReverbNation,
    Arbitrary,
    File,
    /// Forces a single extractor, written `ext:<identifier>`.
    Ext(String),
}

const NAMES: &[(&str, QueryType)] = &[
    ("auto", QueryType::Auto),
    ("autoSearch", QueryType::AutoSearch),
    ("youtube", QueryType::YouTube),
    ("youtubePlaylist", QueryType::YouTubePlaylist),
    ("youtubeSearch", QueryType::YouTubeSearch),
    ("youtubeVideo", QueryType::YouTubeVideo),
    ("soundcloud", QueryType::SoundCloud),
    ("soundcloudTrack", QueryType::SoundCloudTrack),
    ("soundcloudPlaylist", QueryType::SoundCloudPlaylist),
    ("soundcloudSearch", QueryType::SoundCloudSearch),
    ("spotifySong", QueryType::SpotifySong),
    ("spotifyAlbum", QueryType::SpotifyAlbum),
    ("spotifyPlaylist", QueryType::SpotifyPlaylist),
    ("spotifySearch", QueryType::SpotifySearch),
    ("appleMusicSong", QueryType::AppleMusicSong),
    ("appleMusicAlbum", QueryType::AppleMusicAlbum),
    ("appleMusicPlaylist", QueryType::AppleMusicPlaylist),
    ("appleMusicSearch", QueryType::AppleMusicSearch),
    ("vimeo", QueryType::Vimeo),
    ("reverbnation", QueryType::ReverbNation),
    ("arbitrary", QueryType::Arbitrary),
    ("file", QueryType::File),
];

impl QueryType {
    /// Shorthand for `QueryType::Ext(identifier)`.
    pub fn ext(identifier: impl Into<String>) -> Self {
        Self::Ext(identifier.into())
    }

    /// Identifier of the forced extractor, if this is an `ext:` engine.
    pub fn forced_extractor(&self) -> Option<&str> {
        match self {
            Self::Ext(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_search(&self) -> bool {
        matches!(
            self,
            Self::AutoSearch
                | Self::YouTubeSearch
                | Self::SoundCloudSearch
                | Self::SpotifySearch
                | Self::AppleMusicSearch
        )
    }

    pub fn is_url(&self) -> bool {
        !self.is_search() && !matches!(self, Self::Auto | Self::File | Self::Ext(_))
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Self::Ext(id) = self {
            return write!(f, "ext:{}", id);
        }
        let name = NAMES
            .iter()
            .find(|(_, qt)| qt == self)
            .map(|(name, _)| *name)
            .unwrap_or("auto");
        f.write_str(name)
    }
}

impl FromStr for QueryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(id) = s.strip_prefix("ext:") {
            if id.is_empty() {
                return Err("Identificador de extractor vacío".to_string());
            }
            return Ok(Self::Ext(id.to_string()));
        }
        NAMES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(s))
            .map(|(_, qt)| qt.clone())
            .ok_or_else(|| format!("Tipo de búsqueda desconocido: {}", s))
    }
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern}: {e}"))
}

static YOUTUBE_PLAYLIST: LazyLock<Regex> = LazyLock::new(|| {
    re(r"^https?://(www\.|m\.|music\.)?youtube\.com/(playlist|watch)\?.*\blist=[\w-]+")
});
static YOUTUBE_VIDEO: LazyLock<Regex> = LazyLock::new(|| {
    re(r"^(https?:)?//((www|m|music)\.)?(youtube\.com|youtu\.be)/(watch\?v=|embed/|v/|shorts/)?[\w-]{6,}\S*$")
});
static SOUNDCLOUD_PLAYLIST: LazyLock<Regex> =
    LazyLock::new(|| re(r"^https?://(m\.|www\.)?soundcloud\.com/[\w-]+/sets/[\w-]+"));
static SOUNDCLOUD_TRACK: LazyLock<Regex> =
    LazyLock::new(|| re(r"^https?://(m\.|www\.)?soundcloud\.com/[\w-]+/[\w-]+/?(\?.*)?$"));
static SPOTIFY_SONG: LazyLock<Regex> =
    LazyLock::new(|| re(r"^https?://(embed\.|open\.)?spotify\.com/(intl-\w+/)?track/\w+"));
static SPOTIFY_ALBUM: LazyLock<Regex> =
    LazyLock::new(|| re(r"^https?://(embed\.|open\.)?spotify\.com/(intl-\w+/)?album/\w+"));
static SPOTIFY_PLAYLIST: LazyLock<Regex> =
    LazyLock::new(|| re(r"^https?://(embed\.|open\.)?spotify\.com/(intl-\w+/)?playlist/\w+"));
static APPLE_MUSIC: LazyLock<Regex> = LazyLock::new(|| {
    re(r"^https?://music\.apple\.com/[^/]+/(song|album|playlist)/")
});
static VIMEO: LazyLock<Regex> = LazyLock::new(|| {
    re(r"^https?://(www\.|player\.)?vimeo\.com/(channels/(\w+/)?|groups/[^/]*/videos/|video/)?\d+/?$")
});
static REVERBNATION: LazyLock<Regex> =
    LazyLock::new(|| re(r"^https://(www\.)?reverbnation\.com/.+/song/.+$"));

/// Clasifica consultas de texto libre
pub struct QueryResolver;

impl QueryResolver {
    /// Auto-detecta el tipo de consulta. Texto que no es URL cae en `fallback`.
    pub fn resolve(query: &str, fallback: &QueryType) -> QueryType {
        let query = query.trim();

        if query.starts_with("file://") || query.starts_with('/') || query.starts_with("./") {
            return QueryType::File;
        }
        if YOUTUBE_PLAYLIST.is_match(query) {
            return QueryType::YouTubePlaylist;
        }
        if YOUTUBE_VIDEO.is_match(query) {
            return QueryType::YouTubeVideo;
        }
        if SOUNDCLOUD_PLAYLIST.is_match(query) {
            return QueryType::SoundCloudPlaylist;
        }
        if SOUNDCLOUD_TRACK.is_match(query) {
            return QueryType::SoundCloudTrack;
        }
        if SPOTIFY_SONG.is_match(query) {
            return QueryType::SpotifySong;
        }
        if SPOTIFY_ALBUM.is_match(query) {
            return QueryType::SpotifyAlbum;
        }
        if SPOTIFY_PLAYLIST.is_match(query) {
            return QueryType::SpotifyPlaylist;
        }
        if let Some(caps) = APPLE_MUSIC.captures(query) {
            return match &caps[1] {
                "album" => QueryType::AppleMusicAlbum,
                "playlist" => QueryType::AppleMusicPlaylist,
                _ => QueryType::AppleMusicSong,
            };
        }
        if VIMEO.is_match(query) {
            return QueryType::Vimeo;
        }
        if REVERBNATION.is_match(query) {
            return QueryType::ReverbNation;
        }
        if Self::is_url(query) {
            return QueryType::Arbitrary;
        }

        fallback.clone()
    }

    pub fn is_url(query: &str) -> bool {
        Url::parse(query)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(q: &str) -> QueryType {
        QueryResolver::resolve(q, &QueryType::AutoSearch)
    }

    #[test]
    fn detects_known_sources() {
        assert_eq!(resolve("https://www.youtube.com/watch?v=dQw4w9WgXcQ"), QueryType::YouTubeVideo);
        assert_eq!(resolve("https://youtu.be/dQw4w9WgXcQ"), QueryType::YouTubeVideo);
        assert_eq!(
            resolve("https://www.youtube.com/playlist?list=PL1234567890abc"),
            QueryType::YouTubePlaylist
        );
        assert_eq!(resolve("https://soundcloud.com/artist/song-name"), QueryType::SoundCloudTrack);
        assert_eq!(resolve("https://soundcloud.com/artist/sets/mix"), QueryType::SoundCloudPlaylist);
        assert_eq!(
            resolve("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC"),
            QueryType::SpotifySong
        );
        assert_eq!(
            resolve("https://music.apple.com/us/album/some-album/1440857781"),
            QueryType::AppleMusicAlbum
        );
        assert_eq!(resolve("https://vimeo.com/76979871"), QueryType::Vimeo);
    }

    #[test]
    fn falls_back_for_plain_text() {
        assert_eq!(resolve("never gonna give you up"), QueryType::AutoSearch);
        assert_eq!(
            QueryResolver::resolve("lofi beats", &QueryType::YouTubeSearch),
            QueryType::YouTubeSearch
        );
    }

    #[test]
    fn arbitrary_urls_and_files() {
        assert_eq!(resolve("https://example.com/stream.mp3"), QueryType::Arbitrary);
        assert_eq!(resolve("/music/song.flac"), QueryType::File);
        assert_eq!(resolve("file:///music/song.flac"), QueryType::File);
    }

    #[test]
    fn parses_engine_names() {
        assert_eq!("youtubeSearch".parse::<QueryType>(), Ok(QueryType::YouTubeSearch));
        assert_eq!("ext:direct-url".parse::<QueryType>(), Ok(QueryType::ext("direct-url")));
        assert!("ext:".parse::<QueryType>().is_err());
        assert!("nope".parse::<QueryType>().is_err());
        assert_eq!(QueryType::ext("file").to_string(), "ext:file");
        assert_eq!(QueryType::SpotifyAlbum.to_string(), "spotifyAlbum");
    }
}
