use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{Extractor, ExtractorContext, ExtractorInfo, StreamSource};
use crate::{search::query::QueryType, track::Track};

const AUDIO_EXTENSIONS: [&str; 7] = [".mp3", ".wav", ".ogg", ".flac", ".m4a", ".opus", ".webm"];
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Cabeceras relevantes de la respuesta a un HEAD
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlProbe {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
}

impl UrlProbe {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_lowercase());
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok());

        Self {
            content_type,
            content_length,
        }
    }

    /// Sin content-type no se puede descartar nada
    pub fn is_audio(&self) -> bool {
        match self.content_type.as_deref() {
            None => true,
            Some(kind) => {
                kind.starts_with("audio/")
                    || kind.starts_with("video/")
                    || matches!(kind, "application/ogg" | "application/octet-stream")
            }
        }
    }
}

/// Cliente para URLs directas de audio
#[derive(Debug, Default)]
pub struct DirectUrlExtractor {
    http: Option<reqwest::Client>,
}

impl DirectUrlExtractor {
    pub const IDENTIFIER: &'static str = "direct-url";

    /// Sin sondeo HEAD: la URL se acepta tal cual
    pub fn new() -> Self {
        Self { http: None }
    }

    /// Sondea cada URL con un HEAD antes de aceptarla
    pub fn with_probe(http: reqwest::Client) -> Self {
        Self { http: Some(http) }
    }

    async fn probe(&self, url: &Url) -> Option<UrlProbe> {
        let http = self.http.as_ref()?;
        match http.head(url.as_str()).timeout(PROBE_TIMEOUT).send().await {
            Ok(response) if response.status().is_success() => {
                let probe = UrlProbe::from_headers(response.headers());
                debug!("🔍 HEAD {}: {:?}", url, probe);
                Some(probe)
            }
            Ok(response) => {
                debug!("HEAD {} respondió {}", url, response.status());
                None
            }
            Err(e) => {
                warn!("⚠️ No se pudo sondear {}: {}", url, e);
                None
            }
        }
    }

    fn is_audio_url(url: &Url) -> bool {
        let path = url.path().to_lowercase();
        AUDIO_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
    }

    /// Título a partir del último segmento de la ruta
    fn title_from(url: &Url) -> String {
        let segment = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| url.host_str().unwrap_or("stream"));

        let decoded = urlencoding::decode(segment)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| segment.to_string());

        match decoded.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => decoded,
        }
    }
}

#[async_trait]
impl Extractor for DirectUrlExtractor {
    fn identifier(&self) -> &str {
        Self::IDENTIFIER
    }

    async fn validate(&self, query: &str, query_type: &QueryType) -> bool {
        let Ok(url) = Url::parse(query) else {
            return false;
        };
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        *query_type == QueryType::Arbitrary || Self::is_audio_url(&url)
    }

    async fn handle(&self, query: &str, context: &ExtractorContext) -> Result<ExtractorInfo> {
        let url = Url::parse(query)?;
        let probe = self.probe(&url).await.unwrap_or_default();
        if !probe.is_audio() {
            anyhow::bail!(
                "{} no es audio ({})",
                url,
                probe.content_type.as_deref().unwrap_or("desconocido")
            );
        }

        let mut track = Track::new(Self::title_from(&url), url.as_str())
            .with_extractor(Self::IDENTIFIER)
            .with_raw(serde_json::json!({
                "source": "arbitrary",
                "url": url.as_str(),
                "content_type": probe.content_type,
                "content_length": probe.content_length,
            }));

        if let Some(host) = url.host_str() {
            track = track.with_author(host);
        }
        if let Some(user) = context.requested_by {
            track = track.with_requested_by(user);
        }

        Ok(ExtractorInfo::new(None, vec![track]))
    }

    async fn stream(&self, track: &Track) -> Result<StreamSource> {
        Ok(StreamSource::Url(track.url().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serenity::model::id::UserId;

    #[tokio::test]
    async fn validates_audio_urls() {
        let ext = DirectUrlExtractor::new();
        assert!(ext.validate("https://cdn.example.com/a/song.mp3", &QueryType::AutoSearch).await);
        assert!(ext.validate("https://radio.example.com/live", &QueryType::Arbitrary).await);
        assert!(!ext.validate("https://radio.example.com/live", &QueryType::AutoSearch).await);
        assert!(!ext.validate("not a url", &QueryType::Arbitrary).await);
        assert!(!ext.validate("ftp://example.com/song.mp3", &QueryType::Arbitrary).await);
    }

    #[tokio::test]
    async fn handle_builds_a_track() {
        let ext = DirectUrlExtractor::new();
        let ctx = ExtractorContext {
            query_type: QueryType::Arbitrary,
            requested_by: Some(UserId::new(7)),
        };
        let info = ext
            .handle("https://cdn.example.com/music/My%20Song.mp3", &ctx)
            .await
            .unwrap();

        let track = &info.tracks[0];
        assert_eq!(track.title(), "My Song");
        assert_eq!(track.author(), Some("cdn.example.com"));
        assert_eq!(track.extractor(), Some(DirectUrlExtractor::IDENTIFIER));
        assert_eq!(track.requested_by(), Some(UserId::new(7)));
        assert_eq!(
            ext.stream(track).await.unwrap(),
            StreamSource::Url("https://cdn.example.com/music/My%20Song.mp3".to_string())
        );
    }

    #[test]
    fn probe_reads_content_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("Audio/MPEG; charset=binary"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("4096"));

        let probe = UrlProbe::from_headers(&headers);
        assert_eq!(probe.content_type.as_deref(), Some("audio/mpeg"));
        assert_eq!(probe.content_length, Some(4096));
        assert!(probe.is_audio());
    }

    #[test]
    fn probe_rejects_web_pages() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        assert!(!UrlProbe::from_headers(&headers).is_audio());

        assert!(UrlProbe::default().is_audio());
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/ogg"));
        assert!(UrlProbe::from_headers(&headers).is_audio());
    }
}
