//! # Search Module
//!
//! Turns free-form queries into playable [`Track`]s.
//!
//! ## Resolution order
//!
//! 1. Already-resolved values ([`Track`], `Vec<Track>`, [`Playlist`]) are
//!    wrapped as-is and never cached.
//! 2. Text is classified into a [`QueryType`] (regex auto-detection unless an
//!    explicit engine is requested).
//! 3. An `ext:<identifier>` engine restricts resolution to that extractor.
//! 4. Otherwise the [`QueryCache`] is consulted (unless `ignore_cache`).
//! 5. Registered extractors are asked to `validate` in registration order; the
//!    first match handles the query. If it fails, every non-blocked extractor
//!    (the failed one included) gets a direct `handle` attempt.
//! 6. Non-empty results are written back to the cache.
//!
//! Resolution never errors: a query nobody can resolve yields an empty
//! [`SearchResult`].

pub mod cache;
pub mod lru_cache;
pub mod query;
pub mod result;

use serenity::model::id::UserId;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    error::{ExtractorError, Result},
    extractor::{Extractor, ExtractorContext, ExtractorInfo, ExtractorRegistry, StreamSource},
    track::{Playlist, Track},
};

pub use cache::{MemoryQueryCache, QueryCache, QueryFingerprint};
pub use query::{QueryResolver, QueryType};
pub use result::SearchResult;

/// Anything `search` accepts.
#[derive(Debug, Clone)]
pub enum SearchQuery {
    Text(String),
    Track(Track),
    Tracks(Vec<Track>),
    Playlist(Playlist),
}

impl From<&str> for SearchQuery {
    fn from(query: &str) -> Self {
        Self::Text(query.to_string())
    }
}

impl From<String> for SearchQuery {
    fn from(query: String) -> Self {
        Self::Text(query)
    }
}

impl From<Track> for SearchQuery {
    fn from(track: Track) -> Self {
        Self::Track(track)
    }
}

impl From<Vec<Track>> for SearchQuery {
    fn from(tracks: Vec<Track>) -> Self {
        Self::Tracks(tracks)
    }
}

impl From<Playlist> for SearchQuery {
    fn from(playlist: Playlist) -> Self {
        Self::Playlist(playlist)
    }
}

/// Opciones de búsqueda
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub requested_by: Option<UserId>,
    /// `Auto` classifies the query; `Ext(id)` forces one extractor.
    pub search_engine: QueryType,
    /// Type assumed for plain text when auto-detecting.
    pub fallback_search_engine: Option<QueryType>,
    pub block_extractors: Vec<String>,
    pub ignore_cache: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            requested_by: None,
            search_engine: QueryType::Auto,
            fallback_search_engine: None,
            block_extractors: Vec::new(),
            ignore_cache: false,
        }
    }
}

impl SearchOptions {
    pub fn requested_by(mut self, user: UserId) -> Self {
        self.requested_by = Some(user);
        self
    }

    pub fn search_engine(mut self, engine: QueryType) -> Self {
        self.search_engine = engine;
        self
    }

    pub fn fallback_search_engine(mut self, engine: QueryType) -> Self {
        self.fallback_search_engine = Some(engine);
        self
    }

    pub fn block(mut self, identifier: impl Into<String>) -> Self {
        self.block_extractors.push(identifier.into());
        self
    }

    pub fn ignore_cache(mut self, ignore: bool) -> Self {
        self.ignore_cache = ignore;
        self
    }

    fn is_blocked(&self, extractor: &dyn Extractor) -> bool {
        self.block_extractors
            .iter()
            .any(|id| id == extractor.identifier())
    }
}

/// Registro de extractores + caché + cascada de resolución
pub struct ExtractorPipeline {
    registry: ExtractorRegistry,
    cache: Option<Arc<dyn QueryCache>>,
    fallback_search_engine: QueryType,
}

impl ExtractorPipeline {
    pub fn new(cache: Option<Arc<dyn QueryCache>>) -> Self {
        Self {
            registry: ExtractorRegistry::new(),
            cache,
            fallback_search_engine: QueryType::AutoSearch,
        }
    }

    pub fn with_fallback_search_engine(mut self, engine: QueryType) -> Self {
        self.fallback_search_engine = engine;
        self
    }

    pub fn registry(&self) -> &ExtractorRegistry {
        &self.registry
    }

    pub fn cache(&self) -> Option<&Arc<dyn QueryCache>> {
        self.cache.as_ref()
    }

    /// Busca y resuelve una consulta a tracks
    pub async fn search(
        &self,
        query: impl Into<SearchQuery>,
        options: &SearchOptions,
    ) -> SearchResult {
        let query = match query.into() {
            SearchQuery::Text(text) => text,
            SearchQuery::Track(track) => {
                let extractor = track.extractor().map(str::to_string);
                return SearchResult::new(track.url(), QueryType::Auto, options.requested_by)
                    .with_extractor(extractor)
                    .with_tracks(vec![track]);
            }
            SearchQuery::Tracks(tracks) => {
                let query = tracks.first().map(|t| t.url().to_string()).unwrap_or_default();
                let extractor = tracks
                    .first()
                    .and_then(|t| t.extractor())
                    .map(str::to_string);
                return SearchResult::new(query, QueryType::Auto, options.requested_by)
                    .with_extractor(extractor)
                    .with_tracks(tracks);
            }
            SearchQuery::Playlist(playlist) => {
                let extractor = playlist.source.clone();
                let tracks = playlist.tracks.clone();
                return SearchResult::new(playlist.url.clone(), QueryType::Auto, options.requested_by)
                    .with_extractor(extractor)
                    .with_tracks(tracks)
                    .with_playlist(Some(playlist));
            }
        };

        let query_type = match &options.search_engine {
            QueryType::Auto | QueryType::Ext(_) => QueryResolver::resolve(
                &query,
                options
                    .fallback_search_engine
                    .as_ref()
                    .unwrap_or(&self.fallback_search_engine),
            ),
            explicit => explicit.clone(),
        };
        debug!("🔍 Buscando '{}' como {}", query, query_type);

        let context = ExtractorContext {
            query_type: query_type.clone(),
            requested_by: options.requested_by,
        };

        let extractor = match options.search_engine.forced_extractor() {
            Some(identifier) => match self.registry.get(identifier) {
                Some(extractor) => Some(extractor),
                None => {
                    warn!("⚠️ Extractor forzado no registrado: {}", identifier);
                    return SearchResult::empty(query, query_type, options.requested_by, None);
                }
            },
            None => {
                if !options.ignore_cache {
                    if let Some(hit) = self.cached(&query, &query_type, options).await {
                        return hit;
                    }
                }
                self.find_validating(&query, &query_type, options).await
            }
        };

        let Some(extractor) = extractor else {
            debug!("Ningún extractor aceptó '{}'", query);
            return SearchResult::empty(query, query_type, options.requested_by, None);
        };

        match extractor.handle(&query, &context).await {
            Ok(info) => {
                let result = self.build_result(&query, &query_type, options, extractor.as_ref(), info);
                self.write_back(&result, options).await;
                return result;
            }
            Err(e) => {
                warn!(
                    "❌ '{}' falló al resolver '{}': {:?}",
                    extractor.identifier(),
                    query,
                    e
                );
            }
        }

        // Cascada exhaustiva: incluye al extractor que acaba de fallar
        let mut last_attempted = Some(extractor.identifier().to_string());
        for candidate in self.registry.snapshot() {
            if options.is_blocked(candidate.as_ref()) {
                continue;
            }
            last_attempted = Some(candidate.identifier().to_string());
            match candidate.handle(&query, &context).await {
                Ok(info) if !info.is_empty() => {
                    info!("🔁 '{}' resolvió '{}' en la cascada", candidate.identifier(), query);
                    let result =
                        self.build_result(&query, &query_type, options, candidate.as_ref(), info);
                    self.write_back(&result, options).await;
                    return result;
                }
                Ok(_) => {}
                Err(e) => debug!("Cascada: '{}' falló: {:?}", candidate.identifier(), e),
            }
        }

        SearchResult::empty(query, query_type, options.requested_by, last_attempted)
    }

    async fn cached(
        &self,
        query: &str,
        query_type: &QueryType,
        options: &SearchOptions,
    ) -> Option<SearchResult> {
        let cache = self.cache.as_ref()?;
        let fingerprint = QueryFingerprint::new(query, query_type, options.requested_by);
        let hit = cache.resolve(&fingerprint).await?;
        if !hit.has_tracks() {
            return None;
        }
        debug!("⚡ Resultado desde caché para '{}'", query);
        // a cached result may be enqueued again; each enqueue needs distinct tracks
        let tracks = hit.tracks().iter().map(Track::renewed).collect();
        Some(hit.with_tracks(tracks))
    }

    async fn find_validating(
        &self,
        query: &str,
        query_type: &QueryType,
        options: &SearchOptions,
    ) -> Option<Arc<dyn Extractor>> {
        for extractor in self.registry.snapshot() {
            if options.is_blocked(extractor.as_ref()) {
                continue;
            }
            if extractor.validate(query, query_type).await {
                return Some(extractor);
            }
        }
        None
    }

    fn build_result(
        &self,
        query: &str,
        query_type: &QueryType,
        options: &SearchOptions,
        extractor: &dyn Extractor,
        info: ExtractorInfo,
    ) -> SearchResult {
        let identifier = extractor.identifier().to_string();
        let result = SearchResult::new(query, query_type.clone(), options.requested_by)
            .with_extractor(Some(identifier.clone()));
        if info.is_empty() {
            return result;
        }

        let tracks = info
            .tracks
            .into_iter()
            .map(|track| {
                let track = if track.extractor().is_none() {
                    track.with_extractor(identifier.clone())
                } else {
                    track
                };
                match (track.requested_by(), options.requested_by) {
                    (None, Some(user)) => track.with_requested_by(user),
                    _ => track,
                }
            })
            .collect();

        result.with_tracks(tracks).with_playlist(info.playlist)
    }

    async fn write_back(&self, result: &SearchResult, options: &SearchOptions) {
        // forced results are keyed like unforced ones and would shadow them
        if options.ignore_cache
            || result.is_empty()
            || options.search_engine.forced_extractor().is_some()
        {
            return;
        }
        if let Some(cache) = &self.cache {
            cache.add_data(result.clone()).await;
        }
    }

    /// Obtiene la fuente de audio delegando en el extractor dueño del track
    pub async fn stream(&self, track: &Track) -> Result<StreamSource> {
        let identifier = track.extractor().ok_or(ExtractorError::MissingExtractor)?;
        let extractor = self
            .registry
            .get(identifier)
            .ok_or_else(|| ExtractorError::NotInitialized(identifier.to_string()))?;

        let source = extractor
            .stream(track)
            .await
            .map_err(|source| ExtractorError::Stream {
                identifier: identifier.to_string(),
                source,
            })?;
        Ok(source)
    }

    /// Tracks relacionados para autoplay; errores se tratan como "sin resultados"
    pub async fn related_tracks(&self, track: &Track, history: &[Track]) -> ExtractorInfo {
        let Some(extractor) = track.extractor().and_then(|id| self.registry.get(id)) else {
            return ExtractorInfo::empty();
        };
        match extractor.related_tracks(track, history).await {
            Ok(mut info) => {
                // related tracks are streamed by the extractor that found them
                info.tracks = info
                    .tracks
                    .into_iter()
                    .map(|related| {
                        if related.extractor().is_some() {
                            related
                        } else {
                            related.with_extractor(extractor.identifier())
                        }
                    })
                    .collect();
                info
            }
            Err(e) => {
                warn!("⚠️ Autoplay: '{}' falló: {:?}", extractor.identifier(), e);
                ExtractorInfo::empty()
            }
        }
    }
}

impl std::fmt::Debug for ExtractorPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorPipeline")
            .field("registry", &self.registry)
            .field("cache", &self.cache.is_some())
            .field("fallback_search_engine", &self.fallback_search_engine)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::cache::MockQueryCache;
    use crate::track::PlaylistKind;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Copy)]
    enum Behavior {
        Tracks(usize),
        Empty,
        Fail,
    }

    struct Fake {
        id: &'static str,
        accepts: Option<QueryType>,
        behavior: Behavior,
        handled: AtomicUsize,
    }

    impl Fake {
        fn new(id: &'static str, accepts: Option<QueryType>, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                id,
                accepts,
                behavior,
                handled: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.handled.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Extractor for Fake {
        fn identifier(&self) -> &str {
            self.id
        }
        async fn validate(&self, _query: &str, query_type: &QueryType) -> bool {
            self.accepts.as_ref().map_or(true, |qt| qt == query_type)
        }
        async fn handle(&self, query: &str, _ctx: &ExtractorContext) -> anyhow::Result<ExtractorInfo> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Tracks(n) => Ok(ExtractorInfo::new(
                    None,
                    (0..n).map(|i| Track::new(format!("{query} {i}"), format!("u{i}"))).collect(),
                )),
                Behavior::Empty => Ok(ExtractorInfo::new(
                    Some(Playlist::new("shell", "u", PlaylistKind::Playlist)),
                    Vec::new(),
                )),
                Behavior::Fail => anyhow::bail!("upstream down"),
            }
        }
        async fn stream(&self, track: &Track) -> anyhow::Result<StreamSource> {
            Ok(StreamSource::Url(track.url().to_string()))
        }
    }

    async fn pipeline(extractors: Vec<Arc<Fake>>, cache: bool) -> ExtractorPipeline {
        let cache: Option<Arc<dyn QueryCache>> = if cache {
            Some(Arc::new(MemoryQueryCache::new(16, None)))
        } else {
            None
        };
        let pipeline = ExtractorPipeline::new(cache);
        for ext in extractors {
            pipeline.registry().register(ext).await.unwrap();
        }
        pipeline
    }

    #[tokio::test]
    async fn falls_through_to_the_validating_extractor() {
        let a = Fake::new("a", Some(QueryType::SoundCloudSearch), Behavior::Tracks(1));
        let b = Fake::new("b", Some(QueryType::YouTubeSearch), Behavior::Tracks(2));
        let pipeline = pipeline(vec![a.clone(), b.clone()], false).await;

        let options = SearchOptions::default().search_engine(QueryType::YouTubeSearch);
        let result = pipeline.search("lofi", &options).await;

        assert_eq!(result.extractor(), Some("b"));
        assert_eq!(result.tracks().len(), 2);
        assert_eq!(result.tracks()[0].extractor(), Some("b"));
        assert_eq!(a.calls(), 0);
    }

    #[tokio::test]
    async fn second_identical_query_hits_the_cache() {
        let a = Fake::new("a", None, Behavior::Tracks(1));
        let pipeline = pipeline(vec![a.clone()], true).await;
        let options = SearchOptions::default().requested_by(UserId::new(3));

        let first = pipeline.search("song", &options).await;
        let second = pipeline.search("song", &options).await;

        assert_eq!(a.calls(), 1);
        assert_eq!(second.tracks()[0].title(), first.tracks()[0].title());
        assert_ne!(second.tracks()[0].id(), first.tracks()[0].id());
    }

    #[tokio::test]
    async fn ignore_cache_bypasses_reads_and_writes() {
        let a = Fake::new("a", None, Behavior::Tracks(1));
        let pipeline = pipeline(vec![a.clone()], true).await;
        let options = SearchOptions::default().ignore_cache(true);

        pipeline.search("song", &options).await;
        pipeline.search("song", &options).await;
        assert_eq!(a.calls(), 2);

        // nothing was written, so a cached search still misses
        pipeline.search("song", &SearchOptions::default()).await;
        assert_eq!(a.calls(), 3);
    }

    #[tokio::test]
    async fn all_empty_extractors_yield_empty_result() {
        let a = Fake::new("a", None, Behavior::Empty);
        let b = Fake::new("b", None, Behavior::Empty);
        let pipeline = pipeline(vec![a, b], true).await;

        let result = pipeline
            .search("not a real song xyz123", &SearchOptions::default())
            .await;
        assert!(result.tracks().is_empty());
        assert!(result.playlist().is_none());
    }

    #[tokio::test]
    async fn failing_handle_triggers_cascade_including_itself() {
        let a = Fake::new("a", None, Behavior::Fail);
        let b = Fake::new("b", Some(QueryType::Vimeo), Behavior::Tracks(1));
        let pipeline = pipeline(vec![a.clone(), b.clone()], false).await;

        let result = pipeline.search("anything", &SearchOptions::default()).await;
        assert_eq!(result.extractor(), Some("b"));
        // validated handle + cascade retry
        assert_eq!(a.calls(), 2);
        assert_eq!(b.calls(), 1);
    }

    #[tokio::test]
    async fn cascade_failure_reports_last_attempted() {
        let a = Fake::new("a", None, Behavior::Fail);
        let b = Fake::new("b", None, Behavior::Fail);
        let pipeline = pipeline(vec![a, b], false).await;

        let result = pipeline.search("anything", &SearchOptions::default()).await;
        assert!(result.is_empty());
        assert_eq!(result.extractor(), Some("b"));
    }

    #[tokio::test]
    async fn blocked_extractors_are_skipped() {
        let a = Fake::new("a", None, Behavior::Tracks(1));
        let b = Fake::new("b", None, Behavior::Tracks(1));
        let pipeline = pipeline(vec![a.clone(), b], false).await;

        let result = pipeline
            .search("x", &SearchOptions::default().block("a"))
            .await;
        assert_eq!(result.extractor(), Some("b"));
        assert_eq!(a.calls(), 0);
    }

    #[tokio::test]
    async fn forced_extractor_skips_validation_and_cache() {
        let a = Fake::new("a", None, Behavior::Tracks(1));
        let b = Fake::new("b", Some(QueryType::Vimeo), Behavior::Tracks(1));
        let pipeline = pipeline(vec![a.clone(), b.clone()], true).await;

        let result = pipeline
            .search("x", &SearchOptions::default().search_engine(QueryType::ext("b")))
            .await;
        assert_eq!(result.extractor(), Some("b"));
        assert_eq!(a.calls(), 0);

        let missing = pipeline
            .search("x", &SearchOptions::default().search_engine(QueryType::ext("zzz")))
            .await;
        assert!(missing.is_empty());
        assert_eq!(missing.extractor(), None);
    }

    #[tokio::test]
    async fn resolved_values_are_wrapped_without_lookup() {
        let a = Fake::new("a", None, Behavior::Tracks(1));
        let pipeline = pipeline(vec![a.clone()], true).await;

        let track = Track::new("Ready", "https://example.com/r.mp3").with_extractor("a");
        let result = pipeline.search(track.clone(), &SearchOptions::default()).await;
        assert_eq!(result.query_type(), &QueryType::Auto);
        assert_eq!(result.tracks(), &[track]);

        let playlist = Playlist::new("Mix", "https://example.com/mix", PlaylistKind::Album)
            .with_tracks([Track::new("1", "u1"), Track::new("2", "u2")]);
        let result = pipeline.search(playlist, &SearchOptions::default()).await;
        assert_eq!(result.tracks().len(), 2);
        assert!(result.has_playlist());
        assert_eq!(a.calls(), 0);
    }

    #[tokio::test]
    async fn results_are_written_to_the_cache() {
        let mut cache = MockQueryCache::new();
        cache.expect_resolve().times(1).returning(|_| None);
        cache
            .expect_add_data()
            .withf(|data: &SearchResult| data.tracks().len() == 1)
            .times(1)
            .returning(|_| ());

        let pipeline = ExtractorPipeline::new(Some(Arc::new(cache)));
        pipeline
            .registry()
            .register(Fake::new("a", None, Behavior::Tracks(1)))
            .await
            .unwrap();

        let result = pipeline.search("song", &SearchOptions::default()).await;
        assert!(result.has_tracks());
    }

    #[tokio::test]
    async fn forced_results_are_not_cached() {
        let mut cache = MockQueryCache::new();
        cache.expect_resolve().times(0);
        cache.expect_add_data().times(0);

        let pipeline = ExtractorPipeline::new(Some(Arc::new(cache)));
        pipeline
            .registry()
            .register(Fake::new("b", None, Behavior::Tracks(1)))
            .await
            .unwrap();

        let options = SearchOptions::default().search_engine(QueryType::ext("b"));
        let result = pipeline.search("song", &options).await;
        assert_eq!(result.extractor(), Some("b"));
    }

    #[tokio::test]
    async fn stream_requires_a_registered_extractor() {
        let pipeline = pipeline(vec![], false).await;
        let orphan = Track::new("x", "u").with_extractor("gone");
        assert!(matches!(
            pipeline.stream(&orphan).await,
            Err(crate::error::PlayerError::Extractor(ExtractorError::NotInitialized(_)))
        ));
        assert!(matches!(
            pipeline.stream(&Track::new("x", "u")).await,
            Err(crate::error::PlayerError::Extractor(ExtractorError::MissingExtractor))
        ));
    }
}
