use anyhow::Result;
use async_trait::async_trait;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use symphonia::core::{
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::{MetadataOptions, MetadataRevision, StandardTagKey},
    probe::Hint,
};
use tracing::debug;

use super::{Extractor, ExtractorContext, ExtractorInfo, StreamSource};
use crate::{search::query::QueryType, track::Track};

/// Extractor para archivos locales
#[derive(Debug, Default)]
pub struct FileExtractor;

#[derive(Debug, Default)]
struct FileMeta {
    title: Option<String>,
    artist: Option<String>,
    duration: Option<Duration>,
}

impl FileExtractor {
    pub const IDENTIFIER: &'static str = "file";

    pub fn new() -> Self {
        Self
    }

    fn path_of(query: &str) -> PathBuf {
        PathBuf::from(query.strip_prefix("file://").unwrap_or(query))
    }

    /// Lee duración y tags con symphonia (bloqueante)
    fn probe(path: &Path) -> Result<FileMeta> {
        let file = std::fs::File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let mut probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;

        let mut meta = FileMeta::default();
        if let Some(track) = probed.format.default_track() {
            let params = &track.codec_params;
            if let (Some(frames), Some(rate)) = (params.n_frames, params.sample_rate) {
                meta.duration = Some(Duration::from_secs_f64(frames as f64 / rate as f64));
            }
        }

        if let Some(revision) = probed.format.metadata().current() {
            apply_tags(revision, &mut meta);
        }
        if let Some(metadata) = probed.metadata.get() {
            if let Some(revision) = metadata.current() {
                apply_tags(revision, &mut meta);
            }
        }

        Ok(meta)
    }
}

fn apply_tags(revision: &MetadataRevision, meta: &mut FileMeta) {
    for tag in revision.tags() {
        match tag.std_key {
            Some(StandardTagKey::TrackTitle) if meta.title.is_none() => {
                meta.title = Some(tag.value.to_string());
            }
            Some(StandardTagKey::Artist) if meta.artist.is_none() => {
                meta.artist = Some(tag.value.to_string());
            }
            _ => {}
        }
    }
}

#[async_trait]
impl Extractor for FileExtractor {
    fn identifier(&self) -> &str {
        Self::IDENTIFIER
    }

    async fn validate(&self, query: &str, query_type: &QueryType) -> bool {
        if !matches!(query_type, QueryType::File | QueryType::Ext(_)) {
            return false;
        }
        tokio::fs::metadata(Self::path_of(query))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    async fn handle(&self, query: &str, context: &ExtractorContext) -> Result<ExtractorInfo> {
        let path = Self::path_of(query);
        if !tokio::fs::metadata(&path).await?.is_file() {
            anyhow::bail!("No es un archivo: {}", path.display());
        }

        let probe_path = path.clone();
        let meta = match tokio::task::spawn_blocking(move || Self::probe(&probe_path)).await? {
            Ok(meta) => meta,
            Err(e) => {
                // unreadable tags still leave a playable file for the transport
                debug!("No se pudo analizar {}: {:?}", path.display(), e);
                FileMeta::default()
            }
        };

        let fallback_title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mut track = Track::new(meta.title.unwrap_or(fallback_title), path.display().to_string())
            .with_extractor(Self::IDENTIFIER)
            .with_raw(serde_json::json!({ "source": "file", "path": path }));
        if let Some(artist) = meta.artist {
            track = track.with_author(artist);
        }
        if let Some(duration) = meta.duration {
            track = track.with_duration(duration);
        }
        if let Some(user) = context.requested_by {
            track = track.with_requested_by(user);
        }

        Ok(ExtractorInfo::new(None, vec![track]))
    }

    async fn stream(&self, track: &Track) -> Result<StreamSource> {
        Ok(StreamSource::File(Self::path_of(track.url())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// 16-bit mono PCM WAV of `seconds` length at 8 kHz.
    fn write_wav(seconds: u32) -> tempfile::NamedTempFile {
        let rate: u32 = 8000;
        let data_len = rate * seconds * 2;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
        bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
        bytes.extend_from_slice(&rate.to_le_bytes());
        bytes.extend_from_slice(&(rate * 2).to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        bytes.resize(bytes.len() + data_len as usize, 0);

        let mut file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn resolves_local_wav() {
        let wav = write_wav(2);
        let query = wav.path().display().to_string();
        let ext = FileExtractor::new();

        assert!(ext.validate(&query, &QueryType::File).await);
        let ctx = ExtractorContext {
            query_type: QueryType::File,
            requested_by: None,
        };
        let info = ext.handle(&query, &ctx).await.unwrap();
        let track = &info.tracks[0];

        assert_eq!(track.duration(), Some(Duration::from_secs(2)));
        assert_eq!(
            ext.stream(track).await.unwrap(),
            StreamSource::File(wav.path().to_path_buf())
        );
    }

    #[tokio::test]
    async fn rejects_missing_files_and_other_types() {
        let ext = FileExtractor::new();
        assert!(!ext.validate("/definitely/not/here.mp3", &QueryType::File).await);
        let wav = write_wav(1);
        let query = wav.path().display().to_string();
        assert!(!ext.validate(&query, &QueryType::AutoSearch).await);
    }
}
