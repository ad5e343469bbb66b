use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    events::CoreEvent,
    input::{Input, RawAdapter},
    tracks::TrackHandle,
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{
    io::{self, Read, Seek, SeekFrom},
    process::{Child, Command, Stdio},
    sync::Arc,
    time::Duration,
};
use symphonia::core::io::MediaSource;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{ConnectionEvent, PreparedStream, VoiceConnection, VoiceTransport};
use crate::{
    error::TransportError,
    extractor::StreamSource,
    filters::{DspChain, CHANNELS, SAMPLE_RATE},
};

const SAMPLE_BYTES: usize = 4;
const FRAME_BYTES: usize = SAMPLE_BYTES * CHANNELS;
const READ_BUFFER: usize = 8192;

/// Transporte basado en songbird
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<Arc<dyn VoiceConnection>, TransportError> {
        info!("🔗 Conectando al canal {} en guild {}", channel_id, guild_id);

        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| TransportError::Connect(format!("{:?}", e)))?;

        {
            let mut call_lock = call.lock().await;
            call_lock.add_global_event(
                Event::Core(CoreEvent::DriverDisconnect),
                DisconnectForwarder {
                    guild_id,
                    events: events.clone(),
                },
            );
        }

        Ok(Arc::new(SongbirdConnection {
            guild_id,
            channel_id,
            call,
            manager: Arc::clone(&self.manager),
            current: Mutex::new(None),
            events,
        }))
    }
}

struct CurrentStream {
    handle: TrackHandle,
    /// FFmpeg already skipped this much, songbird counts from zero
    offset: Duration,
}

struct SongbirdConnection {
    guild_id: GuildId,
    channel_id: ChannelId,
    call: Arc<tokio::sync::Mutex<Call>>,
    manager: Arc<Songbird>,
    current: Mutex<Option<CurrentStream>>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl SongbirdConnection {
    /// FFmpeg decodifica a f32le 48 kHz y la cadena DSP procesa cada bloque
    fn build_input(&self, stream: &PreparedStream) -> Result<Input, TransportError> {
        let location = match &stream.source {
            StreamSource::Url(url) => url.clone(),
            StreamSource::File(path) => path.to_string_lossy().into_owned(),
        };

        let mut command = Command::new("ffmpeg");
        command
            .args(["-hide_banner", "-loglevel", "error"])
            .args(["-ss", &format!("{:.3}", stream.seek.as_secs_f64())])
            .args(["-i", &location]);
        if let Some(filters) = &stream.ffmpeg_args {
            debug!("🎛️ FFmpeg con filtros: {}", filters);
            command.args(["-af", filters.as_str()]);
        }
        let mut child = command
            .args(["-ac", &CHANNELS.to_string(), "-ar", &SAMPLE_RATE.to_string()])
            .args(["-acodec", "pcm_f32le", "-f", "f32le", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| TransportError::Play(format!("ffmpeg: {}", e)))?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            return Err(TransportError::Play("ffmpeg sin stdout".to_string()));
        };

        let sample_rate = stream.dsp.lock().output_sample_rate();
        let source = PcmSource::new(stdout, Arc::clone(&stream.dsp)).with_process(child);
        Ok(RawAdapter::new(source, sample_rate, CHANNELS as u32).into())
    }
}

/// PCM f32le intercalado que pasa por la cadena DSP al leerse
pub(crate) struct PcmSource<R> {
    inner: R,
    dsp: Arc<Mutex<DspChain>>,
    process: Option<Child>,
    /// bytes of a partial frame carried to the next read
    pending: Vec<u8>,
    output: Vec<u8>,
    cursor: usize,
}

impl<R: Read> PcmSource<R> {
    pub(crate) fn new(inner: R, dsp: Arc<Mutex<DspChain>>) -> Self {
        Self {
            inner,
            dsp,
            process: None,
            pending: Vec::with_capacity(READ_BUFFER),
            output: Vec::new(),
            cursor: 0,
        }
    }

    fn with_process(mut self, child: Child) -> Self {
        self.process = Some(child);
        self
    }

    /// Lee un bloque, lo procesa y lo deja en `output`; `false` al terminar
    fn fill(&mut self) -> io::Result<bool> {
        let mut buffer = [0u8; READ_BUFFER];
        let read = self.inner.read(&mut buffer)?;
        if read == 0 {
            return Ok(false);
        }
        self.pending.extend_from_slice(&buffer[..read]);

        let whole = self.pending.len() / FRAME_BYTES * FRAME_BYTES;
        let mut samples: Vec<f32> = self.pending[..whole]
            .chunks_exact(SAMPLE_BYTES)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        self.pending.drain(..whole);

        let processed = {
            let mut dsp = self.dsp.lock();
            dsp.process(&mut samples);
            dsp.resample(&samples)
        };

        self.output.clear();
        self.cursor = 0;
        self.output
            .extend(processed.iter().flat_map(|sample| sample.to_le_bytes()));
        Ok(true)
    }
}

impl<R: Read> Read for PcmSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.cursor >= self.output.len() {
            if !self.fill()? {
                return Ok(0);
            }
        }
        let count = buf.len().min(self.output.len() - self.cursor);
        buf[..count].copy_from_slice(&self.output[self.cursor..self.cursor + count]);
        self.cursor += count;
        Ok(count)
    }
}

impl<R> Seek for PcmSource<R> {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::ErrorKind::Unsupported.into())
    }
}

impl<R: Read + Send + Sync> MediaSource for PcmSource<R> {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

impl<R> Drop for PcmSource<R> {
    fn drop(&mut self) {
        if let Some(mut child) = self.process.take() {
            let _ = child.kill();
            let _ = child.try_wait();
        }
    }
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    async fn play(&self, stream: PreparedStream) -> Result<(), TransportError> {
        let input = self.build_input(&stream)?;

        let handle = {
            let mut call = self.call.lock().await;
            call.play_only_input(input)
        };


        for (event, kind) in [
            (TrackEvent::End, ForwardKind::End),
            (TrackEvent::Error, ForwardKind::Error),
        ] {
            handle
                .add_event(
                    Event::Track(event),
                    TrackForwarder {
                        stream_id: stream.stream_id,
                        kind,
                        events: self.events.clone(),
                    },
                )
                .map_err(|e| TransportError::Play(e.to_string()))?;
        }

        info!(
            "▶️ Stream {} iniciado en guild {}: {}",
            stream.stream_id,
            self.guild_id,
            stream.track.title()
        );
        *self.current.lock() = Some(CurrentStream {
            handle,
            offset: stream.seek,
        });
        Ok(())
    }

    async fn pause(&self) -> Result<(), TransportError> {
        if let Some(current) = &*self.current.lock() {
            current
                .handle
                .pause()
                .map_err(|e| TransportError::Play(e.to_string()))?;
        }
        Ok(())
    }

    async fn resume(&self) -> Result<(), TransportError> {
        if let Some(current) = &*self.current.lock() {
            current
                .handle
                .play()
                .map_err(|e| TransportError::Play(e.to_string()))?;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        if let Some(current) = self.current.lock().take() {
            let _ = current.handle.stop();
        }
        Ok(())
    }

    /// El volumen ya se aplica en la cadena DSP del stream
    async fn set_volume(&self, volume: f32) -> Result<(), TransportError> {
        debug!("🔊 Volumen {} aplicado por la cadena DSP en guild {}", volume, self.guild_id);
        Ok(())
    }

    async fn position(&self) -> Option<Duration> {
        let (handle, offset) = {
            let current = self.current.lock();
            let current = current.as_ref()?;
            (current.handle.clone(), current.offset)
        };
        handle.get_info().await.ok().map(|state| state.position + offset)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.current.lock().take();
        match self.manager.remove(self.guild_id).await {
            Ok(()) => {
                info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
                Ok(())
            }
            Err(e) => {
                warn!("⚠️ Error al desconectar en guild {}: {:?}", self.guild_id, e);
                Err(TransportError::Connect(format!("{:?}", e)))
            }
        }
    }
}

#[derive(Clone, Copy)]
enum ForwardKind {
    End,
    Error,
}

/// Reenvía el fin o error de un track a la cola
struct TrackForwarder {
    stream_id: u64,
    kind: ForwardKind,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

#[async_trait]
impl VoiceEventHandler for TrackForwarder {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let event = match self.kind {
            ForwardKind::End => ConnectionEvent::TrackEnd {
                stream_id: self.stream_id,
            },
            ForwardKind::Error => {
                let message = match ctx {
                    EventContext::Track(tracks) => tracks
                        .first()
                        .map(|(state, _)| format!("{:?}", state.playing))
                        .unwrap_or_else(|| "error desconocido".to_string()),
                    _ => "error desconocido".to_string(),
                };
                error!("❌ Error en stream {}: {}", self.stream_id, message);
                ConnectionEvent::TrackError {
                    stream_id: self.stream_id,
                    message,
                }
            }
        };
        let _ = self.events.send(event);
        None
    }
}

/// Handler para desconexiones del driver de voz
struct DisconnectForwarder {
    guild_id: GuildId,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

#[async_trait]
impl VoiceEventHandler for DisconnectForwarder {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        warn!("🔌 Driver de voz desconectado en guild {}", self.guild_id);
        let _ = self.events.send(ConnectionEvent::Disconnected);
        None
    }
}
