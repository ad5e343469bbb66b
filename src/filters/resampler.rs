use rubato::{FftFixedIn, Resampler};
use tracing::warn;

use super::{CHANNELS, SAMPLE_RATE};
use crate::error::{PlayerError, Result};

const CHUNK_FRAMES: usize = 1024;

/// Conversión de frecuencia de muestreo con rubato
pub(crate) struct ResamplerStage {
    target: u32,
    inner: FftFixedIn<f32>,
    pending: Vec<Vec<f32>>,
}

impl ResamplerStage {
    pub(crate) fn new(target: u32) -> Result<Self> {
        let inner = FftFixedIn::<f32>::new(
            SAMPLE_RATE as usize,
            target as usize,
            CHUNK_FRAMES,
            2,
            CHANNELS,
        )
        .map_err(|e| PlayerError::InvalidValue(format!("Resampler: {}", e)))?;

        Ok(Self {
            target,
            inner,
            pending: vec![Vec::with_capacity(CHUNK_FRAMES * 2); CHANNELS],
        })
    }

    pub(crate) fn target(&self) -> u32 {
        self.target
    }

    /// Acumula audio intercalado y devuelve lo que ya se pudo convertir
    pub(crate) fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        for frame in samples.chunks_exact(CHANNELS) {
            for (channel, sample) in self.pending.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }

        let mut output = Vec::new();
        loop {
            let needed = self.inner.input_frames_next();
            if self.pending[0].len() < needed {
                break;
            }
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|channel| channel.drain(..needed).collect())
                .collect();

            match self.inner.process(&chunk, None) {
                Ok(converted) => {
                    let frames = converted[0].len();
                    output.reserve(frames * CHANNELS);
                    for i in 0..frames {
                        for channel in &converted {
                            output.push(channel[i]);
                        }
                    }
                }
                Err(e) => {
                    warn!("⚠️ Error de resampling: {}", e);
                    break;
                }
            }
        }
        output
    }
}

impl std::fmt::Debug for ResamplerStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResamplerStage")
            .field("target", &self.target)
            .field("pending_frames", &self.pending[0].len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halves_frame_count_when_downsampling() {
        let mut stage = ResamplerStage::new(24_000).unwrap();
        let input = vec![0.0f32; 48_000 * CHANNELS];
        let mut produced = stage.process(&input).len() / CHANNELS;
        produced += stage.process(&vec![0.0f32; 4096 * CHANNELS]).len() / CHANNELS;

        // everything but the last partial chunk has been converted
        assert!(produced >= 23_000 && produced <= 26_100, "produced {produced}");
    }

    #[test]
    fn buffers_partial_chunks() {
        let mut stage = ResamplerStage::new(44_100).unwrap();
        assert!(stage.process(&[0.1, 0.1]).is_empty());
        assert_eq!(stage.target(), 44_100);
    }
}
