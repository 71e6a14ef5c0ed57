//! 440 Hz test tone. Stands in for a real voice during transport bring-up
//! and in the pipeline tests: deterministic PCM sized to the text length.

use vg_domain::error::Result;
use vg_domain::stream::BoxStream;

use crate::traits::SpeechSynthesizer;

const CHUNK_BYTES: usize = 4096;

pub struct SineSynthesizer {
    sample_rate: u32,
    frequency: f32,
    /// Fraction of full scale; kept well below 1.0 to spare ears.
    volume: f32,
}

impl Default for SineSynthesizer {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            frequency: 440.0,
            volume: 0.3,
        }
    }
}

impl SineSynthesizer {
    /// Tone duration for a segment: roughly reading pace, clamped so even a
    /// one-character segment is audible.
    fn duration_secs(text: &str) -> f32 {
        (text.chars().count() as f32 * 0.06).clamp(0.3, 3.0)
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for SineSynthesizer {
    fn mime(&self) -> &'static str {
        "audio/L16"
    }

    fn format(&self) -> &'static str {
        "pcm_s16le"
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        1
    }

    async fn synthesize(&self, text: &str) -> Result<BoxStream<'static, Result<Vec<u8>>>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Box::pin(futures_util::stream::empty()));
        }

        let nframes = (Self::duration_secs(text) * self.sample_rate as f32) as usize;
        let amplitude = self.volume * f32::from(i16::MAX);
        let step = 2.0 * std::f32::consts::PI * self.frequency / self.sample_rate as f32;

        let mut pcm = Vec::with_capacity(nframes * 2);
        for i in 0..nframes {
            let sample = (amplitude * (step * i as f32).sin()) as i16;
            pcm.extend_from_slice(&sample.to_le_bytes());
        }

        let stream = async_stream::stream! {
            for chunk in pcm.chunks(CHUNK_BYTES) {
                yield Ok(chunk.to_vec());
            }
        };

        Ok(Box::pin(stream))
    }

    fn backend_id(&self) -> &'static str {
        "sine"
    }
}
