use vg_domain::error::Result;
use vg_domain::stream::BoxStream;

/// Trait that every speech-synthesis adapter must implement.
///
/// `synthesize` returns a lazy, finite stream of audio byte chunks for one
/// text segment. An empty stream is a valid outcome (silent segment); the
/// caller probes the first chunk before announcing audio to the client.
/// The playback metadata accessors describe every chunk this instance will
/// ever produce and are constant for its lifetime.
#[async_trait::async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// MIME type advertised in `audio_begin` (e.g. `audio/L16`).
    fn mime(&self) -> &'static str;

    /// Sample format tag (e.g. `pcm_s16le`).
    fn format(&self) -> &'static str;

    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Channel count (mono for all current backends).
    fn channels(&self) -> u16;

    /// Synthesize one text segment into a stream of audio chunks.
    async fn synthesize(&self, text: &str) -> Result<BoxStream<'static, Result<Vec<u8>>>>;

    /// Backend identifier used in logs and error reports.
    fn backend_id(&self) -> &'static str;
}
