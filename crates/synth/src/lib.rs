//! Speech-synthesis adapters.
//!
//! The turn orchestrator only sees the [`SpeechSynthesizer`] trait: playback
//! metadata plus a lazy stream of PCM chunks per `synthesize(text)` call.
//! Each turn pulls fresh streams; nothing is shared across turns.

mod edge;
mod piper;
mod resample;
mod sine;
mod traits;

pub use edge::EdgeSynthesizer;
pub use piper::PiperSynthesizer;
pub use resample::LinearResampler;
pub use sine::SineSynthesizer;
pub use traits::SpeechSynthesizer;

use std::sync::Arc;

use vg_domain::config::{TtsBackend, TtsConfig};
use vg_domain::error::Result;

/// The per-language synthesizer instances held by a session.
///
/// These are distinct instances of the same backend, not a sum type; the
/// language router picks one per turn. When no English voice is configured
/// the Chinese instance is reused so a decided language always has a voice.
#[derive(Clone)]
pub struct VoicePair {
    pub zh: Arc<dyn SpeechSynthesizer>,
    pub en: Arc<dyn SpeechSynthesizer>,
}

/// Build the configured synthesis backend for both languages.
pub fn from_config(cfg: &TtsConfig) -> Result<VoicePair> {
    match cfg.backend {
        TtsBackend::Edge => {
            let zh: Arc<dyn SpeechSynthesizer> =
                Arc::new(EdgeSynthesizer::new(&cfg.edge_voice_zh));
            let en: Arc<dyn SpeechSynthesizer> =
                Arc::new(EdgeSynthesizer::new(&cfg.edge_voice_en));
            Ok(VoicePair { zh, en })
        }
        TtsBackend::Piper => {
            let zh: Arc<dyn SpeechSynthesizer> = Arc::new(PiperSynthesizer::new(
                &cfg.piper_model_path_zh,
                cfg.piper_config_path_zh.as_deref(),
                cfg.use_cuda,
                cfg.target_sample_rate,
            )?);
            let en: Arc<dyn SpeechSynthesizer> = match cfg.piper_model_path_en.as_deref() {
                Some(model) => Arc::new(PiperSynthesizer::new(
                    model,
                    cfg.piper_config_path_en.as_deref(),
                    cfg.use_cuda,
                    cfg.target_sample_rate,
                )?),
                None => zh.clone(),
            };
            Ok(VoicePair { zh, en })
        }
        TtsBackend::Sine => {
            let tone: Arc<dyn SpeechSynthesizer> = Arc::new(SineSynthesizer::default());
            Ok(VoicePair {
                zh: tone.clone(),
                en: tone,
            })
        }
    }
}
