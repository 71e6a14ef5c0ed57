use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Text-to-speech
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which synthesis backend voices the assistant replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TtsBackend {
    /// Edge cloud voices over WebSocket (raw 24 kHz PCM).
    #[default]
    Edge,
    /// Local piper voices (offline, raw PCM via child process).
    Piper,
    /// 440 Hz test tone (transport bring-up).
    Sine,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default)]
    pub backend: TtsBackend,

    /// Resample piper output to this rate before transmission. `None` keeps
    /// the voice's native rate.
    #[serde(default)]
    pub target_sample_rate: Option<u32>,
    /// Run piper inference on the GPU.
    #[serde(default)]
    pub use_cuda: bool,

    /// Chinese piper voice. The voice config path may be omitted; piper
    /// voices conventionally ship a `<model>.onnx.json` next to the model.
    #[serde(default = "d_piper_model_zh")]
    pub piper_model_path_zh: String,
    #[serde(default)]
    pub piper_config_path_zh: Option<String>,

    /// English piper voice. When unset the Chinese voice is reused so the
    /// pipeline never lacks a synthesizer for a decided language.
    #[serde(default)]
    pub piper_model_path_en: Option<String>,
    #[serde(default)]
    pub piper_config_path_en: Option<String>,

    #[serde(default = "d_edge_voice_zh")]
    pub edge_voice_zh: String,
    #[serde(default = "d_edge_voice_en")]
    pub edge_voice_en: String,

    /// Pick the voice per reply by sampling a prefix of the generated text.
    /// When disabled every reply uses the Chinese voice.
    #[serde(default = "d_true")]
    pub auto_language: bool,
    /// Prefix length (characters) sampled before forcing a language decision.
    #[serde(default = "d_lang_decide_chars")]
    pub lang_decide_chars: usize,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            backend: TtsBackend::default(),
            target_sample_rate: None,
            use_cuda: false,
            piper_model_path_zh: d_piper_model_zh(),
            piper_config_path_zh: None,
            piper_model_path_en: None,
            piper_config_path_en: None,
            edge_voice_zh: d_edge_voice_zh(),
            edge_voice_en: d_edge_voice_en(),
            auto_language: true,
            lang_decide_chars: d_lang_decide_chars(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_piper_model_zh() -> String {
    "models/voices/zh_CN-huayan-x_low.onnx".into()
}
fn d_edge_voice_zh() -> String {
    "zh-CN-XiaoxiaoNeural".into()
}
fn d_edge_voice_en() -> String {
    "en-US-AriaNeural".into()
}
fn d_true() -> bool {
    true
}
fn d_lang_decide_chars() -> usize {
    120
}
