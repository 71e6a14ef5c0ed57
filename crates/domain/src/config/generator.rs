use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Text generator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which text-generation backend produces assistant replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorBackend {
    /// Local model server speaking the llama.cpp `/completion` protocol.
    #[default]
    Local,
    /// Canned echo replies (development only).
    Echo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub backend: GeneratorBackend,
    /// Completion endpoint of the local model server.
    #[serde(default = "d_api_url")]
    pub api_url: String,
    /// Token budget per reply.
    #[serde(default = "d_n_predict")]
    pub n_predict: u32,
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    /// Stop sequences forwarded to the backend.
    #[serde(default = "d_stop")]
    pub stop: Vec<String>,
    /// Whole-request timeout in seconds.
    #[serde(default = "d_timeout_sec")]
    pub timeout_sec: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            backend: GeneratorBackend::default(),
            api_url: d_api_url(),
            n_predict: d_n_predict(),
            temperature: d_temperature(),
            stop: d_stop(),
            timeout_sec: d_timeout_sec(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_api_url() -> String {
    "http://localhost:8080/completion".into()
}
fn d_n_predict() -> u32 {
    256
}
fn d_temperature() -> f32 {
    0.7
}
fn d_stop() -> Vec<String> {
    vec!["User:".into(), "\n\n".into()]
}
fn d_timeout_sec() -> u64 {
    60
}
