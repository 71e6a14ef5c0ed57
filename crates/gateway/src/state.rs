use std::sync::Arc;

use vg_domain::config::Config;
use vg_providers::TextGenerator;
use vg_synth::VoicePair;

use crate::runtime::metrics::MetricsRecorder;

/// Shared application state passed to all handlers.
///
/// Everything here is built once at startup and read-only afterwards;
/// per-connection state lives in [`crate::api::ws::Session`].
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Process-wide instance id echoed in every `hello` frame, so clients
    /// can detect a server restart across reconnects.
    pub instance_id: String,
    pub generator: Arc<dyn TextGenerator>,
    /// Per-language synthesizer instances (the language router picks one
    /// per turn).
    pub voices: VoicePair,
    pub recorder: Arc<MetricsRecorder>,
}
