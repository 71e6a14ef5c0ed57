//! Text-generation adapters.
//!
//! The turn orchestrator only sees the [`TextGenerator`] trait: a lazy,
//! finite, non-restartable stream of reply deltas per user utterance.
//! Adapters translate that contract to a concrete backend.

mod echo;
mod local_http;
mod sse;
mod traits;
mod util;

pub use echo::EchoGenerator;
pub use local_http::LocalHttpGenerator;
pub use traits::TextGenerator;

use std::sync::Arc;

use vg_domain::config::{GeneratorBackend, GeneratorConfig};
use vg_domain::error::Result;

/// Build the configured generator backend.
pub fn from_config(cfg: &GeneratorConfig) -> Result<Arc<dyn TextGenerator>> {
    match cfg.backend {
        GeneratorBackend::Local => Ok(Arc::new(LocalHttpGenerator::from_config(cfg)?)),
        GeneratorBackend::Echo => Ok(Arc::new(EchoGenerator::default())),
    }
}
