//! VoiceGate gateway: the WebSocket voice channel server.
//!
//! One connection = one session; one utterance = one turn. The runtime
//! module holds the per-turn pipeline (generator worker + TTS worker), the
//! api module the HTTP/WebSocket surface.

pub mod api;
pub mod cli;
pub mod runtime;
pub mod state;
