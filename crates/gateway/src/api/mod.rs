pub mod health;
pub mod ws;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;

/// Build the HTTP surface: the health probe and the voice channel upgrade.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(health::health))
        .route("/ws", get(ws::voice_ws))
}
