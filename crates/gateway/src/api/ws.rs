//! WebSocket endpoint for voice clients.
//!
//! Flow:
//! 1. Client connects to `/ws`; the gateway sends `hello` with the session
//!    id and turn id 0.
//! 2. Read loop dispatches `user_text` / `interrupt`; each `user_text`
//!    supersedes the in-flight turn and spawns a new one.
//! 3. On disconnect the active turn is cancelled without sending frames.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;

use vg_domain::error::Result;
use vg_protocol::{ClientMessage, ServerMessage, TurnId, TurnState};

use crate::runtime::cancel::CancelToken;
use crate::runtime::metrics::{MetricsLedger, MetricsRecorder, TurnMetrics, TurnOutcome};
use crate::runtime::turn::{spawn_turn, TurnContext};
use crate::runtime::writer::FrameWriter;
use crate::state::AppState;

/// How long a cancelled turn gets to wind down before its task is aborted.
pub const CANCEL_GRACE: Duration = Duration::from_millis(200);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-connection state, owned by the read loop.
pub struct Session {
    pub session_id: String,
    /// Strictly increasing, never reused; shared with turn tasks for their
    /// supersession checks. Only the connection handler writes it.
    pub turn_id: Arc<AtomicU32>,
    /// At most one turn in flight per session.
    pub active: Option<ActiveTurn>,
    pub ledger: MetricsLedger,
}

/// Handle to the in-flight turn.
pub struct ActiveTurn {
    pub turn_id: TurnId,
    pub cancel: CancelToken,
    pub handle: JoinHandle<()>,
    /// Set when the handler takes over writing the metrics record.
    pub handler_finalizes: Arc<AtomicBool>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().simple().to_string(),
            turn_id: Arc::new(AtomicU32::new(0)),
            active: None,
            ledger: MetricsLedger::new(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// GET /ws: upgrade to the voice channel.
pub async fn voice_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (ws_sink, mut ws_stream) = socket.split();
    let writer = FrameWriter::new(ws_sink);
    let mut session = Session::new();

    let hello = ServerMessage::Hello {
        msg: "connected".into(),
        session_id: session.session_id.clone(),
        server_instance_id: state.instance_id.clone(),
        turn_id_reset: 0,
    };
    if writer.send_control(&hello).await.is_err() {
        tracing::warn!("client disconnected before hello");
        return;
    }
    tracing::info!(session_id = %session.session_id, "client connected");

    while let Some(Ok(message)) = ws_stream.next().await {
        match message {
            Message::Text(text) => {
                if handle_message(&state, &mut session, &writer, &text)
                    .await
                    .is_err()
                {
                    // The channel is gone; further sends are pointless.
                    break;
                }
            }
            Message::Close(_) => break,
            // axum answers WS-level pings itself; clients send no binary.
            _ => {}
        }
    }

    shutdown_session(&state, &mut session).await;
    tracing::info!(session_id = %session.session_id, "client disconnected");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parse and dispatch one inbound text frame. `Err` means the transport
/// failed and the connection should be torn down; protocol problems are
/// answered with an `error` frame and `Ok`.
pub async fn handle_message(
    state: &AppState,
    session: &mut Session,
    writer: &FrameWriter,
    text: &str,
) -> Result<()> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::UserText { text }) => {
            handle_user_text(state, session, writer, text).await
        }
        Ok(ClientMessage::Interrupt) => handle_interrupt(state, session, writer).await,
        Err(parse_err) => {
            let current = session.turn_id.load(Ordering::Acquire);
            let msg = describe_parse_error(text, &parse_err);
            writer
                .send_control(&ServerMessage::Error {
                    turn_id: current,
                    msg,
                })
                .await
        }
    }
}

fn describe_parse_error(raw: &str, parse_err: &serde_json::Error) -> String {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => match value.get("type").and_then(Value::as_str) {
            Some(t @ ("user_text" | "interrupt")) => {
                format!("invalid {t} payload: {parse_err}")
            }
            Some(t) => format!("unknown type: {t}"),
            None => "missing message type".into(),
        },
        Err(_) => format!("invalid json: {parse_err}"),
    }
}

async fn handle_user_text(
    state: &AppState,
    session: &mut Session,
    writer: &FrameWriter,
    text: String,
) -> Result<()> {
    let recv_ts = Instant::now();

    let old_turn = session.turn_id.load(Ordering::Acquire);
    let turn_id = old_turn + 1;
    session.turn_id.store(turn_id, Ordering::Release);

    // A new utterance supersedes the in-flight reply. A turn that already
    // ran to completion needs no cancel ceremony.
    if let Some(active) = session.active.take() {
        if !active.handle.is_finished() {
            strong_cancel(
                active,
                &session.ledger,
                &state.recorder,
                Some(writer),
                "new_turn",
            )
            .await;
        }
    }

    let metrics = Arc::new(Mutex::new(TurnMetrics::new(
        &session.session_id,
        turn_id,
        recv_ts,
    )));
    session.ledger.insert(turn_id, metrics.clone());

    let cancel = CancelToken::new();
    let handler_finalizes = Arc::new(AtomicBool::new(false));
    let handle = spawn_turn(TurnContext {
        turn_id,
        user_text: text,
        session_id: session.session_id.clone(),
        session_turn_id: session.turn_id.clone(),
        cancel: cancel.clone(),
        handler_finalizes: handler_finalizes.clone(),
        metrics,
        ledger: session.ledger.clone(),
        recorder: state.recorder.clone(),
        writer: writer.clone(),
        generator: state.generator.clone(),
        voices: state.voices.clone(),
        auto_language: state.config.tts.auto_language,
        lang_decide_chars: state.config.tts.lang_decide_chars,
    });
    session.active = Some(ActiveTurn {
        turn_id,
        cancel,
        handle,
        handler_finalizes,
    });
    Ok(())
}

async fn handle_interrupt(
    state: &AppState,
    session: &mut Session,
    writer: &FrameWriter,
) -> Result<()> {
    let old_turn = session.turn_id.load(Ordering::Acquire);
    let new_turn = old_turn + 1;
    // Advancing the id voids the prior turn even if it misses the signal.
    session.turn_id.store(new_turn, Ordering::Release);

    match session.active.take() {
        Some(active) if !active.handle.is_finished() => {
            strong_cancel(
                active,
                &session.ledger,
                &state.recorder,
                Some(writer),
                "interrupt",
            )
            .await;
        }
        _ => {
            // Nothing in flight; still tell the client to flush playback.
            writer
                .safe_send_control(&ServerMessage::AudioCancel { turn_id: old_turn })
                .await;
        }
    }

    writer
        .send_control(&ServerMessage::StateUpdate {
            turn_id: new_turn,
            state: TurnState::Idle,
        })
        .await
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Strong cancel
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Pre-empt the in-flight turn: signal it, give it [`CANCEL_GRACE`] to wind
/// down, abort it if it misses the window, then write its metrics record
/// (outcome `cancelled` with interrupt latency) and optionally tell the
/// client to flush its playback buffer.
pub async fn strong_cancel(
    active: ActiveTurn,
    ledger: &MetricsLedger,
    recorder: &MetricsRecorder,
    writer: Option<&FrameWriter>,
    reason: &str,
) {
    let ActiveTurn {
        turn_id,
        cancel,
        mut handle,
        handler_finalizes,
    } = active;

    // Claim the record before signalling so the pipeline's own finalize
    // stands down.
    handler_finalizes.store(true, Ordering::Release);
    cancel.cancel();

    if let Some(m) = ledger.get(turn_id) {
        let mut m = m.lock();
        if m.t_interrupt_recv.is_none() {
            m.t_interrupt_recv = Some(Instant::now());
        }
    }

    if tokio::time::timeout(CANCEL_GRACE, &mut handle).await.is_err() {
        handle.abort();
        tracing::warn!(
            turn_id,
            reason,
            "turn missed the cancellation grace window; aborted"
        );
    }

    if let Some(m) = ledger.claim(turn_id) {
        let mut m = m.lock();
        if m.t_interrupt_recv.is_some() && m.t_interrupt_done.is_none() {
            m.t_interrupt_done = Some(Instant::now());
        }
        if m.outcome == TurnOutcome::Ok {
            m.outcome = TurnOutcome::Cancelled;
        }
        if m.t_done.is_none() {
            m.t_done = Some(Instant::now());
        }
        recorder.record(m.to_record());
    }

    if let Some(writer) = writer {
        writer
            .safe_send_control(&ServerMessage::AudioCancel { turn_id })
            .await;
    }
    tracing::debug!(turn_id, reason, "turn cancelled");
}

/// Disconnect cleanup: cancel the active turn without sending frames and
/// flush any metrics entry that never reached a finalize point.
pub async fn shutdown_session(state: &AppState, session: &mut Session) {
    if let Some(active) = session.active.take() {
        strong_cancel(active, &session.ledger, &state.recorder, None, "disconnect").await;
    }
    for m in session.ledger.claim_all() {
        let mut m = m.lock();
        if m.outcome == TurnOutcome::Ok {
            m.outcome = TurnOutcome::Cancelled;
        }
        if m.t_done.is_none() {
            m.t_done = Some(Instant::now());
        }
        state.recorder.record(m.to_record());
    }
}
