//! Turn orchestrator: runs the generator and TTS workers for one turn.
//!
//! Entry point: [`spawn_turn`] starts the pipeline as a task and returns
//! its handle. The two workers run concurrently in that task: the generator
//! worker streams deltas to the client and cuts segments, the TTS worker
//! voices segments and streams audio frames. They share only the segment
//! queue, the language latch, and the metrics cell.
//!
//! Both workers poll the cancellation signal at every suspension point and
//! check the session turn id before every emission, so a superseded turn
//! stops producing frames on its own; the connection handler's abort after
//! the grace window is the backstop.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::Instrument;

use vg_domain::error::Result;
use vg_protocol::{AudioFrameHeader, ServerMessage, TurnId, TurnState};
use vg_providers::TextGenerator;
use vg_synth::{SpeechSynthesizer, VoicePair};

use super::cancel::CancelToken;
use super::language::{Lang, LanguageRouter};
use super::metrics::{MetricsLedger, MetricsRecorder, TurnMetrics, TurnOutcome};
use super::segment::Segmenter;
use super::writer::FrameWriter;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TurnContext
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything one turn needs, assembled by the connection handler.
pub struct TurnContext {
    pub turn_id: TurnId,
    pub user_text: String,
    pub session_id: String,
    /// The session's current turn id; when it moves past `turn_id` this
    /// turn is superseded and must stop emitting.
    pub session_turn_id: Arc<AtomicU32>,
    pub cancel: CancelToken,
    /// Set by the handler when it takes over writing the metrics record
    /// (strong cancel); the pipeline then leaves the ledger entry alone.
    pub handler_finalizes: Arc<AtomicBool>,
    pub metrics: Arc<Mutex<TurnMetrics>>,
    pub ledger: MetricsLedger,
    pub recorder: Arc<MetricsRecorder>,
    pub writer: FrameWriter,
    pub generator: Arc<dyn TextGenerator>,
    pub voices: VoicePair,
    pub auto_language: bool,
    pub lang_decide_chars: usize,
}

/// Run one turn as a task.
pub fn spawn_turn(ctx: TurnContext) -> tokio::task::JoinHandle<()> {
    let span = tracing::info_span!(
        "turn",
        session_id = %ctx.session_id,
        turn_id = ctx.turn_id,
    );
    tokio::spawn(run_turn(ctx).instrument(span))
}

fn superseded(session_turn_id: &AtomicU32, turn_id: TurnId) -> bool {
    session_turn_id.load(Ordering::Acquire) != turn_id
}

fn turn_cancelled(cancel: &CancelToken, session_turn_id: &AtomicU32, turn_id: TurnId) -> bool {
    cancel.is_cancelled() || superseded(session_turn_id, turn_id)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// run_turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_turn(ctx: TurnContext) {
    let TurnContext {
        turn_id,
        user_text,
        session_id: _,
        session_turn_id,
        cancel,
        handler_finalizes,
        metrics,
        ledger,
        recorder,
        writer,
        generator,
        voices,
        auto_language,
        lang_decide_chars,
    } = ctx;

    tracing::debug!("turn started");

    if writer
        .send_control(&ServerMessage::StateUpdate {
            turn_id,
            state: TurnState::Thinking,
        })
        .await
        .is_err()
    {
        cancel.cancel();
    }

    let (seg_tx, seg_rx) = mpsc::unbounded_channel::<String>();
    let (lang_tx, lang_rx) = watch::channel::<Option<Lang>>(None);
    let router = LanguageRouter::new(auto_language, lang_decide_chars);

    let gen_fut = generator_worker(
        &writer,
        generator.as_ref(),
        &user_text,
        turn_id,
        &cancel,
        &session_turn_id,
        &metrics,
        seg_tx,
        lang_tx,
        router,
    );
    let tts_fut = tts_worker(
        &writer,
        seg_rx,
        lang_rx,
        &voices,
        turn_id,
        &cancel,
        &session_turn_id,
        &metrics,
    );

    let (gen_result, tts_result) = tokio::join!(gen_fut, tts_fut);

    let audio_started = matches!(&tts_result, Ok(true));
    let failure = match (gen_result, tts_result) {
        (Err(e), _) | (_, Err(e)) => Some(e),
        _ => None,
    };

    match failure {
        None => {
            if !turn_cancelled(&cancel, &session_turn_id, turn_id) {
                if audio_started {
                    if writer
                        .send_control(&ServerMessage::AudioEnd { turn_id })
                        .await
                        .is_err()
                    {
                        cancel.cancel();
                    }
                }
                writer
                    .safe_send_control(&ServerMessage::StateUpdate {
                        turn_id,
                        state: TurnState::Idle,
                    })
                    .await;
            }
        }
        Some(e) => {
            tracing::warn!(error = %e, "turn pipeline failed");
            {
                let mut m = metrics.lock();
                m.outcome = TurnOutcome::Error;
                m.err_type = Some(e.kind().to_string());
                m.err = Some(e.to_string());
            }
            // Errors are local to the turn; the client is told and the
            // session keeps going. No audio_end after an error.
            if !superseded(&session_turn_id, turn_id) {
                writer
                    .safe_send_control(&ServerMessage::Error {
                        turn_id,
                        msg: format!("workflow failed: {e}"),
                    })
                    .await;
                writer
                    .safe_send_control(&ServerMessage::StateUpdate {
                        turn_id,
                        state: TurnState::Idle,
                    })
                    .await;
            }
        }
    }

    // Write the metrics record unless the handler has taken that over for
    // its interrupt bookkeeping. Claiming the ledger entry is what keeps
    // this at exactly one record per turn.
    if !handler_finalizes.load(Ordering::Acquire) {
        if let Some(m) = ledger.claim(turn_id) {
            let mut m = m.lock();
            if m.outcome == TurnOutcome::Ok
                && turn_cancelled(&cancel, &session_turn_id, turn_id)
            {
                m.outcome = TurnOutcome::Cancelled;
            }
            if m.t_done.is_none() {
                m.t_done = Some(Instant::now());
            }
            recorder.record(m.to_record());
        }
    }

    tracing::debug!("turn finished");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Generator worker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Consume the generator's delta stream: forward each delta to the client,
/// cut segments, and publish the language decision. Segments are held back
/// until the language is decided so the whole turn speaks with one voice.
#[allow(clippy::too_many_arguments)]
async fn generator_worker(
    writer: &FrameWriter,
    generator: &dyn TextGenerator,
    user_text: &str,
    turn_id: TurnId,
    cancel: &CancelToken,
    session_turn_id: &AtomicU32,
    metrics: &Mutex<TurnMetrics>,
    seg_tx: mpsc::UnboundedSender<String>,
    lang_tx: watch::Sender<Option<Lang>>,
    mut router: LanguageRouter,
) -> Result<()> {
    let mut segmenter = Segmenter::new();
    let mut full_text = String::new();
    let mut held: Vec<String> = Vec::new();

    // Auto-selection disabled: the router is pre-decided, publish now.
    if let Some(lang) = router.decided() {
        let _ = lang_tx.send(Some(lang));
    }

    let mut stream = match generator.generate_stream(user_text).await {
        Ok(stream) => stream,
        Err(e) => {
            cancel.cancel();
            return Err(e);
        }
    };

    while let Some(item) = stream.next().await {
        if turn_cancelled(cancel, session_turn_id, turn_id) {
            return Ok(());
        }
        let delta = match item {
            Ok(delta) => delta,
            Err(e) => {
                cancel.cancel();
                return Err(e);
            }
        };
        if delta.is_empty() {
            continue;
        }

        full_text.push_str(&delta);
        {
            let mut m = metrics.lock();
            if m.t_first_delta.is_none() {
                m.t_first_delta = Some(Instant::now());
            }
        }

        if writer
            .send_control(&ServerMessage::AssistantDelta {
                turn_id,
                delta: delta.clone(),
            })
            .await
            .is_err()
        {
            cancel.cancel();
            return Ok(());
        }

        let decision = router.observe(&delta);
        let segments = segmenter.feed(&delta);
        if let Some(lang) = decision {
            let _ = lang_tx.send(Some(lang));
        }
        if router.decided().is_some() {
            for segment in held.drain(..).chain(segments) {
                let _ = seg_tx.send(segment);
            }
        } else {
            held.extend(segments);
        }
    }

    if turn_cancelled(cancel, session_turn_id, turn_id) {
        return Ok(());
    }

    // Stream over: force a decision, flush held segments and the tail
    // (however short), then the final text. Dropping `seg_tx` on return
    // closes the queue.
    let lang = router.force();
    let _ = lang_tx.send(Some(lang));
    for segment in held.drain(..) {
        let _ = seg_tx.send(segment);
    }
    if let Some(tail) = segmenter.finish() {
        let _ = seg_tx.send(tail);
    }

    if writer
        .send_control(&ServerMessage::AssistantFinal {
            turn_id,
            text: full_text,
        })
        .await
        .is_err()
    {
        cancel.cancel();
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TTS worker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Voice queued segments. Waits for the language decision, then probes each
/// segment's synthesis stream before announcing audio: `audio_begin` (and
/// the `speaking` state) go out only once a first non-empty PCM chunk is in
/// hand, so silent segments produce no frames at all.
///
/// Returns whether any audio was announced.
#[allow(clippy::too_many_arguments)]
async fn tts_worker(
    writer: &FrameWriter,
    mut seg_rx: mpsc::UnboundedReceiver<String>,
    mut lang_rx: watch::Receiver<Option<Lang>>,
    voices: &VoicePair,
    turn_id: TurnId,
    cancel: &CancelToken,
    session_turn_id: &AtomicU32,
    metrics: &Mutex<TurnMetrics>,
) -> Result<bool> {
    let mut audio_started = false;

    let lang = match lang_rx.wait_for(|l| l.is_some()).await {
        Ok(decided) => match *decided {
            Some(lang) => lang,
            None => return Ok(audio_started),
        },
        // Latch dropped without a decision: the generator bailed out first.
        Err(_) => return Ok(audio_started),
    };
    let synth: &Arc<dyn SpeechSynthesizer> = match lang {
        Lang::Zh => &voices.zh,
        Lang::En => &voices.en,
    };

    let mut seq: u32 = 0;

    while let Some(segment) = seg_rx.recv().await {
        if turn_cancelled(cancel, session_turn_id, turn_id) {
            return Ok(audio_started);
        }
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        let mut chunks = match synth.synthesize(segment).await {
            Ok(chunks) => chunks,
            Err(e) => {
                cancel.cancel();
                return Err(e);
            }
        };

        // Probe for the first non-empty chunk.
        let first = loop {
            match chunks.next().await {
                None => break None,
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => break Some(chunk),
                Some(Err(e)) => {
                    cancel.cancel();
                    return Err(e);
                }
            }
        };
        let Some(first) = first else {
            // This segment synthesized to nothing; skip it entirely.
            continue;
        };

        if turn_cancelled(cancel, session_turn_id, turn_id) {
            return Ok(audio_started);
        }

        if !audio_started {
            let announce = [
                ServerMessage::StateUpdate {
                    turn_id,
                    state: TurnState::Speaking,
                },
                ServerMessage::AudioBegin {
                    turn_id,
                    mime: synth.mime().into(),
                    format: synth.format().into(),
                    sample_rate: synth.sample_rate(),
                    channels: synth.channels(),
                },
            ];
            for msg in &announce {
                if writer.send_control(msg).await.is_err() {
                    cancel.cancel();
                    return Ok(audio_started);
                }
            }
            audio_started = true;
        }

        if !send_audio_chunk(writer, turn_id, &mut seq, first, metrics, cancel).await {
            return Ok(audio_started);
        }
        while let Some(item) = chunks.next().await {
            if turn_cancelled(cancel, session_turn_id, turn_id) {
                return Ok(audio_started);
            }
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(e) => {
                    cancel.cancel();
                    return Err(e);
                }
            };
            if chunk.is_empty() {
                continue;
            }
            if !send_audio_chunk(writer, turn_id, &mut seq, chunk, metrics, cancel).await {
                return Ok(audio_started);
            }
        }
    }

    Ok(audio_started)
}

/// Frame and send one PCM chunk. A transport failure trips the cancellation
/// signal and reports `false` so the worker exits promptly.
async fn send_audio_chunk(
    writer: &FrameWriter,
    turn_id: TurnId,
    seq: &mut u32,
    chunk: Vec<u8>,
    metrics: &Mutex<TurnMetrics>,
    cancel: &CancelToken,
) -> bool {
    let header = AudioFrameHeader {
        turn_id,
        seq: *seq,
    };
    let tag = format!("turn={turn_id} seq={seq}");
    if !writer.send_binary(header.encode(&chunk), &tag).await {
        cancel.cancel();
        return false;
    }
    {
        let mut m = metrics.lock();
        if m.t_first_audio.is_none() {
            m.t_first_audio = Some(Instant::now());
        }
    }
    *seq += 1;
    true
}
