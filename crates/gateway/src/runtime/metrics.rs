//! Per-turn latency metrics and the daily JSONL recorder.
//!
//! Stamps are monotonic (`Instant`); the serialized record carries
//! millisecond deltas from the turn's anchor plus one wall-clock timestamp.
//! File appends run off the connection's critical path: records go through
//! a channel to a background task that does the blocking write.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use vg_protocol::TurnId;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TurnMetrics
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnOutcome {
    Ok,
    Cancelled,
    Error,
}

/// Latency stamps for one turn. `t0` anchors at `user_text` receive time;
/// the rest are filled in as the pipeline progresses.
#[derive(Debug)]
pub struct TurnMetrics {
    pub session_id: String,
    pub turn_id: TurnId,
    pub t0: Instant,
    pub t_first_delta: Option<Instant>,
    pub t_first_audio: Option<Instant>,
    pub t_done: Option<Instant>,
    pub t_interrupt_recv: Option<Instant>,
    pub t_interrupt_done: Option<Instant>,
    pub outcome: TurnOutcome,
    pub err_type: Option<String>,
    pub err: Option<String>,
}

impl TurnMetrics {
    pub fn new(session_id: &str, turn_id: TurnId, t0: Instant) -> Self {
        Self {
            session_id: session_id.to_owned(),
            turn_id,
            t0,
            t_first_delta: None,
            t_first_audio: None,
            t_done: None,
            t_interrupt_recv: None,
            t_interrupt_done: None,
            outcome: TurnOutcome::Ok,
            err_type: None,
            err: None,
        }
    }

    /// Serialized form: millisecond deltas, null where a phase never
    /// happened.
    pub fn to_record(&self) -> MetricsRecord {
        fn ms(from: Instant, to: Option<Instant>) -> Option<u64> {
            to.map(|t| t.duration_since(from).as_millis() as u64)
        }

        MetricsRecord {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            session_id: self.session_id.clone(),
            turn_id: self.turn_id,
            t_first_delta_ms: ms(self.t0, self.t_first_delta),
            t_first_audio_ms: ms(self.t0, self.t_first_audio),
            t_total_ms: ms(self.t0, self.t_done),
            t_interrupt_ms: match (self.t_interrupt_recv, self.t_interrupt_done) {
                (Some(recv), Some(done)) => Some(done.duration_since(recv).as_millis() as u64),
                _ => None,
            },
            outcome: self.outcome,
            err_type: self.err_type.clone(),
            err: self.err.clone(),
        }
    }
}

/// One line of the daily metrics file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub ts: String,
    pub session_id: String,
    pub turn_id: TurnId,
    pub t_first_delta_ms: Option<u64>,
    pub t_first_audio_ms: Option<u64>,
    pub t_total_ms: Option<u64>,
    pub t_interrupt_ms: Option<u64>,
    pub outcome: TurnOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MetricsLedger
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The session's live metrics, keyed by turn id.
///
/// A turn's entry is written by both the pipeline (delta/audio stamps) and
/// the connection handler (interrupt stamps). `claim` removes the entry;
/// whoever claims it owns writing the final record, which keeps every turn
/// at exactly one appended line even when cancellation races completion.
#[derive(Clone, Default)]
pub struct MetricsLedger {
    inner: Arc<Mutex<HashMap<TurnId, Arc<Mutex<TurnMetrics>>>>>,
}

impl MetricsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, turn_id: TurnId, metrics: Arc<Mutex<TurnMetrics>>) {
        self.inner.lock().insert(turn_id, metrics);
    }

    pub fn get(&self, turn_id: TurnId) -> Option<Arc<Mutex<TurnMetrics>>> {
        self.inner.lock().get(&turn_id).cloned()
    }

    /// Remove and return a turn's entry.
    pub fn claim(&self, turn_id: TurnId) -> Option<Arc<Mutex<TurnMetrics>>> {
        self.inner.lock().remove(&turn_id)
    }

    /// Remove and return every remaining entry (session teardown).
    pub fn claim_all(&self) -> Vec<Arc<Mutex<TurnMetrics>>> {
        self.inner.lock().drain().map(|(_, m)| m).collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MetricsRecorder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Appends one JSON line per finished turn to `metrics_<YYYY-MM-DD>.jsonl`
/// under the configured log directory (UTC date, new file per day).
pub struct MetricsRecorder {
    tx: mpsc::UnboundedSender<MetricsRecord>,
}

impl MetricsRecorder {
    /// Spawns the writer task. Must be called inside a tokio runtime.
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        let log_dir = log_dir.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<MetricsRecord>();

        tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                let dir = log_dir.clone();
                let result =
                    tokio::task::spawn_blocking(move || append_record(&dir, &record)).await;
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::warn!(error = %e, "metrics append failed"),
                    Err(e) => tracing::warn!(error = %e, "metrics writer task failed"),
                }
            }
        });

        Self { tx }
    }

    /// Queue a record for appending. Never blocks the caller.
    pub fn record(&self, record: MetricsRecord) {
        if self.tx.send(record).is_err() {
            tracing::warn!("metrics writer task is gone; dropping record");
        }
    }
}

fn metrics_path(dir: &Path) -> PathBuf {
    dir.join(format!("metrics_{}.jsonl", Utc::now().format("%Y-%m-%d")))
}

fn append_record(dir: &Path, record: &MetricsRecord) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let line = serde_json::to_string(record)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(metrics_path(dir))?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample_metrics() -> TurnMetrics {
        let t0 = Instant::now() - Duration::from_millis(500);
        let mut m = TurnMetrics::new("sess", 3, t0);
        m.t_first_delta = Some(t0 + Duration::from_millis(120));
        m.t_first_audio = Some(t0 + Duration::from_millis(340));
        m.t_done = Some(t0 + Duration::from_millis(480));
        m
    }

    #[test]
    fn record_carries_millisecond_deltas() {
        let record = sample_metrics().to_record();
        assert_eq!(record.t_first_delta_ms, Some(120));
        assert_eq!(record.t_first_audio_ms, Some(340));
        assert_eq!(record.t_total_ms, Some(480));
        assert_eq!(record.t_interrupt_ms, None);
        assert_eq!(record.outcome, TurnOutcome::Ok);
    }

    #[test]
    fn interrupt_latency_spans_recv_to_done() {
        let mut m = sample_metrics();
        let recv = m.t0 + Duration::from_millis(200);
        m.t_interrupt_recv = Some(recv);
        m.t_interrupt_done = Some(recv + Duration::from_millis(35));
        m.outcome = TurnOutcome::Cancelled;

        let record = m.to_record();
        assert_eq!(record.t_interrupt_ms, Some(35));
        assert_eq!(record.outcome, TurnOutcome::Cancelled);
    }

    #[test]
    fn skipped_phases_serialize_as_null() {
        let m = TurnMetrics::new("sess", 1, Instant::now());
        let json = serde_json::to_value(m.to_record()).unwrap();
        assert!(json["t_first_audio_ms"].is_null());
        assert!(json["t_total_ms"].is_null());
        assert_eq!(json["outcome"], "ok");
        // Error fields only appear when set.
        assert!(json.get("err_type").is_none());
    }

    #[test]
    fn error_fields_serialize_when_set() {
        let mut m = TurnMetrics::new("sess", 1, Instant::now());
        m.outcome = TurnOutcome::Error;
        m.err_type = Some("generator".into());
        m.err = Some("connection refused".into());
        let json = serde_json::to_value(m.to_record()).unwrap();
        assert_eq!(json["outcome"], "error");
        assert_eq!(json["err_type"], "generator");
    }

    #[test]
    fn ledger_claim_is_exclusive() {
        let ledger = MetricsLedger::new();
        let m = Arc::new(Mutex::new(TurnMetrics::new("s", 1, Instant::now())));
        ledger.insert(1, m);

        assert!(ledger.get(1).is_some());
        assert!(ledger.claim(1).is_some());
        assert!(ledger.claim(1).is_none());
        assert!(ledger.get(1).is_none());
    }

    #[test]
    fn append_record_writes_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let record = sample_metrics().to_record();
        append_record(dir.path(), &record).unwrap();
        append_record(dir.path(), &record).unwrap();

        let raw = std::fs::read_to_string(metrics_path(dir.path())).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: MetricsRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.session_id, "sess");
        assert_eq!(parsed.turn_id, 3);
    }

    #[test]
    fn daily_file_name_embeds_utc_date() {
        let path = metrics_path(Path::new("logs"));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("metrics_"));
        assert!(name.ends_with(".jsonl"));
    }
}
