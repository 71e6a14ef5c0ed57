//! Single-writer framing over the client channel.
//!
//! Every control and binary frame of a session goes through one
//! [`FrameWriter`]; a single async mutex around the transport guarantees
//! frames never interleave mid-write and are delivered in send order.
//! The transport itself is a trait so tests can capture frames in memory.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::sync::Mutex;

use vg_domain::error::{Error, Result};
use vg_protocol::ServerMessage;

/// The write half of a client channel.
#[async_trait::async_trait]
pub trait FrameTransport: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;
    async fn send_binary(&mut self, bytes: Vec<u8>) -> Result<()>;
}

/// The production transport: the sink half of an axum WebSocket.
pub type WsSink = SplitSink<WebSocket, Message>;

#[async_trait::async_trait]
impl FrameTransport for WsSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.send(Message::Text(text))
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }

    async fn send_binary(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.send(Message::Binary(bytes))
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }
}

/// Shared, serialized writer over one session's channel.
#[derive(Clone)]
pub struct FrameWriter {
    transport: Arc<Mutex<Box<dyn FrameTransport>>>,
}

impl FrameWriter {
    pub fn new(transport: impl FrameTransport + 'static) -> Self {
        Self {
            transport: Arc::new(Mutex::new(Box::new(transport))),
        }
    }

    /// JSON-encode and send a control message.
    pub async fn send_control(&self, msg: &ServerMessage) -> Result<()> {
        let json = serde_json::to_string(msg)?;
        self.transport.lock().await.send_text(json).await
    }

    /// Best-effort control send for cleanup paths (`audio_cancel` during
    /// shutdown); transport errors are logged and swallowed.
    pub async fn safe_send_control(&self, msg: &ServerMessage) {
        if let Err(e) = self.send_control(msg).await {
            tracing::debug!(error = %e, "best-effort control send failed");
        }
    }

    /// Send one binary frame. Returns `false` on transport failure so the
    /// caller can trip the turn's cancellation signal.
    pub async fn send_binary(&self, bytes: Vec<u8>, tag: &str) -> bool {
        match self.transport.lock().await.send_binary(bytes).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(tag, error = %e, "binary send failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vg_protocol::TurnState;

    #[derive(Clone, Default)]
    struct RecordingTransport {
        sent: Arc<parking_lot::Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl FrameTransport for RecordingTransport {
        async fn send_text(&mut self, text: String) -> Result<()> {
            if self.fail {
                return Err(Error::Transport("closed".into()));
            }
            self.sent.lock().push(format!("text:{text}"));
            Ok(())
        }

        async fn send_binary(&mut self, bytes: Vec<u8>) -> Result<()> {
            if self.fail {
                return Err(Error::Transport("closed".into()));
            }
            self.sent.lock().push(format!("bin:{}", bytes.len()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn frames_are_delivered_in_send_order() {
        let transport = RecordingTransport::default();
        let sent = transport.sent.clone();
        let writer = FrameWriter::new(transport);

        writer
            .send_control(&ServerMessage::StateUpdate {
                turn_id: 1,
                state: TurnState::Thinking,
            })
            .await
            .unwrap();
        assert!(writer.send_binary(vec![0u8; 16], "turn=1 seq=0").await);
        writer
            .send_control(&ServerMessage::AudioEnd { turn_id: 1 })
            .await
            .unwrap();

        let sent = sent.lock();
        assert_eq!(sent.len(), 3);
        assert!(sent[0].contains("state_update"));
        assert_eq!(sent[1], "bin:16");
        assert!(sent[2].contains("audio_end"));
    }

    #[tokio::test]
    async fn binary_failure_reports_false() {
        let transport = RecordingTransport {
            fail: true,
            ..Default::default()
        };
        let writer = FrameWriter::new(transport);
        assert!(!writer.send_binary(vec![1, 2, 3], "turn=1 seq=0").await);
    }

    #[tokio::test]
    async fn safe_send_swallows_transport_errors() {
        let transport = RecordingTransport {
            fail: true,
            ..Default::default()
        };
        let writer = FrameWriter::new(transport);
        // Must not panic or propagate.
        writer
            .safe_send_control(&ServerMessage::AudioCancel { turn_id: 3 })
            .await;
    }
}
