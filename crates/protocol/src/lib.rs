//! Voice channel protocol: the JSON control messages and the binary audio
//! frame exchanged over one client WebSocket.
//!
//! Control messages are text frames carrying a tagged JSON object; audio is
//! a binary frame with a fixed 12-byte header followed by raw PCM. Every
//! turn-scoped message embeds its `turn_id` so clients can drop frames from
//! superseded turns.

use serde::{Deserialize, Serialize};

/// Session-relative turn identifier. Starts at 0 (announced in `hello`),
/// increments on every `user_text` or `interrupt`, never reused.
pub type TurnId = u32;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Control messages (JSON text frames)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Client → server control messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// A complete user utterance. Implicitly supersedes any in-flight turn.
    #[serde(rename = "user_text")]
    UserText { text: String },

    /// Stop the current reply without starting a new one.
    #[serde(rename = "interrupt")]
    Interrupt,
}

/// Server → client control messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Sent once immediately after accept.
    #[serde(rename = "hello")]
    Hello {
        msg: String,
        session_id: String,
        server_instance_id: String,
        turn_id_reset: TurnId,
    },

    /// Turn lifecycle transition.
    #[serde(rename = "state_update")]
    StateUpdate { turn_id: TurnId, state: TurnState },

    /// Incremental reply text.
    #[serde(rename = "assistant_delta")]
    AssistantDelta { turn_id: TurnId, delta: String },

    /// The complete reply text, sent after the generator stream ends.
    #[serde(rename = "assistant_final")]
    AssistantFinal { turn_id: TurnId, text: String },

    /// Audio for this turn starts; carries the playback parameters.
    #[serde(rename = "audio_begin")]
    AudioBegin {
        turn_id: TurnId,
        mime: String,
        format: String,
        sample_rate: u32,
        channels: u16,
    },

    /// All audio frames for this turn have been sent.
    #[serde(rename = "audio_end")]
    AudioEnd { turn_id: TurnId },

    /// The turn was cancelled; the client should flush its playback buffer.
    #[serde(rename = "audio_cancel")]
    AudioCancel { turn_id: TurnId },

    #[serde(rename = "error")]
    Error { turn_id: TurnId, msg: String },
}

/// Client-visible turn states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnState {
    Thinking,
    Speaking,
    Idle,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Audio frames (binary)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Leading tag of every binary audio frame.
pub const AUDIO_FRAME_TAG: [u8; 4] = *b"AUD0";

/// Byte length of the audio frame header (tag + turn id + seq).
pub const AUDIO_FRAME_HEADER_LEN: usize = 12;

/// Header of a binary audio frame: `"AUD0"` ‖ turn id (u32 LE) ‖ sequence
/// number (u32 LE). Sequence numbers start at 0 per turn and are dense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFrameHeader {
    pub turn_id: TurnId,
    pub seq: u32,
}

impl AudioFrameHeader {
    /// Build the wire frame: header followed by the PCM payload.
    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(AUDIO_FRAME_HEADER_LEN + payload.len());
        frame.extend_from_slice(&AUDIO_FRAME_TAG);
        frame.extend_from_slice(&self.turn_id.to_le_bytes());
        frame.extend_from_slice(&self.seq.to_le_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    /// Split a wire frame into header and payload. Returns `None` when the
    /// frame is too short or the tag does not match.
    pub fn decode(frame: &[u8]) -> Option<(AudioFrameHeader, &[u8])> {
        if frame.len() < AUDIO_FRAME_HEADER_LEN || frame[..4] != AUDIO_FRAME_TAG {
            return None;
        }
        let turn_id = u32::from_le_bytes(frame[4..8].try_into().ok()?);
        let seq = u32::from_le_bytes(frame[8..12].try_into().ok()?);
        Some((
            AudioFrameHeader { turn_id, seq },
            &frame[AUDIO_FRAME_HEADER_LEN..],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_frame_roundtrip() {
        let header = AudioFrameHeader { turn_id: 7, seq: 42 };
        let payload = [0x01u8, 0x02, 0x03, 0x04];
        let frame = header.encode(&payload);

        assert_eq!(&frame[..4], b"AUD0");
        assert_eq!(frame.len(), AUDIO_FRAME_HEADER_LEN + payload.len());

        let (decoded, body) = AudioFrameHeader::decode(&frame).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(body, &payload);
    }

    #[test]
    fn audio_frame_header_is_little_endian() {
        let frame = AudioFrameHeader {
            turn_id: 0x0102_0304,
            seq: 1,
        }
        .encode(&[]);
        assert_eq!(&frame[4..8], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&frame[8..12], &[0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn decode_rejects_short_and_mistagged_frames() {
        assert!(AudioFrameHeader::decode(b"AUD0\x00\x00").is_none());
        let mut frame = AudioFrameHeader { turn_id: 1, seq: 0 }.encode(&[0u8; 8]);
        frame[3] = b'1';
        assert!(AudioFrameHeader::decode(&frame).is_none());
    }

    #[test]
    fn client_messages_parse() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"user_text","text":"你好"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::UserText { ref text } if text == "你好"));

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"interrupt"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Interrupt));

        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"foo"}"#).is_err());
    }

    #[test]
    fn server_message_json_shapes() {
        let json = serde_json::to_value(ServerMessage::Hello {
            msg: "connected".into(),
            session_id: "abc".into(),
            server_instance_id: "def".into(),
            turn_id_reset: 0,
        })
        .unwrap();
        assert_eq!(json["type"], "hello");
        assert_eq!(json["turn_id_reset"], 0);

        let json = serde_json::to_value(ServerMessage::StateUpdate {
            turn_id: 3,
            state: TurnState::Thinking,
        })
        .unwrap();
        assert_eq!(json["type"], "state_update");
        assert_eq!(json["state"], "thinking");

        let json = serde_json::to_value(ServerMessage::AudioBegin {
            turn_id: 3,
            mime: "audio/L16".into(),
            format: "pcm_s16le".into(),
            sample_rate: 24000,
            channels: 1,
        })
        .unwrap();
        assert_eq!(json["sample_rate"], 24000);
        assert_eq!(json["channels"], 1);
    }
}
