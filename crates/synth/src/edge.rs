//! Edge cloud voices over the read-aloud WebSocket endpoint.
//!
//! Each `synthesize` call opens a fresh connection, sends the output-format
//! config and one SSML message, then yields the payload of every binary
//! `Path:audio` frame until the service announces `turn.end`. Output format
//! is raw 24 kHz 16-bit mono PCM so the frames go onto the wire untouched.

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use vg_domain::error::{Error, Result};
use vg_domain::stream::BoxStream;

use crate::traits::SpeechSynthesizer;

const EDGE_WSS_ENDPOINT: &str =
    "wss://speech.platform.bing.com/consumer/speech/synthesize/readaloud/edge/v1";
const TRUSTED_CLIENT_TOKEN: &str = "6A5AA1D4EAFF4E9FB37E23D68491D6F4";
const OUTPUT_FORMAT: &str = "raw-24khz-16bit-mono-pcm";
const OUTPUT_SAMPLE_RATE: u32 = 24000;

pub struct EdgeSynthesizer {
    voice: String,
}

impl EdgeSynthesizer {
    pub fn new(voice: &str) -> Self {
        Self {
            voice: voice.to_owned(),
        }
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for EdgeSynthesizer {
    fn mime(&self) -> &'static str {
        "audio/L16"
    }

    fn format(&self) -> &'static str {
        "pcm_s16le"
    }

    fn sample_rate(&self) -> u32 {
        OUTPUT_SAMPLE_RATE
    }

    fn channels(&self) -> u16 {
        1
    }

    async fn synthesize(&self, text: &str) -> Result<BoxStream<'static, Result<Vec<u8>>>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Box::pin(futures_util::stream::empty()));
        }

        let request_id = uuid::Uuid::new_v4().simple().to_string();
        let url = format!(
            "{EDGE_WSS_ENDPOINT}?TrustedClientToken={TRUSTED_CLIENT_TOKEN}\
             &ConnectionId={request_id}"
        );

        let (ws, _) = connect_async(&url).await.map_err(|e| Error::Synthesizer {
            backend: "edge".into(),
            message: format!("connecting to speech endpoint: {e}"),
        })?;
        let (mut sink, mut ws_stream) = ws.split();

        sink.send(Message::Text(speech_config_message()))
            .await
            .map_err(|e| Error::Synthesizer {
                backend: "edge".into(),
                message: format!("sending speech.config: {e}"),
            })?;
        sink.send(Message::Text(ssml_message(&request_id, &self.voice, text)))
            .await
            .map_err(|e| Error::Synthesizer {
                backend: "edge".into(),
                message: format!("sending ssml: {e}"),
            })?;

        let stream = async_stream::stream! {
            // Keep the write half alive for the duration of the read loop;
            // dropping it closes the connection mid-synthesis.
            let _sink = sink;

            while let Some(message) = ws_stream.next().await {
                match message {
                    Ok(Message::Binary(data)) => {
                        if let Some(payload) = audio_payload(&data) {
                            if !payload.is_empty() {
                                yield Ok(payload.to_vec());
                            }
                        }
                    }
                    Ok(Message::Text(text)) => {
                        if text.contains("Path:turn.end") {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        yield Err(Error::Synthesizer {
                            backend: "edge".into(),
                            message: format!("speech stream: {e}"),
                        });
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    fn backend_id(&self) -> &'static str {
        "edge"
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Binary frames carry a big-endian u16 header length, the ASCII headers,
/// then the payload. Returns the payload when the headers name `Path:audio`.
fn audio_payload(data: &[u8]) -> Option<&[u8]> {
    if data.len() < 2 {
        return None;
    }
    let header_len = u16::from_be_bytes([data[0], data[1]]) as usize;
    let body_start = 2 + header_len;
    if data.len() < body_start {
        return None;
    }
    let headers = std::str::from_utf8(&data[2..body_start]).ok()?;
    headers
        .contains("Path:audio")
        .then(|| &data[body_start..])
}

fn speech_config_message() -> String {
    format!(
        "X-Timestamp:{}\r\n\
         Content-Type:application/json; charset=utf-8\r\n\
         Path:speech.config\r\n\r\n\
         {{\"context\":{{\"synthesis\":{{\"audio\":{{\"metadataoptions\":{{\
         \"sentenceBoundaryEnabled\":\"false\",\"wordBoundaryEnabled\":\"false\"}},\
         \"outputFormat\":\"{OUTPUT_FORMAT}\"}}}}}}}}",
        timestamp()
    )
}

fn ssml_message(request_id: &str, voice: &str, text: &str) -> String {
    format!(
        "X-RequestId:{request_id}\r\n\
         Content-Type:application/ssml+xml\r\n\
         X-Timestamp:{}\r\n\
         Path:ssml\r\n\r\n\
         <speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' \
         xml:lang='{}'><voice name='{voice}'>{}</voice></speak>",
        timestamp(),
        voice_locale(voice),
        xml_escape(text)
    )
}

/// Locale prefix of a voice name: `zh-CN-XiaoxiaoNeural` → `zh-CN`.
fn voice_locale(voice: &str) -> &str {
    let mut dashes = voice.char_indices().filter(|(_, c)| *c == '-');
    let _ = dashes.next();
    match dashes.next() {
        Some((idx, _)) => &voice[..idx],
        None => voice,
    }
}

fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\'' => escaped.push_str("&apos;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn timestamp() -> String {
    chrono::Utc::now()
        .format("%a %b %d %Y %H:%M:%S GMT+0000 (Coordinated Universal Time)")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(headers: &str, payload: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&(headers.len() as u16).to_be_bytes());
        data.extend_from_slice(headers.as_bytes());
        data.extend_from_slice(payload);
        data
    }

    #[test]
    fn audio_payload_extracts_body() {
        let data = frame("X-RequestId:abc\r\nPath:audio\r\n", &[1, 2, 3]);
        assert_eq!(audio_payload(&data), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn non_audio_frames_are_ignored() {
        let data = frame("Path:turn.start\r\n", &[1, 2, 3]);
        assert_eq!(audio_payload(&data), None);
        assert_eq!(audio_payload(&[0x00]), None);
    }

    #[test]
    fn truncated_header_is_rejected() {
        let mut data = frame("Path:audio\r\n", &[]);
        data[1] = 200; // claims a header longer than the frame
        assert_eq!(audio_payload(&data), None);
    }

    #[test]
    fn ssml_escapes_reserved_characters() {
        let msg = ssml_message("rid", "en-US-AriaNeural", "a < b & c");
        assert!(msg.contains("a &lt; b &amp; c"));
        assert!(msg.contains("xml:lang='en-US'"));
    }

    #[test]
    fn voice_locale_prefix() {
        assert_eq!(voice_locale("zh-CN-XiaoxiaoNeural"), "zh-CN");
        assert_eq!(voice_locale("en-US-AriaNeural"), "en-US");
        assert_eq!(voice_locale("novoice"), "novoice");
    }
}
