//! Local piper voices via the `piper` executable.
//!
//! Each `synthesize` call spawns a fresh process with `--output-raw`, feeds
//! it one line of text, and streams stdout as PCM16LE chunks. The voice's
//! native sample rate is read from its JSON config; output is optionally
//! resampled to a pinned target rate.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use vg_domain::error::{Error, Result};
use vg_domain::stream::BoxStream;

use crate::resample::{bytes_to_samples, samples_to_bytes, LinearResampler};
use crate::traits::SpeechSynthesizer;

/// Slice size of the chunks handed to the frame writer.
const OUT_CHUNK_BYTES: usize = 4096;

/// Sample rate assumed when the voice config is missing or unreadable.
const FALLBACK_SAMPLE_RATE: u32 = 22050;

#[derive(Debug)]
pub struct PiperSynthesizer {
    model_path: PathBuf,
    config_path: Option<PathBuf>,
    use_cuda: bool,
    /// What the voice produces.
    voice_sample_rate: u32,
    /// What we send to the client.
    out_sample_rate: u32,
}

impl PiperSynthesizer {
    pub fn new(
        model_path: &str,
        config_path: Option<&str>,
        use_cuda: bool,
        target_sample_rate: Option<u32>,
    ) -> Result<Self> {
        let model_path = PathBuf::from(model_path);
        if !model_path.exists() {
            return Err(Error::Synthesizer {
                backend: "piper".into(),
                message: format!("voice model not found: {}", model_path.display()),
            });
        }

        let config_path = match config_path {
            Some(p) => Some(PathBuf::from(p)),
            None => default_config_path(&model_path),
        };

        let voice_sample_rate = config_path
            .as_deref()
            .and_then(read_sample_rate_from_config)
            .unwrap_or(FALLBACK_SAMPLE_RATE);
        let out_sample_rate = target_sample_rate.unwrap_or(voice_sample_rate);

        tracing::info!(
            model = %model_path.display(),
            voice_sample_rate,
            out_sample_rate,
            resample = voice_sample_rate != out_sample_rate,
            "piper voice ready"
        );

        Ok(Self {
            model_path,
            config_path,
            use_cuda,
            voice_sample_rate,
            out_sample_rate,
        })
    }

    /// Native rate of the loaded voice (before any resampling).
    pub fn voice_sample_rate(&self) -> u32 {
        self.voice_sample_rate
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for PiperSynthesizer {
    fn mime(&self) -> &'static str {
        "audio/L16"
    }

    fn format(&self) -> &'static str {
        "pcm_s16le"
    }

    fn sample_rate(&self) -> u32 {
        self.out_sample_rate
    }

    fn channels(&self) -> u16 {
        1
    }

    async fn synthesize(&self, text: &str) -> Result<BoxStream<'static, Result<Vec<u8>>>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Box::pin(futures_util::stream::empty()));
        }

        let mut cmd = Command::new("piper");
        cmd.arg("--model").arg(&self.model_path);
        if let Some(ref config) = self.config_path {
            cmd.arg("--config").arg(config);
        }
        cmd.arg("--output-raw");
        if self.use_cuda {
            cmd.arg("--cuda");
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| Error::Synthesizer {
            backend: "piper".into(),
            message: format!("failed to spawn piper: {e}"),
        })?;

        let mut stdin = child.stdin.take().ok_or_else(|| Error::Synthesizer {
            backend: "piper".into(),
            message: "piper stdin unavailable".into(),
        })?;
        let mut stdout = child.stdout.take().ok_or_else(|| Error::Synthesizer {
            backend: "piper".into(),
            message: "piper stdout unavailable".into(),
        })?;

        // piper synthesizes one utterance per input line.
        let line = text.replace(['\r', '\n'], " ");

        let in_rate = self.voice_sample_rate;
        let out_rate = self.out_sample_rate;

        let stream = async_stream::stream! {
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                yield Err(Error::Synthesizer {
                    backend: "piper".into(),
                    message: format!("writing text to piper: {e}"),
                });
                return;
            }
            if let Err(e) = stdin.write_all(b"\n").await {
                yield Err(Error::Synthesizer {
                    backend: "piper".into(),
                    message: format!("writing text to piper: {e}"),
                });
                return;
            }
            // Close stdin so piper exits after this utterance.
            drop(stdin);

            let mut resampler =
                (in_rate != out_rate).then(|| LinearResampler::new(in_rate, out_rate));
            // Odd trailing byte of a read, completed by the next one.
            let mut carry: Option<u8> = None;
            let mut buf = vec![0u8; OUT_CHUNK_BYTES];

            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        let mut data = Vec::with_capacity(n + 1);
                        if let Some(b) = carry.take() {
                            data.push(b);
                        }
                        data.extend_from_slice(&buf[..n]);
                        if data.len() % 2 != 0 {
                            carry = data.pop();
                        }
                        if data.is_empty() {
                            continue;
                        }

                        let chunk = match resampler.as_mut() {
                            Some(rs) => samples_to_bytes(&rs.process(&bytes_to_samples(&data))),
                            None => data,
                        };
                        if !chunk.is_empty() {
                            yield Ok(chunk);
                        }
                    }
                    Err(e) => {
                        yield Err(Error::Synthesizer {
                            backend: "piper".into(),
                            message: format!("reading piper output: {e}"),
                        });
                        return;
                    }
                }
            }

            if let Some(mut rs) = resampler.take() {
                let tail = rs.flush();
                if !tail.is_empty() {
                    yield Ok(samples_to_bytes(&tail));
                }
            }
            if carry.is_some() {
                tracing::warn!("piper produced an odd number of PCM bytes; dropping final byte");
            }

            match child.wait().await {
                Ok(status) if !status.success() => {
                    yield Err(Error::Synthesizer {
                        backend: "piper".into(),
                        message: format!("piper exited with {status}"),
                    });
                }
                Err(e) => {
                    yield Err(Error::Synthesizer {
                        backend: "piper".into(),
                        message: format!("waiting for piper: {e}"),
                    });
                }
                Ok(_) => {}
            }
        };

        Ok(Box::pin(stream))
    }

    fn backend_id(&self) -> &'static str {
        "piper"
    }
}

/// Piper voices conventionally ship `<model>.json` or `<model>.onnx.json`
/// next to the model file.
fn default_config_path(model_path: &Path) -> Option<PathBuf> {
    let mut with_json = model_path.as_os_str().to_owned();
    with_json.push(".json");
    let cand = PathBuf::from(with_json);
    if cand.exists() {
        return Some(cand);
    }

    let mut with_onnx_json = model_path.as_os_str().to_owned();
    with_onnx_json.push(".onnx.json");
    let cand = PathBuf::from(with_onnx_json);
    cand.exists().then_some(cand)
}

fn read_sample_rate_from_config(config_path: &Path) -> Option<u32> {
    let raw = std::fs::read_to_string(config_path).ok()?;
    let value: serde_json::Value = serde_json::from_str(&raw).ok()?;
    value
        .get("audio")
        .and_then(|a| a.get("sample_rate"))
        .and_then(serde_json::Value::as_u64)
        .map(|sr| sr as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_voice(dir: &Path, sample_rate: u32) -> PathBuf {
        let model = dir.join("voice.onnx");
        std::fs::File::create(&model).unwrap();
        let mut cfg = std::fs::File::create(dir.join("voice.onnx.json")).unwrap();
        write!(cfg, r#"{{"audio":{{"sample_rate":{sample_rate}}}}}"#).unwrap();
        model
    }

    #[test]
    fn sample_rate_comes_from_sidecar_config() {
        let dir = tempfile::tempdir().unwrap();
        let model = write_voice(dir.path(), 16000);

        let synth =
            PiperSynthesizer::new(model.to_str().unwrap(), None, false, None).unwrap();
        assert_eq!(synth.voice_sample_rate(), 16000);
        assert_eq!(synth.sample_rate(), 16000);
    }

    #[test]
    fn target_rate_overrides_advertised_rate() {
        let dir = tempfile::tempdir().unwrap();
        let model = write_voice(dir.path(), 22050);

        let synth =
            PiperSynthesizer::new(model.to_str().unwrap(), None, false, Some(16000)).unwrap();
        assert_eq!(synth.voice_sample_rate(), 22050);
        assert_eq!(synth.sample_rate(), 16000);
    }

    #[test]
    fn missing_sidecar_falls_back_to_default_rate() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("bare.onnx");
        std::fs::File::create(&model).unwrap();

        let synth =
            PiperSynthesizer::new(model.to_str().unwrap(), None, false, None).unwrap();
        assert_eq!(synth.voice_sample_rate(), FALLBACK_SAMPLE_RATE);
    }

    #[test]
    fn missing_model_is_an_error() {
        let err = PiperSynthesizer::new("/nonexistent/voice.onnx", None, false, None)
            .unwrap_err();
        assert!(err.to_string().contains("voice model not found"));
    }
}
