//! Adapter for a local model server speaking the llama.cpp `/completion`
//! protocol (also served by compatible runtimes).
//!
//! Requests `stream: true` and yields one delta per SSE `data:` event's
//! `content` field; an event with `stop: true` ends the reply.

use serde_json::Value;

use vg_domain::config::GeneratorConfig;
use vg_domain::error::{Error, Result};
use vg_domain::stream::BoxStream;

use crate::sse::take_event_payloads;
use crate::traits::TextGenerator;
use crate::util::from_reqwest;

pub struct LocalHttpGenerator {
    api_url: String,
    n_predict: u32,
    temperature: f32,
    stop: Vec<String>,
    client: reqwest::Client,
}

impl LocalHttpGenerator {
    pub fn from_config(cfg: &GeneratorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_sec))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            api_url: cfg.api_url.clone(),
            n_predict: cfg.n_predict,
            temperature: cfg.temperature,
            stop: cfg.stop.clone(),
            client,
        })
    }

    fn format_prompt(user_text: &str) -> String {
        format!("User: {user_text}\nAssistant:")
    }

    /// Pull the reply delta out of one SSE event payload.
    ///
    /// Returns `(delta, stop)`. Malformed payloads are logged and skipped.
    fn parse_event(data: &str) -> Option<(String, bool)> {
        let value: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed completion event");
                return None;
            }
        };
        let delta = value
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let stop = value.get("stop").and_then(Value::as_bool).unwrap_or(false);
        Some((delta, stop))
    }
}

#[async_trait::async_trait]
impl TextGenerator for LocalHttpGenerator {
    async fn generate_stream(
        &self,
        user_text: &str,
    ) -> Result<BoxStream<'static, Result<String>>> {
        let payload = serde_json::json!({
            "prompt": Self::format_prompt(user_text),
            "n_predict": self.n_predict,
            "temperature": self.temperature,
            "stop": self.stop,
            "stream": true,
        });

        let response = self
            .client
            .post(&self.api_url)
            .json(&payload)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Generator {
                backend: "local".into(),
                message: format!(
                    "server returned {status}: {}",
                    body.chars().take(200).collect::<String>()
                ),
            });
        }

        let stream = async_stream::stream! {
            let mut response = response;
            let mut buffer = String::new();

            'read: loop {
                match response.chunk().await {
                    Ok(Some(bytes)) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        for data in take_event_payloads(&mut buffer) {
                            if let Some((delta, stop)) = Self::parse_event(&data) {
                                if !delta.is_empty() {
                                    yield Ok(delta);
                                }
                                if stop {
                                    break 'read;
                                }
                            }
                        }
                    }
                    Ok(None) => {
                        // Body closed -- flush a trailing partial event.
                        if !buffer.trim().is_empty() {
                            buffer.push_str("\n\n");
                            for data in take_event_payloads(&mut buffer) {
                                if let Some((delta, _)) = Self::parse_event(&data) {
                                    if !delta.is_empty() {
                                        yield Ok(delta);
                                    }
                                }
                            }
                        }
                        break;
                    }
                    Err(e) => {
                        yield Err(from_reqwest(e));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    fn backend_id(&self) -> &'static str {
        "local"
    }
}
