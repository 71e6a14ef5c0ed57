//! Canned development backend: echoes the utterance back word by word with
//! a simulated thinking delay, so the full pipeline can be exercised
//! without a model server.

use std::time::Duration;

use vg_domain::error::Result;
use vg_domain::stream::BoxStream;

use crate::traits::TextGenerator;

pub struct EchoGenerator {
    thinking_delay: Duration,
    delta_delay: Duration,
}

impl Default for EchoGenerator {
    fn default() -> Self {
        Self {
            thinking_delay: Duration::from_millis(300),
            delta_delay: Duration::from_millis(30),
        }
    }
}

impl EchoGenerator {
    /// Instant variant for tests.
    pub fn immediate() -> Self {
        Self {
            thinking_delay: Duration::ZERO,
            delta_delay: Duration::ZERO,
        }
    }
}

#[async_trait::async_trait]
impl TextGenerator for EchoGenerator {
    async fn generate_stream(
        &self,
        user_text: &str,
    ) -> Result<BoxStream<'static, Result<String>>> {
        let reply = format!("Echo: {user_text} (this is a canned response)");
        let thinking_delay = self.thinking_delay;
        let delta_delay = self.delta_delay;

        let stream = async_stream::stream! {
            tokio::time::sleep(thinking_delay).await;
            let mut first = true;
            for word in reply.split_whitespace() {
                let delta = if first {
                    first = false;
                    word.to_string()
                } else {
                    format!(" {word}")
                };
                yield Ok(delta);
                tokio::time::sleep(delta_delay).await;
            }
        };

        Ok(Box::pin(stream))
    }

    fn backend_id(&self) -> &'static str {
        "echo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn echo_concatenates_to_full_reply() {
        let gen = EchoGenerator::immediate();
        let mut stream = gen.generate_stream("hello there").await.unwrap();

        let mut full = String::new();
        while let Some(delta) = stream.next().await {
            full.push_str(&delta.unwrap());
        }
        assert_eq!(full, "Echo: hello there (this is a canned response)");
    }
}
