use vg_domain::error::Result;
use vg_domain::stream::BoxStream;

/// Trait that every text-generation adapter must implement.
///
/// One call to [`generate_stream`](TextGenerator::generate_stream) produces
/// one lazy, finite sequence of reply deltas. The sequence is not
/// restartable; each turn obtains a fresh stream and owns it exclusively.
/// Deltas may be empty strings (callers skip those).
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    /// Start generating a reply to one user utterance.
    async fn generate_stream(
        &self,
        user_text: &str,
    ) -> Result<BoxStream<'static, Result<String>>>;

    /// Backend identifier used in logs and error reports.
    fn backend_id(&self) -> &'static str;
}
