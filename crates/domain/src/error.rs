/// Anything that can fail inside the gateway or one of its adapters.
///
/// Adapter failures keep their backend name so the turn can report which
/// side of the pipeline fell over; the rest wrap their source with a short
/// prefix for the logs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http request failed: {0}")]
    Http(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("generator {backend}: {message}")]
    Generator { backend: String, message: String },

    #[error("synthesizer {backend}: {message}")]
    Synthesizer { backend: String, message: String },

    #[error("transport: {0}")]
    Transport(String),

    #[error("bad config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Short machine-readable kind tag, used as `err_type` in metrics records.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Http(_) => "http",
            Error::Timeout(_) => "timeout",
            Error::Generator { .. } => "generator",
            Error::Synthesizer { .. } => "synthesizer",
            Error::Transport(_) => "transport",
            Error::Config(_) => "config",
            Error::Other(_) => "other",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_are_stable() {
        let e = Error::Generator {
            backend: "local".into(),
            message: "connection refused".into(),
        };
        assert_eq!(e.kind(), "generator");
        assert_eq!(e.to_string(), "generator local: connection refused");

        let e = Error::Transport("send failed".into());
        assert_eq!(e.kind(), "transport");
    }

    #[test]
    fn wrapped_sources_keep_their_prefix() {
        let e = Error::from(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no such voice",
        ));
        assert_eq!(e.kind(), "io");
        assert!(e.to_string().starts_with("io error:"));
    }
}
