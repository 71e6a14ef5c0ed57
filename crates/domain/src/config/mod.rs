mod generator;
mod metrics;
mod server;
mod tts;

pub use generator::*;
pub use metrics::*;
pub use server::*;
pub use tts::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub tts: TtsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the resolved configuration. Errors prevent startup;
    /// warnings are logged and the server starts anyway.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut issues = Vec::new();

        match self.generator.backend {
            GeneratorBackend::Local => {
                if self.generator.api_url.trim().is_empty() {
                    issues.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: "generator.api_url".into(),
                        message: "required when generator.backend = \"local\"".into(),
                    });
                }
            }
            GeneratorBackend::Echo => {
                issues.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: "generator.backend".into(),
                    message: "\"echo\" is a development backend; replies are canned".into(),
                });
            }
        }

        match self.tts.backend {
            TtsBackend::Piper => {
                if self.tts.piper_model_path_zh.trim().is_empty() {
                    issues.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: "tts.piper_model_path_zh".into(),
                        message: "required when tts.backend = \"piper\"".into(),
                    });
                }
                if self.tts.piper_model_path_en.is_none() {
                    issues.push(ConfigError {
                        severity: ConfigSeverity::Warning,
                        field: "tts.piper_model_path_en".into(),
                        message: "not set; English segments will reuse the Chinese voice".into(),
                    });
                }
            }
            TtsBackend::Edge => {}
            TtsBackend::Sine => {
                issues.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: "tts.backend".into(),
                    message: "\"sine\" is a stub backend; output is a test tone".into(),
                });
            }
        }

        if self.tts.lang_decide_chars == 0 {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "tts.lang_decide_chars".into(),
                message: "must be at least 1".into(),
            });
        }

        if self.metrics.log_dir.trim().is_empty() {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "metrics.log_dir".into(),
                message: "must not be empty".into(),
            });
        }

        issues
    }
}
